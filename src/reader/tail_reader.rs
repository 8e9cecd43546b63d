//! Reader returning the most recent samples

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::trace;

use super::engine::decode_range;
use super::{ReadMode, ReadOutcome, Reader, ReaderCore, ReaderHandoff, ReaderState, Transform};
use crate::config::ReaderConfig;
use crate::connection::Connection;
use crate::types::{DataDescriptor, DataPacket, Packet, SampleData};
use crate::{DaqError, Result};

/// Builder binding the output types of a [`TailReader`].
#[derive(Debug)]
pub struct TailReaderBuilder {
    connection: Connection,
    config: ReaderConfig,
}

impl TailReaderBuilder {
    /// Replace the configuration; the history size is taken from it.
    pub fn config(mut self, config: ReaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Samples retained for reading.
    pub fn history_size(mut self, history_size: usize) -> Self {
        self.config.history_size = Some(history_size);
        self
    }

    pub fn read_mode(mut self, read_mode: ReadMode) -> Self {
        self.config.read_mode = read_mode;
        self
    }

    pub fn build<V: SampleData, D: SampleData>(self) -> Result<TailReader<V, D>> {
        let history_size = history_size(&self.config)?;
        let core = ReaderCore::new(self.connection, self.config, V::SAMPLE_TYPE, D::SAMPLE_TYPE)?;
        Ok(TailReader::with_core(core, history_size))
    }
}

fn history_size(config: &ReaderConfig) -> Result<usize> {
    config.validate()?;
    config
        .history_size
        .ok_or_else(|| DaqError::configuration("tail reader needs a history size"))
}

/// Keeps the last `history_size` samples of the stream.
///
/// Every read first drains the queued data packets into the history, then
/// copies out the newest samples. Reads never block. An event at the head of
/// the queue clears the history.
pub struct TailReader<V: SampleData = f64, D: SampleData = i64> {
    core: ReaderCore,
    history_size: usize,
    // Packets and the index of their first retained sample
    history: VecDeque<(Arc<DataPacket>, usize)>,
    retained: usize,
    value_transform: Option<Transform<V>>,
    domain_transform: Option<Transform<D>>,
    _types: PhantomData<fn() -> (V, D)>,
}

impl TailReader {
    /// Start configuring a reader; a history size is required.
    pub fn builder(connection: Connection) -> TailReaderBuilder {
        TailReaderBuilder { connection, config: ReaderConfig::default() }
    }
}

impl<V: SampleData, D: SampleData> TailReader<V, D> {
    fn with_core(core: ReaderCore, history_size: usize) -> Self {
        let mut reader = Self {
            core,
            history_size,
            history: VecDeque::new(),
            retained: 0,
            value_transform: None,
            domain_transform: None,
            _types: PhantomData,
        };
        // A packet handed over mid-read starts the history
        if let Some(held) = reader.core.take_held() {
            reader.retain(Arc::clone(held.packet()), held.position());
        }
        reader
    }

    /// Replace `old`; `config` must carry the history size.
    pub fn from_existing<R: Reader>(old: R, config: ReaderConfig) -> Result<Self> {
        let history_size = history_size(&config)?;
        let core =
            ReaderCore::from_handoff(old.into_handoff(), config, V::SAMPLE_TYPE, D::SAMPLE_TYPE)?;
        Ok(Self::with_core(core, history_size))
    }

    pub fn with_value_transform(
        mut self,
        transform: impl Fn(&mut [V], &DataDescriptor) + Send + Sync + 'static,
    ) -> Self {
        self.value_transform = Some(Arc::new(transform));
        self
    }

    pub fn with_domain_transform(
        mut self,
        transform: impl Fn(&mut [D], &DataDescriptor) + Send + Sync + 'static,
    ) -> Self {
        self.domain_transform = Some(Arc::new(transform));
        self
    }

    pub fn history_size(&self) -> usize {
        self.history_size
    }

    /// Copy the newest `count` retained samples, oldest first, into the
    /// front of `values`.
    ///
    /// Returns fewer samples while the history is still filling.
    pub fn read(&mut self, values: &mut [V], count: usize) -> Result<ReadOutcome> {
        self.read_tail(values, None, count)
    }

    /// Read the newest samples and their domain values.
    pub fn read_with_domain(
        &mut self,
        values: &mut [V],
        domain: &mut [D],
        count: usize,
    ) -> Result<ReadOutcome> {
        if domain.len() < count.min(self.history_size) {
            return Err(DaqError::buffer_too_small("domain", count, domain.len()));
        }
        self.read_tail(values, Some(domain), count)
    }

    fn read_tail(
        &mut self,
        values: &mut [V],
        domain: Option<&mut [D]>,
        count: usize,
    ) -> Result<ReadOutcome> {
        self.core.ensure_valid()?;
        if count > self.history_size {
            return Err(DaqError::size_exceeded(count, self.history_size));
        }
        if values.len() < count {
            return Err(DaqError::buffer_too_small("values", count, values.len()));
        }

        if count > 0 {
            if let Some(outcome) = self.core.adopt_front_descriptors(None) {
                return Ok(outcome);
            }
        }

        if count == 0 || self.core.value().is_none() {
            return Ok(match self.core.take_front_event() {
                Some(event) => {
                    self.clear_history();
                    self.core.handle_event(event, 0)
                }
                None if self.core.connection().is_closed() => self.core.closed(0),
                None => ReadOutcome::ok(0),
            });
        }

        if self.pull() == 0 {
            if let Some(event) = self.core.take_front_event() {
                self.clear_history();
                return Ok(self.core.handle_event(event, 0));
            }
        }

        let n = count.min(self.retained);
        self.copy_newest(&mut values[..n], domain.map(|d| &mut d[..n]))?;
        trace!(requested = count, read = n, retained = self.retained, "Tail read finished");

        if self.core.connection().is_closed() {
            return Ok(self.core.closed(n));
        }
        Ok(ReadOutcome::ok(n))
    }

    /// Move queued data packets into the history, stopping at an event.
    fn pull(&mut self) -> usize {
        let packets = self.core.connection().with_queue(|queue| {
            let mut taken = Vec::new();
            while matches!(queue.front(), Some(Packet::Data(_))) {
                if let Some(Packet::Data(data)) = queue.pop_front() {
                    taken.push(data);
                }
            }
            taken
        });

        let mut pulled = 0;
        for packet in packets {
            pulled += packet.sample_count();
            self.retain(packet, 0);
        }
        pulled
    }

    fn retain(&mut self, packet: Arc<DataPacket>, start: usize) {
        let len = packet.sample_count().saturating_sub(start);
        if len == 0 {
            return;
        }
        self.history.push_back((packet, start));
        self.retained += len;

        // Drop whole packets no longer needed to cover the history
        while let Some((front, start)) = self.history.front() {
            let len = front.sample_count() - start;
            if self.retained - len < self.history_size {
                break;
            }
            self.retained -= len;
            self.history.pop_front();
        }
    }

    /// Decode the newest `values.len()` retained samples.
    fn copy_newest(&self, values: &mut [V], mut domain: Option<&mut [D]>) -> Result<()> {
        let mode = self.core.config().read_mode;
        let mut skip = self.retained - values.len();
        let mut written = 0;

        for (packet, start) in &self.history {
            let len = packet.sample_count() - start;
            if skip >= len {
                skip -= len;
                continue;
            }
            let first = start + skip;
            let take = (len - skip).min(values.len() - written);
            skip = 0;

            let out = &mut values[written..written + take];
            decode_range(packet, first, out, mode)?;
            if let Some(transform) = &self.value_transform {
                transform(out, packet.descriptor());
            }

            if let Some(domain) = domain.as_deref_mut() {
                let domain_packet = packet
                    .domain_packet()
                    .ok_or_else(|| DaqError::domain("data packet carries no domain packet"))?;
                let out = &mut domain[written..written + take];
                decode_range(domain_packet, first, out, mode)?;
                if let Some(transform) = &self.domain_transform {
                    transform(out, domain_packet.descriptor());
                }
            }

            written += take;
            if written == values.len() {
                break;
            }
        }
        Ok(())
    }

    fn clear_history(&mut self) {
        self.history.clear();
        self.retained = 0;
    }
}

impl<V: SampleData, D: SampleData> Reader for TailReader<V, D> {
    fn available_count(&self) -> usize {
        if !self.core.is_described() {
            return 0;
        }
        let queued = self.core.connection().samples_until_next_event();
        (self.retained + queued).min(self.history_size)
    }

    fn value_descriptor(&self) -> Option<Arc<DataDescriptor>> {
        self.core.value().cloned()
    }

    fn domain_descriptor(&self) -> Option<Arc<DataDescriptor>> {
        self.core.domain().cloned()
    }

    fn state(&self) -> ReaderState {
        if self.core.is_invalid() { ReaderState::Invalid } else { ReaderState::Bound }
    }

    fn connection(&self) -> &Connection {
        self.core.connection()
    }

    /// Retained history is not handed over; queued packets are.
    fn into_handoff(self) -> ReaderHandoff {
        self.core.into_handoff()
    }
}

impl<V: SampleData, D: SampleData> std::fmt::Debug for TailReader<V, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailReader")
            .field("history_size", &self.history_size)
            .field("retained", &self.retained)
            .field("packets", &self.history.len())
            .field("state", &self.state())
            .finish()
    }
}
