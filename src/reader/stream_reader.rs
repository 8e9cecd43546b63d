//! Continuous sample reader

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use super::engine::{Next, deadline};
use super::{
    ReadMode, ReadOutcome, ReadTimeoutType, Reader, ReaderCore, ReaderHandoff, ReaderState,
    Transform,
};
use crate::config::ReaderConfig;
use crate::connection::Connection;
use crate::types::{DataDescriptor, SampleData};
use crate::{DaqError, Result};

/// Builder binding the output types of a [`StreamReader`].
///
/// The builder cannot read; output types are fixed by [`Self::build`].
#[derive(Debug)]
pub struct StreamReaderBuilder {
    connection: Connection,
    config: ReaderConfig,
}

impl StreamReaderBuilder {
    pub fn config(mut self, config: ReaderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn timeout_type(mut self, timeout_type: ReadTimeoutType) -> Self {
        self.config.timeout_type = timeout_type;
        self
    }

    pub fn read_mode(mut self, read_mode: ReadMode) -> Self {
        self.config.read_mode = read_mode;
        self
    }

    /// Bind the value type `V` and domain type `D`.
    pub fn build<V: SampleData, D: SampleData>(self) -> Result<StreamReader<V, D>> {
        let core = ReaderCore::new(self.connection, self.config, V::SAMPLE_TYPE, D::SAMPLE_TYPE)?;
        Ok(StreamReader::with_core(core))
    }
}

/// Reads samples in arrival order, across packet boundaries.
pub struct StreamReader<V: SampleData = f64, D: SampleData = i64> {
    core: ReaderCore,
    value_transform: Option<Transform<V>>,
    domain_transform: Option<Transform<D>>,
    _types: PhantomData<fn() -> (V, D)>,
}

impl StreamReader {
    /// Start configuring a reader; output types are chosen by
    /// [`StreamReaderBuilder::build`].
    pub fn builder(connection: Connection) -> StreamReaderBuilder {
        StreamReaderBuilder { connection, config: ReaderConfig::default() }
    }
}

impl<V: SampleData, D: SampleData> StreamReader<V, D> {
    fn with_core(core: ReaderCore) -> Self {
        Self { core, value_transform: None, domain_transform: None, _types: PhantomData }
    }

    /// Replace `old`, keeping its connection, descriptors and unread samples.
    pub fn from_existing<R: Reader>(old: R) -> Result<Self> {
        Self::from_existing_with_config(old, ReaderConfig::default())
    }

    pub fn from_existing_with_config<R: Reader>(old: R, config: ReaderConfig) -> Result<Self> {
        Self::from_handoff(old.into_handoff(), config)
    }

    pub fn from_handoff(handoff: ReaderHandoff, config: ReaderConfig) -> Result<Self> {
        let core = ReaderCore::from_handoff(handoff, config, V::SAMPLE_TYPE, D::SAMPLE_TYPE)?;
        Ok(Self::with_core(core))
    }

    /// Transform applied to every decoded value before it is returned.
    pub fn with_value_transform(
        mut self,
        transform: impl Fn(&mut [V], &DataDescriptor) + Send + Sync + 'static,
    ) -> Self {
        self.value_transform = Some(Arc::new(transform));
        self
    }

    /// Transform applied to every decoded domain value.
    pub fn with_domain_transform(
        mut self,
        transform: impl Fn(&mut [D], &DataDescriptor) + Send + Sync + 'static,
    ) -> Self {
        self.domain_transform = Some(Arc::new(transform));
        self
    }

    /// Read up to `count` samples into `values`.
    ///
    /// Blocks for at most `timeout` while fewer than `count` samples are
    /// queued; a zero timeout returns whatever is available. The read stops
    /// early at an event packet.
    pub fn read(&mut self, values: &mut [V], count: usize, timeout: Duration) -> Result<ReadOutcome> {
        self.read_into(values, None, count, timeout)
    }

    /// Read values and their domain values.
    ///
    /// Stops before a data packet that carries no domain packet; that is an
    /// error only when no sample could be read.
    pub fn read_with_domain(
        &mut self,
        values: &mut [V],
        domain: &mut [D],
        count: usize,
        timeout: Duration,
    ) -> Result<ReadOutcome> {
        if domain.len() < count {
            return Err(DaqError::buffer_too_small("domain", count, domain.len()));
        }
        self.read_into(values, Some(domain), count, timeout)
    }

    fn read_into(
        &mut self,
        values: &mut [V],
        mut domain: Option<&mut [D]>,
        count: usize,
        timeout: Duration,
    ) -> Result<ReadOutcome> {
        self.core.ensure_valid()?;
        if values.len() < count {
            return Err(DaqError::buffer_too_small("values", count, values.len()));
        }

        let deadline = deadline(timeout);
        if count > 0 {
            if let Some(outcome) = self.core.adopt_front_descriptors(deadline) {
                return Ok(outcome);
            }
        }

        if count == 0 || self.core.value().is_none() {
            // Only an event can make progress here
            return Ok(match self.core.take_front_event() {
                Some(event) => self.core.handle_event(event, 0),
                None if self.core.connection().is_closed() => self.core.closed(0),
                None => ReadOutcome::ok(0),
            });
        }

        let any = self.core.config().timeout_type == ReadTimeoutType::Any;
        let need_domain = domain.is_some();
        let mut produced = 0;

        while produced < count {
            match self.core.next(need_domain) {
                Next::Data => {
                    let n = match self.core.take_samples(
                        &mut values[produced..],
                        domain.as_deref_mut().map(|d| &mut d[produced..]),
                        count - produced,
                        self.value_transform.as_ref(),
                        self.domain_transform.as_ref(),
                    ) {
                        Ok(n) => n,
                        Err(e) => return self.core.fail_after(produced, e),
                    };
                    produced += n;
                    if any && n > 0 {
                        break;
                    }
                }
                Next::Event(event) => return Ok(self.core.handle_event(event, produced)),
                Next::MissingDomain if produced == 0 => {
                    return Err(DaqError::domain("data packet carries no domain packet"));
                }
                Next::MissingDomain => break,
                Next::Empty => {
                    if self.core.connection().is_closed() {
                        return Ok(self.core.closed(produced));
                    }
                    if !self.core.wait_for_packets(deadline) {
                        if self.core.connection().is_closed() {
                            return Ok(self.core.closed(produced));
                        }
                        break;
                    }
                }
            }
        }

        Ok(ReadOutcome::ok(produced))
    }
}

impl<V: SampleData, D: SampleData> Reader for StreamReader<V, D> {
    fn available_count(&self) -> usize {
        self.core.available_count()
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

    fn into_handoff(self) -> ReaderHandoff {
        self.core.into_handoff()
    }
}

impl<V: SampleData, D: SampleData> std::fmt::Debug for StreamReader<V, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamReader")
            .field("value_type", &V::SAMPLE_TYPE)
            .field("domain_type", &D::SAMPLE_TYPE)
            .field("state", &self.state())
            .field("connection", self.core.connection())
            .finish()
    }
}
