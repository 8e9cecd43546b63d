//! Fixed-size block reader with optional overlap

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

use super::engine::{Blocker, Next, deadline};
use super::{
    ReadMode, ReadOutcome, ReadTimeoutType, Reader, ReaderCore, ReaderHandoff, ReaderState,
    Transform,
};
use crate::config::ReaderConfig;
use crate::connection::Connection;
use crate::types::{DataDescriptor, SampleData};
use crate::{DaqError, Result};

/// Builder binding the output types of a [`BlockReader`].
#[derive(Debug)]
pub struct BlockReaderBuilder {
    connection: Connection,
    config: ReaderConfig,
}

impl BlockReaderBuilder {
    /// Replace the configuration; block size and overlap are taken from it.
    pub fn config(mut self, config: ReaderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn block_size(mut self, block_size: usize) -> Self {
        self.config.block_size = Some(block_size);
        self
    }

    /// Percentage of each block repeated at the start of the next, `0..100`.
    pub fn overlap(mut self, overlap: u32) -> Self {
        self.config.overlap = overlap;
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

    pub fn build<V: SampleData, D: SampleData>(self) -> Result<BlockReader<V, D>> {
        let geometry = BlockGeometry::from_config(&self.config)?;
        let core = ReaderCore::new(self.connection, self.config, V::SAMPLE_TYPE, D::SAMPLE_TYPE)?;
        Ok(BlockReader::with_core(core, geometry))
    }
}

#[derive(Debug, Clone, Copy)]
struct BlockGeometry {
    block_size: usize,
    overlap_samples: usize,
}

impl BlockGeometry {
    fn from_config(config: &ReaderConfig) -> Result<Self> {
        config.validate()?;
        let block_size = config
            .block_size
            .ok_or_else(|| DaqError::configuration("block reader needs a block size"))?;
        let overlap_samples = block_size * config.overlap as usize / 100;
        Ok(Self { block_size, overlap_samples })
    }
}

/// Reads whole blocks of `block_size` samples.
///
/// Samples are only taken from the connection once a full block can be
/// completed before the next event, so a read that returns no blocks loses no
/// data. When an event arrives before the queued samples complete a block,
/// those samples and the overlap carried from the previous block are dropped.
pub struct BlockReader<V: SampleData = f64, D: SampleData = i64> {
    core: ReaderCore,
    geometry: BlockGeometry,
    // Trailing samples of the last block that start the next one
    carry: Vec<V>,
    carry_domain: Vec<D>,
    value_transform: Option<Transform<V>>,
    domain_transform: Option<Transform<D>>,
    _types: PhantomData<fn() -> (V, D)>,
}

impl BlockReader {
    /// Start configuring a reader; a block size is required.
    pub fn builder(connection: Connection) -> BlockReaderBuilder {
        BlockReaderBuilder { connection, config: ReaderConfig::default() }
    }
}

impl<V: SampleData, D: SampleData> BlockReader<V, D> {
    fn with_core(core: ReaderCore, geometry: BlockGeometry) -> Self {
        Self {
            core,
            geometry,
            carry: Vec::with_capacity(geometry.overlap_samples),
            carry_domain: Vec::with_capacity(geometry.overlap_samples),
            value_transform: None,
            domain_transform: None,
            _types: PhantomData,
        }
    }

    /// Replace `old`; `config` must carry the block size.
    pub fn from_existing<R: Reader>(old: R, config: ReaderConfig) -> Result<Self> {
        let geometry = BlockGeometry::from_config(&config)?;
        let core =
            ReaderCore::from_handoff(old.into_handoff(), config, V::SAMPLE_TYPE, D::SAMPLE_TYPE)?;
        Ok(Self::with_core(core, geometry))
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

    pub fn block_size(&self) -> usize {
        self.geometry.block_size
    }

    /// Samples of each block repeated at the start of the next.
    pub fn overlap_samples(&self) -> usize {
        self.geometry.overlap_samples
    }

    /// Read up to `count` blocks into `values`, which must hold
    /// `count * block_size` samples. Returns the number of blocks written.
    pub fn read(&mut self, values: &mut [V], count: usize, timeout: Duration) -> Result<ReadOutcome> {
        self.read_blocks(values, None, count, timeout)
    }

    /// Read up to `count` blocks of values and domain values.
    pub fn read_with_domain(
        &mut self,
        values: &mut [V],
        domain: &mut [D],
        count: usize,
        timeout: Duration,
    ) -> Result<ReadOutcome> {
        self.check_buffer("domain", count, domain.len())?;
        if !self.carry.is_empty() && self.carry_domain.len() != self.carry.len() {
            return Err(DaqError::domain(
                "overlap carried from a read without domain values; read with domain throughout",
            ));
        }
        self.read_blocks(values, Some(domain), count, timeout)
    }

    fn read_blocks(
        &mut self,
        values: &mut [V],
        mut domain: Option<&mut [D]>,
        count: usize,
        timeout: Duration,
    ) -> Result<ReadOutcome> {
        self.core.ensure_valid()?;
        let block_size = self.geometry.block_size;
        self.check_buffer("values", count, values.len())?;

        let deadline = deadline(timeout);
        if count > 0 {
            if let Some(outcome) = self.core.adopt_front_descriptors(deadline) {
                return Ok(outcome);
            }
        }

        if count == 0 || self.core.value().is_none() {
            return Ok(match self.core.take_front_event() {
                Some(event) => {
                    self.clear_carry();
                    self.core.handle_event(event, 0)
                }
                None if self.core.connection().is_closed() => self.core.closed(0),
                None => ReadOutcome::ok(0),
            });
        }

        let any = self.core.config().timeout_type == ReadTimeoutType::Any;
        let need_domain = domain.is_some();
        let mut blocks = 0;

        while blocks < count {
            let need = block_size - self.carry.len();
            let available = self.core.availability(need_domain);

            if available.samples >= need {
                let range = blocks * block_size..(blocks + 1) * block_size;
                if let Err(e) = self.complete_block(
                    &mut values[range.clone()],
                    domain.as_deref_mut().map(|d| &mut d[range]),
                ) {
                    self.clear_carry();
                    return self.core.fail_after(blocks, e);
                }
                blocks += 1;
                if any {
                    break;
                }
                continue;
            }

            match available.blocker {
                Blocker::Event => {
                    self.clear_carry();
                    return Ok(match self.core.discard_until_event() {
                        Some(event) => self.core.handle_event(event, blocks),
                        None => ReadOutcome::ok(blocks),
                    });
                }
                Blocker::MissingDomain if blocks == 0 => {
                    return Err(DaqError::domain("data packet carries no domain packet"));
                }
                Blocker::MissingDomain => break,
                Blocker::None => {
                    if self.core.connection().is_closed() {
                        return Ok(self.core.closed(blocks));
                    }
                    if !self.core.wait_for_samples(deadline, need) {
                        if self.core.connection().is_closed() {
                            return Ok(self.core.closed(blocks));
                        }
                        break;
                    }
                }
            }
        }

        trace!(blocks, carry = self.carry.len(), "Block read finished");
        Ok(ReadOutcome::ok(blocks))
    }

    /// Fill one block from the carry and fresh samples. The caller has
    /// checked that enough samples precede the next blocker.
    fn complete_block(&mut self, block: &mut [V], mut domain: Option<&mut [D]>) -> Result<()> {
        let carried = self.carry.len();
        block[..carried].copy_from_slice(&self.carry);
        if let Some(domain) = domain.as_deref_mut() {
            domain[..carried].copy_from_slice(&self.carry_domain);
        }

        let mut filled = carried;
        while filled < block.len() {
            let need_domain = domain.is_some();
            if !matches!(self.core.next(need_domain), Next::Data) {
                return Err(DaqError::invalid_state("queued samples vanished while completing a block"));
            }
            let want = block.len() - filled;
            filled += self.core.take_samples(
                &mut block[filled..],
                domain.as_deref_mut().map(|d| &mut d[filled..]),
                want,
                self.value_transform.as_ref(),
                self.domain_transform.as_ref(),
            )?;
        }

        let keep = self.geometry.overlap_samples;
        self.carry.clear();
        self.carry.extend_from_slice(&block[block.len() - keep..]);
        self.carry_domain.clear();
        if let Some(domain) = domain {
            self.carry_domain.extend_from_slice(&domain[domain.len() - keep..]);
        }
        Ok(())
    }

    /// A buffer for `count` blocks must hold `count * block_size` samples.
    fn check_buffer(&self, buffer: &'static str, count: usize, len: usize) -> Result<()> {
        let required = count
            .checked_mul(self.geometry.block_size)
            .ok_or_else(|| DaqError::buffer_too_small(buffer, usize::MAX, len))?;
        if len < required {
            return Err(DaqError::buffer_too_small(buffer, required, len));
        }
        Ok(())
    }

    fn clear_carry(&mut self) {
        self.carry.clear();
        self.carry_domain.clear();
    }
}

impl<V: SampleData, D: SampleData> Reader for BlockReader<V, D> {
    /// Complete blocks readable without waiting.
    fn available_count(&self) -> usize {
        if !self.core.is_described() {
            return 0;
        }
        let samples = self.carry.len() + self.core.availability(false).samples;
        if samples < self.geometry.block_size {
            return 0;
        }
        let step = self.geometry.block_size - self.geometry.overlap_samples;
        1 + (samples - self.geometry.block_size) / step
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

    /// The overlap carry is not part of the handoff.
    fn into_handoff(self) -> ReaderHandoff {
        self.core.into_handoff()
    }
}

impl<V: SampleData, D: SampleData> std::fmt::Debug for BlockReader<V, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockReader")
            .field("block_size", &self.geometry.block_size)
            .field("overlap_samples", &self.geometry.overlap_samples)
            .field("carry", &self.carry.len())
            .field("state", &self.state())
            .finish()
    }
}
