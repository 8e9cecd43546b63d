//! Typed readers over a connection
//!
//! Readers turn the packets of one [`Connection`] into typed samples:
//!
//! - [`StreamReader`] reads a continuous sample stream
//! - [`BlockReader`] reads fixed-size, optionally overlapping blocks
//! - [`TailReader`] returns the most recent samples of a bounded history
//! - [`PacketReader`] hands out the raw packets
//!
//! Every typed reader stops at event packets. A `DATA_DESCRIPTOR_CHANGED`
//! event updates the reader's active descriptors; if the new descriptors
//! cannot be read as the reader's output types the reader turns invalid and
//! must be replaced through `from_existing`, which keeps all queued data.
//!
//! ```rust
//! use daqflow::{DataDescriptor, DataPacket, InputPort, Packet, ReadStatus, SampleType, Signal, StreamReader};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let descriptor = DataDescriptor::builder().sample_type(SampleType::Float32).build().unwrap();
//! let signal = Signal::with_descriptor("ai0", descriptor.clone());
//! let port = InputPort::builder("in").build();
//! let mut reader = StreamReader::builder(port.connect(&signal).unwrap()).build::<f64, i64>().unwrap();
//!
//! let packet = DataPacket::from_samples(Arc::new(descriptor), &[1.0f32, 2.0, 3.0]).unwrap();
//! signal.send_packet_and_steal_ref(Packet::from(packet));
//!
//! let mut values = [0.0; 3];
//! let outcome = reader.read(&mut values, 3, Duration::ZERO).unwrap();
//! assert_eq!(outcome.status, ReadStatus::Ok);
//! assert_eq!(values, [1.0, 2.0, 3.0]);
//! ```

mod block_reader;
mod engine;
mod packet_reader;
mod stream_reader;
mod tail_reader;

pub use block_reader::{BlockReader, BlockReaderBuilder};
pub use packet_reader::PacketReader;
pub use stream_reader::{StreamReader, StreamReaderBuilder};
pub use tail_reader::{TailReader, TailReaderBuilder};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::connection::Connection;
use crate::types::{DataDescriptor, DescriptorChanged, EventPacket};

/// Caller-supplied transform applied to freshly decoded samples.
pub type Transform<T> = Arc<dyn Fn(&mut [T], &DataDescriptor) + Send + Sync>;

pub(crate) use engine::{HeldPacket, ReaderCore};

/// Outcome of a read call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// Read finished without meeting an event
    Ok,
    /// An event packet was consumed; re-inspect the descriptors
    Event,
    /// The reader can no longer be used
    Invalid,
}

/// Result of a successful read call.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOutcome {
    pub status: ReadStatus,
    /// Samples (or blocks, for block readers) written to the caller's buffer
    pub count: usize,
    /// The event that stopped the read
    pub event: Option<Arc<EventPacket>>,
    /// Parsed descriptor change, when the event was `DATA_DESCRIPTOR_CHANGED`
    pub change: Option<DescriptorChanged>,
}

impl ReadOutcome {
    pub(crate) fn ok(count: usize) -> Self {
        Self { status: ReadStatus::Ok, count, event: None, change: None }
    }

    pub(crate) fn invalid(count: usize) -> Self {
        Self { status: ReadStatus::Invalid, count, event: None, change: None }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ReadStatus::Ok
    }

    pub fn is_event(&self) -> bool {
        self.status == ReadStatus::Event
    }
}

/// When a blocking read may return early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReadTimeoutType {
    /// Wait for the full requested count (or the timeout)
    #[default]
    All,
    /// Return as soon as any output was produced
    Any,
}

/// Whether post scaling is applied to explicit values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReadMode {
    #[default]
    Scaled,
    /// Return the raw buffer values
    Unscaled,
}

/// Runtime state of a constructed reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Bound,
    Invalid,
}

/// Common queries over every reader kind.
pub trait Reader {
    /// Samples that can be read without waiting.
    fn available_count(&self) -> usize;

    fn empty(&self) -> bool {
        self.available_count() == 0
    }

    fn value_descriptor(&self) -> Option<Arc<DataDescriptor>>;

    fn domain_descriptor(&self) -> Option<Arc<DataDescriptor>>;

    fn state(&self) -> ReaderState;

    fn connection(&self) -> &Connection;

    /// Give up the reader, keeping its connection, descriptors and the
    /// packet it was in the middle of.
    fn into_handoff(self) -> ReaderHandoff
    where
        Self: Sized;
}

/// State passed from a retired reader to its replacement.
#[derive(Debug)]
pub struct ReaderHandoff {
    pub(crate) connection: Connection,
    pub(crate) value: Option<Arc<DataDescriptor>>,
    pub(crate) domain: Option<Arc<DataDescriptor>>,
    pub(crate) held: Option<HeldPacket>,
    pub(crate) resolved: bool,
}

impl ReaderHandoff {
    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}
