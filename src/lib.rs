//! Signal data plane for data-acquisition SDKs.
//!
//! DaqFlow moves sample packets from the signals that produce them to the
//! input ports that consume them, and decodes them into typed buffers on the
//! consumer side.
//!
//! # Features
//!
//! - **Descriptors**: [`DataDescriptor`] and [`DataRule`] describe explicit
//!   and rule-generated (linear, constant) samples
//! - **Connections**: a thread-safe FIFO per signal/port pair with configurable
//!   packet-ready notification
//! - **Typed readers**: stream, block and tail readers that stop at descriptor
//!   changes and can be replaced without losing queued data
//! - **Async**: connections double as a `futures` stream of packets
//!
//! # Quick Start
//!
//! ```rust
//! use daqflow::{DataDescriptor, DataPacket, InputPort, Packet, ReadStatus, SampleType, Signal, StreamReader};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let descriptor = DataDescriptor::builder().name("ai0").sample_type(SampleType::Int16).build()?;
//! let signal = Signal::with_descriptor("ai0", descriptor.clone());
//!
//! let port = InputPort::builder("in").build();
//! let mut reader = StreamReader::builder(port.connect(&signal)?).build::<f64, i64>()?;
//!
//! signal.send_packet_and_steal_ref(Packet::from(DataPacket::from_samples(Arc::new(descriptor), &[1i16, 2, 3])?));
//!
//! let mut values = [0.0; 3];
//! let outcome = reader.read(&mut values, 3, Duration::from_millis(100))?;
//! assert_eq!(outcome.status, ReadStatus::Ok);
//! assert_eq!(values, [1.0, 2.0, 3.0]);
//! # Ok::<(), daqflow::DaqError>(())
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use daqflow::{ReadTimeoutType, ReaderConfig};
//!
//! let config = ReaderConfig::from_yaml("timeout_type: Any\nhistory_size: 64\n")?;
//! assert_eq!(config.timeout_type, ReadTimeoutType::Any);
//! # Ok::<(), daqflow::DaqError>(())
//! ```

// Core types and error handling
pub mod config;
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Transport and consumers
pub mod connection;
pub mod reader;
pub mod signal;

// Core exports
pub use error::*;
pub use types::*;

pub use config::ReaderConfig;
pub use connection::{
    Connection, MainLoopScheduler, NotificationMode, PacketListener, PacketNotifier, Scheduler,
    Task, TokioScheduler,
};
pub use reader::{
    BlockReader, BlockReaderBuilder, PacketReader, ReadMode, ReadOutcome, ReadStatus,
    ReadTimeoutType, Reader, ReaderHandoff, ReaderState, StreamReader, StreamReaderBuilder,
    TailReader, TailReaderBuilder, Transform,
};
pub use signal::{InputPort, InputPortBuilder, Signal};
