//! Core types for signal data representation.
//!
//! This module provides the schema and transfer types of the data plane:
//!
//! - [`DataDescriptor`] describes how raw packet bytes become typed samples
//! - [`DataRule`] says whether values are stored (explicit) or reconstructed
//!   (linear, constant)
//! - [`Packet`] is the immutable, shared unit of transfer: a [`DataPacket`]
//!   with samples or an [`EventPacket`] with a notification
//! - [`SampleData`] decodes raw little-endian values into Rust types
//!
//! ## Usage Example
//!
//! ```rust
//! use daqflow::types::{DataDescriptor, DataPacket, DataRule, Number, SampleType};
//! use std::sync::Arc;
//!
//! // A 1 kHz time axis in microsecond ticks
//! let domain = Arc::new(
//!     DataDescriptor::builder()
//!         .name("time")
//!         .sample_type(SampleType::Int64)
//!         .rule(DataRule::linear(1000, 0))
//!         .build()
//!         .unwrap(),
//! );
//!
//! let packet = DataPacket::implicit(domain, 4, 5000).unwrap();
//! assert_eq!(packet.implicit_value(3), Some(Number::Int(8000)));
//! ```

mod descriptor;
mod domain;
mod event;
mod number;
mod packet;
mod rule;
mod sample_data;
mod sample_type;

pub use descriptor::{DataDescriptor, DataDescriptorBuilder, Dimension, Range, Scaling, Unit};
pub use domain::{normalize_origin, parse_origin};
pub use event::{
    DATA_DESCRIPTOR_CHANGED, DATA_DESCRIPTOR_KEY, DOMAIN_DATA_DESCRIPTOR_KEY, DescriptorChanged,
    DescriptorUpdate, DomainGap, EventPacket, EventValue, GAP_DIFF_KEY,
    IMPLICIT_DOMAIN_GAP_DETECTED,
};
pub use number::{Number, Ratio};
pub use packet::{DataPacket, Packet};
pub use rule::DataRule;
pub use sample_data::{Complex, RangeValue, SampleData, Scalar, read_scalar};
pub use sample_type::SampleType;
