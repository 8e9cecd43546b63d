//! Test utilities for building descriptors and packets
//!
//! Shared by unit tests and the criterion benches. Every helper panics on
//! invalid input since fixtures are expected to be well formed.

#![cfg(any(test, feature = "benchmark"))]

use std::sync::Arc;

use crate::types::{
    DataDescriptor, DataPacket, DataRule, DescriptorUpdate, EventPacket, Packet, Ratio, SampleData,
    SampleType,
};

/// Explicit descriptor with the given sample type.
pub fn explicit_descriptor(name: &str, sample_type: SampleType) -> Arc<DataDescriptor> {
    Arc::new(
        DataDescriptor::builder()
            .name(name)
            .sample_type(sample_type)
            .build()
            .expect("explicit fixture descriptor"),
    )
}

/// Explicit `Float64` descriptor.
pub fn f64_descriptor() -> Arc<DataDescriptor> {
    explicit_descriptor("values", SampleType::Float64)
}

/// Linear `Int64` time domain with microsecond ticks and a Unix epoch origin.
pub fn time_domain(delta: i64) -> Arc<DataDescriptor> {
    Arc::new(
        DataDescriptor::builder()
            .name("time")
            .sample_type(SampleType::Int64)
            .rule(DataRule::linear(delta, 0))
            .tick_resolution(Ratio::new(1, 1_000_000).expect("non-zero denominator"))
            .origin("1970-01-01T00:00:00Z")
            .build()
            .expect("linear fixture descriptor"),
    )
}

/// Data packet holding `samples` under `descriptor`.
pub fn samples_packet<T: SampleData>(descriptor: &Arc<DataDescriptor>, samples: &[T]) -> Packet {
    Packet::from(DataPacket::from_samples(Arc::clone(descriptor), samples).expect("fixture samples"))
}

/// `Float64` data packet with a linear domain packet starting at `offset`.
pub fn packet_with_domain(
    descriptor: &Arc<DataDescriptor>,
    domain: &Arc<DataDescriptor>,
    samples: &[f64],
    offset: i64,
) -> Packet {
    let domain_packet = DataPacket::implicit(Arc::clone(domain), samples.len(), offset)
        .expect("fixture domain packet");
    let packet = DataPacket::from_samples(Arc::clone(descriptor), samples)
        .expect("fixture samples")
        .with_domain(domain_packet)
        .expect("fixture domain length");
    Packet::from(packet)
}

/// Descriptor-changed event switching the value descriptor.
pub fn value_changed(descriptor: &Arc<DataDescriptor>) -> Packet {
    Packet::from(EventPacket::descriptor_changed(
        DescriptorUpdate::Changed(Arc::clone(descriptor)),
        DescriptorUpdate::Unchanged,
    ))
}

/// Descriptor-changed event setting both descriptors.
pub fn descriptors_changed(value: &Arc<DataDescriptor>, domain: &Arc<DataDescriptor>) -> Packet {
    Packet::from(EventPacket::descriptor_changed(
        DescriptorUpdate::Changed(Arc::clone(value)),
        DescriptorUpdate::Changed(Arc::clone(domain)),
    ))
}

/// Sequential `f64` values starting at `start`.
pub fn ramp(start: f64, len: usize) -> Vec<f64> {
    (0..len).map(|i| start + i as f64).collect()
}
