//! Packets: the immutable units of transfer between signals and readers

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{DataDescriptor, EventPacket, Number, SampleData};
use crate::{DaqError, Result};

static NEXT_PACKET_ID: AtomicU64 = AtomicU64::new(1);

/// Unit of transfer through a connection.
///
/// Cloning a packet clones a reference; the payload is shared read-only and
/// freed when the last holder drops it.
#[derive(Debug, Clone)]
pub enum Packet {
    Data(Arc<DataPacket>),
    Event(Arc<EventPacket>),
}

impl Packet {
    /// Samples carried by this packet (0 for events).
    pub fn sample_count(&self) -> usize {
        match self {
            Packet::Data(data) => data.sample_count(),
            Packet::Event(_) => 0,
        }
    }

    pub fn as_data(&self) -> Option<&Arc<DataPacket>> {
        match self {
            Packet::Data(data) => Some(data),
            Packet::Event(_) => None,
        }
    }

    pub fn as_event(&self) -> Option<&Arc<EventPacket>> {
        match self {
            Packet::Event(event) => Some(event),
            Packet::Data(_) => None,
        }
    }

    pub fn is_event(&self) -> bool {
        matches!(self, Packet::Event(_))
    }

    /// Event packet announcing a descriptor change.
    pub fn is_descriptor_changed(&self) -> bool {
        matches!(self, Packet::Event(event) if event.is_descriptor_changed())
    }

    /// Whether both handles refer to the same packet.
    pub fn ptr_eq(&self, other: &Packet) -> bool {
        match (self, other) {
            (Packet::Data(a), Packet::Data(b)) => Arc::ptr_eq(a, b),
            (Packet::Event(a), Packet::Event(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<DataPacket> for Packet {
    fn from(packet: DataPacket) -> Self {
        Packet::Data(Arc::new(packet))
    }
}

impl From<EventPacket> for Packet {
    fn from(packet: EventPacket) -> Self {
        Packet::Event(Arc::new(packet))
    }
}

/// Block of samples described by a [`DataDescriptor`].
///
/// Explicit descriptors carry their values in `buffer`; implicit descriptors
/// carry only `offset`, the domain value the rule is evaluated against.
#[derive(Debug)]
pub struct DataPacket {
    id: u64,
    descriptor: Arc<DataDescriptor>,
    sample_count: usize,
    offset: Number,
    buffer: Option<Box<[u8]>>,
    domain_packet: Option<Packet>,
}

impl DataPacket {
    /// Create a packet for an explicit descriptor from raw little-endian bytes.
    ///
    /// The buffer must hold exactly `sample_count * raw_sample_size` bytes.
    /// Variable-size types carry a single sample of arbitrary length.
    pub fn explicit(
        descriptor: Arc<DataDescriptor>,
        sample_count: usize,
        buffer: Vec<u8>,
    ) -> Result<Self> {
        if descriptor.is_implicit() {
            return Err(DaqError::invalid_descriptor(format!(
                "descriptor '{}' is implicit; explicit packets need an explicit rule",
                descriptor.name()
            )));
        }

        match descriptor.raw_sample_size() {
            Some(size) => {
                let expected = sample_count * size;
                if buffer.len() != expected {
                    return Err(DaqError::buffer_too_small("packet", expected, buffer.len()));
                }
            }
            None if sample_count != 1 => {
                return Err(DaqError::invalid_descriptor(
                    "variable-size samples must be sent one per packet",
                ));
            }
            None => {}
        }

        Ok(Self {
            id: NEXT_PACKET_ID.fetch_add(1, Ordering::Relaxed),
            descriptor,
            sample_count,
            offset: Number::ZERO,
            buffer: Some(buffer.into_boxed_slice()),
            domain_packet: None,
        })
    }

    /// Create a packet of typed samples for an explicit descriptor.
    ///
    /// `T` must match the descriptor's raw sample type.
    pub fn from_samples<T: SampleData>(
        descriptor: Arc<DataDescriptor>,
        samples: &[T],
    ) -> Result<Self> {
        if descriptor.raw_sample_type() != T::SAMPLE_TYPE || descriptor.element_count() != 1 {
            return Err(DaqError::IncompatibleSampleType {
                expected: descriptor.raw_sample_type(),
                found: T::SAMPLE_TYPE,
            });
        }
        let mut buffer = Vec::with_capacity(samples.len() * T::SAMPLE_TYPE.size().unwrap_or(0));
        for sample in samples {
            sample.encode(&mut buffer);
        }
        Self::explicit(descriptor, samples.len(), buffer)
    }

    /// Create a payload-free packet for an implicit (linear or constant)
    /// descriptor.
    pub fn implicit(
        descriptor: Arc<DataDescriptor>,
        sample_count: usize,
        offset: impl Into<Number>,
    ) -> Result<Self> {
        if !descriptor.is_implicit() {
            return Err(DaqError::invalid_descriptor(format!(
                "descriptor '{}' is explicit; implicit packets need a linear or constant rule",
                descriptor.name()
            )));
        }
        Ok(Self {
            id: NEXT_PACKET_ID.fetch_add(1, Ordering::Relaxed),
            descriptor,
            sample_count,
            offset: offset.into(),
            buffer: None,
            domain_packet: None,
        })
    }

    /// Attach the packet supplying this packet's domain values.
    ///
    /// The domain packet must hold one value per sample.
    pub fn with_domain(self, domain: DataPacket) -> Result<Self> {
        self.with_domain_packet(Arc::new(domain))
    }

    /// Attach an already shared domain packet.
    pub fn with_domain_packet(mut self, domain: Arc<DataPacket>) -> Result<Self> {
        if domain.sample_count() != self.sample_count {
            return Err(DaqError::domain(format!(
                "domain packet holds {} samples, data packet holds {}",
                domain.sample_count(),
                self.sample_count
            )));
        }
        self.domain_packet = Some(Packet::Data(domain));
        Ok(self)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn descriptor(&self) -> &Arc<DataDescriptor> {
        &self.descriptor
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn offset(&self) -> Number {
        self.offset
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.buffer.as_deref()
    }

    pub fn domain_packet(&self) -> Option<&Arc<DataPacket>> {
        self.domain_packet.as_ref().and_then(Packet::as_data)
    }

    /// Raw bytes of sample `index` for explicit fixed-size descriptors.
    pub fn raw_sample(&self, index: usize) -> Option<&[u8]> {
        let size = self.descriptor.raw_sample_size()?;
        if index >= self.sample_count || size == 0 {
            return None;
        }
        self.buffer.as_deref()?.get(index * size..(index + 1) * size)
    }

    /// Reconstructed value of sample `index` for implicit descriptors.
    pub fn implicit_value(&self, index: usize) -> Option<Number> {
        if index >= self.sample_count {
            return None;
        }
        self.descriptor.rule().value_at(self.offset, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataRule, SampleType};

    fn explicit_f32() -> Arc<DataDescriptor> {
        Arc::new(DataDescriptor::builder().sample_type(SampleType::Float32).build().unwrap())
    }

    fn linear_i64() -> Arc<DataDescriptor> {
        Arc::new(
            DataDescriptor::builder()
                .sample_type(SampleType::Int64)
                .rule(DataRule::linear(10, 5))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn explicit_packet_validates_length() {
        assert!(DataPacket::explicit(explicit_f32(), 2, vec![0u8; 8]).is_ok());
        assert!(matches!(
            DataPacket::explicit(explicit_f32(), 2, vec![0u8; 7]),
            Err(DaqError::BufferTooSmall { .. })
        ));
    }

    #[test]
    fn typed_samples_are_encoded_little_endian() {
        let packet = DataPacket::from_samples(explicit_f32(), &[1.0f32, 2.5]).unwrap();
        assert_eq!(packet.sample_count(), 2);
        assert_eq!(packet.raw_sample(1).unwrap(), &2.5f32.to_le_bytes());
        assert!(packet.raw_sample(2).is_none());
    }

    #[test]
    fn typed_samples_must_match_raw_type() {
        assert!(DataPacket::from_samples(explicit_f32(), &[1.0f64]).is_err());
    }

    #[test]
    fn implicit_packet_reconstructs_values() {
        let packet = DataPacket::implicit(linear_i64(), 3, 100).unwrap();
        assert!(packet.data().is_none());
        assert_eq!(packet.implicit_value(0), Some(Number::Int(105)));
        assert_eq!(packet.implicit_value(2), Some(Number::Int(125)));
        assert_eq!(packet.implicit_value(3), None);
    }

    #[test]
    fn rule_kind_must_match_constructor() {
        assert!(DataPacket::implicit(explicit_f32(), 3, 0).is_err());
        assert!(DataPacket::explicit(linear_i64(), 0, Vec::new()).is_err());
    }

    #[test]
    fn variable_size_packets_hold_one_sample() {
        let desc = Arc::new(DataDescriptor::builder().sample_type(SampleType::Binary).build().unwrap());
        assert!(DataPacket::explicit(Arc::clone(&desc), 1, vec![1, 2, 3]).is_ok());
        assert!(DataPacket::explicit(desc, 2, vec![1, 2, 3]).is_err());
    }

    #[test]
    fn packet_ids_are_unique_and_clones_share() {
        let a = Packet::from(DataPacket::implicit(linear_i64(), 1, 0).unwrap());
        let b = Packet::from(DataPacket::implicit(linear_i64(), 1, 0).unwrap());
        assert_ne!(a.as_data().unwrap().id(), b.as_data().unwrap().id());
        assert!(a.ptr_eq(&a.clone()));
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn domain_packet_is_attached() {
        let domain = DataPacket::implicit(linear_i64(), 2, 0).unwrap();
        let packet =
            DataPacket::from_samples(explicit_f32(), &[1.0f32, 2.0]).unwrap().with_domain(domain).unwrap();
        assert_eq!(packet.domain_packet().unwrap().sample_count(), 2);
    }

    #[test]
    fn short_domain_packet_is_rejected() {
        let samples = || DataPacket::from_samples(explicit_f32(), &[3.0f32, 4.0]).unwrap();
        let short = DataPacket::implicit(linear_i64(), 1, 0).unwrap();
        assert!(matches!(samples().with_domain(short), Err(DaqError::Domain { .. })));

        let long = Arc::new(DataPacket::implicit(linear_i64(), 3, 0).unwrap());
        assert!(samples().with_domain_packet(long).is_err());
    }
}
