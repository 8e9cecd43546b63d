//! Decode engine shared by the typed readers
//!
//! Owns the connection handle, the active descriptors and the cursor into the
//! data packet currently being decoded. The typed readers drive it and decide
//! how many samples to take per call.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{ReadMode, ReadOutcome, ReadStatus, ReaderHandoff, Transform};
use crate::config::ReaderConfig;
use crate::connection::{Connection, samples_before};
use crate::types::{
    DataDescriptor, DataPacket, DescriptorChanged, EventPacket, Packet, SampleData, SampleType,
    Scalar, read_scalar,
};
use crate::{DaqError, Result};

/// Data packet being decoded and the index of its next unread sample.
#[derive(Debug, Clone)]
pub(crate) struct HeldPacket {
    packet: Arc<DataPacket>,
    position: usize,
}

impl HeldPacket {
    pub(crate) fn new(packet: Arc<DataPacket>) -> Self {
        Self { packet, position: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.packet.sample_count().saturating_sub(self.position)
    }

    pub(crate) fn packet(&self) -> &Arc<DataPacket> {
        &self.packet
    }

    pub(crate) fn position(&self) -> usize {
        self.position
    }
}

/// What stands at the head of the reader's input.
pub(crate) enum Next {
    /// A data packet with unread samples is held
    Data,
    /// An event packet was dequeued
    Event(Arc<EventPacket>),
    /// The front data packet has no domain packet; it was left queued
    MissingDomain,
    Empty,
}

/// What stops the readable run of samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Blocker {
    None,
    Event,
    MissingDomain,
}

/// Samples readable before the first blocker.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Availability {
    pub samples: usize,
    pub blocker: Blocker,
}

pub(crate) struct ReaderCore {
    connection: Connection,
    value: Option<Arc<DataDescriptor>>,
    domain: Option<Arc<DataDescriptor>>,
    held: Option<HeldPacket>,
    config: ReaderConfig,
    value_type: SampleType,
    domain_type: SampleType,
    invalid: bool,
    /// False until a descriptor source was seen; a cleared descriptor counts
    resolved: bool,
    /// Decode failure held back because the read that hit it returned samples
    deferred: Option<DaqError>,
}

impl ReaderCore {
    pub(crate) fn new(
        connection: Connection,
        config: ReaderConfig,
        value_type: SampleType,
        domain_type: SampleType,
    ) -> Result<Self> {
        config.validate()?;
        if connection.is_closed() {
            return Err(DaqError::invalid_state("connection is closed"));
        }

        let (value, domain, resolved) = resolve_initial_descriptors(&connection)?;
        let core = Self {
            connection,
            value,
            domain,
            held: None,
            config,
            value_type,
            domain_type,
            invalid: false,
            resolved,
            deferred: None,
        };
        core.check_compatible()?;
        debug!(
            port = %core.connection.port_name(),
            value = ?core.value.as_ref().map(|d| d.sample_type()),
            output = ?value_type,
            "Reader created"
        );
        Ok(core)
    }

    pub(crate) fn from_handoff(
        handoff: ReaderHandoff,
        config: ReaderConfig,
        value_type: SampleType,
        domain_type: SampleType,
    ) -> Result<Self> {
        config.validate()?;
        let core = Self {
            connection: handoff.connection,
            value: handoff.value,
            domain: handoff.domain,
            held: handoff.held,
            config,
            value_type,
            domain_type,
            invalid: false,
            resolved: handoff.resolved,
            deferred: None,
        };
        core.check_compatible()?;
        debug!(port = %core.connection.port_name(), output = ?value_type, "Reader taken over");
        Ok(core)
    }

    pub(crate) fn into_handoff(self) -> ReaderHandoff {
        ReaderHandoff {
            connection: self.connection,
            value: self.value,
            domain: self.domain,
            held: self.held.filter(|held| held.remaining() > 0),
            resolved: self.resolved,
        }
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.connection
    }

    pub(crate) fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub(crate) fn value(&self) -> Option<&Arc<DataDescriptor>> {
        self.value.as_ref()
    }

    pub(crate) fn domain(&self) -> Option<&Arc<DataDescriptor>> {
        self.domain.as_ref()
    }

    pub(crate) fn is_invalid(&self) -> bool {
        self.invalid
    }

    /// Fail a read up front when the reader is invalid, or report the decode
    /// error the previous read stopped at.
    pub(crate) fn ensure_valid(&mut self) -> Result<()> {
        if self.invalid {
            return Err(DaqError::invalid_state(
                "reader is invalid; build a replacement with from_existing",
            ));
        }
        match self.deferred.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Finish a read that failed after `produced` samples were returned.
    ///
    /// With output the error is kept for the next call, so the samples are
    /// never dropped.
    pub(crate) fn fail_after(&mut self, produced: usize, error: DaqError) -> Result<ReadOutcome> {
        if produced == 0 {
            return Err(error);
        }
        debug!(port = %self.connection.port_name(), produced, error = %error, "Read stopped at decode error");
        self.deferred = Some(error);
        Ok(ReadOutcome::ok(produced))
    }

    /// Whether queued data can be read: descriptors are known, or will be
    /// adopted from the front packet.
    pub(crate) fn is_described(&self) -> bool {
        self.value.is_some() || !self.resolved
    }

    /// Adopt the front data packet's descriptors when no descriptor source
    /// was ever seen. Waits up to `deadline` for a first packet.
    ///
    /// Returns an outcome only when the adopted descriptors cannot be read.
    pub(crate) fn adopt_front_descriptors(&mut self, deadline: Option<Instant>) -> Option<ReadOutcome> {
        if self.resolved {
            return None;
        }
        if deadline.is_some() {
            self.wait_for_packets(deadline);
        }
        let Some(Packet::Data(data)) = self.connection.peek() else {
            return None;
        };

        self.value = Some(Arc::clone(data.descriptor()));
        if let Some(domain_packet) = data.domain_packet() {
            self.domain = Some(Arc::clone(domain_packet.descriptor()));
        }
        self.resolved = true;

        match self.check_compatible() {
            Ok(()) => {
                debug!(port = %self.connection.port_name(), "Descriptors taken from first data packet");
                None
            }
            Err(e) => {
                warn!(
                    port = %self.connection.port_name(),
                    error = %e,
                    "First data packet cannot be read by this reader, reader is now invalid"
                );
                self.invalid = true;
                Some(ReadOutcome::invalid(0))
            }
        }
    }

    fn check_compatible(&self) -> Result<()> {
        let mode = self.config.read_mode;
        if let Some(value) = &self.value {
            check_descriptor(value, self.value_type, mode)?;
        }
        if let Some(domain) = &self.domain {
            check_descriptor(domain, self.domain_type, mode)?;
        }
        Ok(())
    }

    pub(crate) fn held_remaining(&self) -> usize {
        self.held.as_ref().map_or(0, HeldPacket::remaining)
    }

    pub(crate) fn take_held(&mut self) -> Option<HeldPacket> {
        self.held.take()
    }

    /// Samples readable without crossing an event.
    pub(crate) fn available_count(&self) -> usize {
        if !self.is_described() {
            return 0;
        }
        self.held_remaining() + self.connection.samples_until_next_event()
    }

    /// Make sure a data packet with unread samples is held.
    pub(crate) fn next(&mut self, need_domain: bool) -> Next {
        loop {
            if self.held_remaining() > 0 {
                return Next::Data;
            }
            self.held = None;

            let front = self.connection.with_queue(|queue| {
                let next = match queue.front() {
                    Some(Packet::Data(data)) if need_domain && !covers_domain(data) => {
                        return Next::MissingDomain;
                    }
                    Some(_) => queue.pop_front(),
                    None => None,
                };
                match next {
                    Some(Packet::Data(data)) => {
                        self.held = Some(HeldPacket::new(data));
                        Next::Data
                    }
                    Some(Packet::Event(event)) => Next::Event(event),
                    None => Next::Empty,
                }
            });

            match front {
                // Zero-sample packets are skipped
                Next::Data if self.held_remaining() == 0 => continue,
                other => return other,
            }
        }
    }

    /// Dequeue the front event if nothing is held ahead of it.
    pub(crate) fn take_front_event(&mut self) -> Option<Arc<EventPacket>> {
        if self.held_remaining() > 0 {
            return None;
        }
        self.connection.with_queue(|queue| {
            if !queue.front().is_some_and(Packet::is_event) {
                return None;
            }
            queue.pop_front().and_then(|packet| packet.as_event().cloned())
        })
    }

    /// Samples readable before the first event (or, with `need_domain`, the
    /// first packet lacking domain values).
    pub(crate) fn availability(&self, need_domain: bool) -> Availability {
        if let Some(held) = &self.held {
            if held.remaining() > 0 && need_domain && !covers_domain(&held.packet) {
                return Availability { samples: 0, blocker: Blocker::MissingDomain };
            }
        }
        let held = self.held_remaining();
        self.connection.with_queue(|queue| {
            let mut samples = held;
            for packet in queue.iter() {
                match packet {
                    Packet::Event(_) => return Availability { samples, blocker: Blocker::Event },
                    Packet::Data(data) if need_domain && !covers_domain(data) => {
                        return Availability { samples, blocker: Blocker::MissingDomain };
                    }
                    Packet::Data(data) => samples += data.sample_count(),
                }
            }
            Availability { samples, blocker: Blocker::None }
        })
    }

    /// Drop the held packet and every data packet ahead of the next event,
    /// then dequeue that event.
    pub(crate) fn discard_until_event(&mut self) -> Option<Arc<EventPacket>> {
        let dropped = self.held.take().map_or(0, |held| held.remaining());
        let (dropped, event) = self.connection.with_queue(|queue| {
            let mut dropped = dropped;
            while let Some(packet) = queue.pop_front() {
                match packet {
                    Packet::Data(data) => dropped += data.sample_count(),
                    Packet::Event(event) => return (dropped, Some(event)),
                }
            }
            (dropped, None)
        });
        if dropped > 0 {
            debug!(port = %self.connection.port_name(), dropped, "Discarded samples before event");
        }
        event
    }

    /// Block until packets are queued, the deadline passes or the connection
    /// closes. Returns whether packets are available.
    pub(crate) fn wait_for_packets(&self, deadline: Option<Instant>) -> bool {
        self.connection.wait_until(deadline, |queue| !queue.is_empty())
    }

    /// Block until `need` samples are readable before the next event, or an
    /// event is queued.
    pub(crate) fn wait_for_samples(&self, deadline: Option<Instant>, need: usize) -> bool {
        let held = self.held_remaining();
        self.connection.wait_until(deadline, |queue: &VecDeque<Packet>| {
            held + samples_before(queue, Packet::is_event) >= need || queue.iter().any(Packet::is_event)
        })
    }

    /// Apply an event to the active descriptors.
    pub(crate) fn handle_event(&mut self, event: Arc<EventPacket>, count: usize) -> ReadOutcome {
        if !event.is_descriptor_changed() {
            return ReadOutcome { status: ReadStatus::Event, count, event: Some(event), change: None };
        }

        let change = match DescriptorChanged::from_event(&event) {
            Ok(change) => change,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed descriptor change");
                return ReadOutcome {
                    status: ReadStatus::Event,
                    count,
                    event: Some(event),
                    change: None,
                };
            }
        };

        change.value.apply(&mut self.value);
        change.domain.apply(&mut self.domain);
        self.resolved = true;

        let status = match self.check_compatible() {
            Ok(()) => {
                debug!(port = %self.connection.port_name(), "Descriptors changed");
                ReadStatus::Event
            }
            Err(e) => {
                warn!(
                    port = %self.connection.port_name(),
                    error = %e,
                    "Descriptor change cannot be read by this reader, reader is now invalid"
                );
                self.invalid = true;
                ReadStatus::Invalid
            }
        };
        ReadOutcome { status, count, event: Some(event), change: Some(change) }
    }

    /// Mark the reader invalid because its connection closed.
    pub(crate) fn closed(&mut self, count: usize) -> ReadOutcome {
        if !self.invalid {
            debug!(port = %self.connection.port_name(), "Connection closed, reader is now invalid");
        }
        self.invalid = true;
        ReadOutcome::invalid(count)
    }

    /// Decode up to `max` samples of the held packet into the front of
    /// `values` (and `domain`), advancing the cursor. Returns the count.
    ///
    /// A packet that fails to decode is dropped so later reads move past it.
    pub(crate) fn take_samples<V: SampleData, D: SampleData>(
        &mut self,
        values: &mut [V],
        domain: Option<&mut [D]>,
        max: usize,
        value_transform: Option<&Transform<V>>,
        domain_transform: Option<&Transform<D>>,
    ) -> Result<usize> {
        let result = self.decode_held(values, domain, max, value_transform, domain_transform);
        if let Err(e) = &result {
            if let Some(held) = self.held.take() {
                warn!(
                    port = %self.connection.port_name(),
                    error = %e,
                    dropped = held.remaining(),
                    "Dropping data packet that cannot be decoded"
                );
            }
        }
        result
    }

    fn decode_held<V: SampleData, D: SampleData>(
        &mut self,
        values: &mut [V],
        domain: Option<&mut [D]>,
        max: usize,
        value_transform: Option<&Transform<V>>,
        domain_transform: Option<&Transform<D>>,
    ) -> Result<usize> {
        let mode = self.config.read_mode;
        let Some(held) = self.held.as_mut() else {
            return Ok(0);
        };
        let n = held.remaining().min(max);
        if n == 0 {
            return Ok(0);
        }

        let packet = &held.packet;
        let values = &mut values[..n];
        decode_range(packet, held.position, values, mode)?;
        if let Some(transform) = value_transform {
            transform(values, packet.descriptor());
        }

        if let Some(domain) = domain {
            let domain_packet = packet
                .domain_packet()
                .ok_or_else(|| DaqError::domain("data packet carries no domain packet"))?;
            let domain = &mut domain[..n];
            decode_range(domain_packet, held.position, domain, mode)?;
            if let Some(transform) = domain_transform {
                transform(domain, domain_packet.descriptor());
            }
        }

        held.position += n;
        Ok(n)
    }
}

/// Read deadline; a zero timeout never waits.
pub(crate) fn deadline(timeout: Duration) -> Option<Instant> {
    if timeout.is_zero() {
        return None;
    }
    Instant::now().checked_add(timeout)
}

/// Whether `data` carries a domain value for every sample.
fn covers_domain(data: &DataPacket) -> bool {
    data.domain_packet().is_some_and(|domain| domain.sample_count() >= data.sample_count())
}

type InitialDescriptors = (Option<Arc<DataDescriptor>>, Option<Arc<DataDescriptor>>, bool);

/// Initial value and domain descriptors, and whether any source supplied them.
fn resolve_initial_descriptors(connection: &Connection) -> Result<InitialDescriptors> {
    let signal = connection.signal();
    let from_signal = signal
        .as_ref()
        .map(|s| (s.descriptor(), s.domain_descriptor()))
        .unwrap_or_default();

    if let Some(Packet::Event(event)) = connection.peek() {
        if event.is_descriptor_changed() {
            let change = DescriptorChanged::from_event(&event)?;
            connection.dequeue();
            let (mut value, mut domain) = from_signal;
            change.value.apply(&mut value);
            change.domain.apply(&mut domain);
            return Ok((value, domain, true));
        }
    }

    let (value, domain) = from_signal;
    if value.is_some() {
        return Ok((value, domain, true));
    }

    if let Some(Packet::Data(data)) = connection.peek() {
        let domain = data.domain_packet().map(|d| Arc::clone(d.descriptor())).or(domain);
        return Ok((Some(Arc::clone(data.descriptor())), domain, true));
    }

    Ok((value, domain, false))
}

/// Sample type the reader sees for `descriptor` under `mode`.
fn readable_type(descriptor: &DataDescriptor, mode: ReadMode) -> SampleType {
    match (mode, descriptor.post_scaling()) {
        (ReadMode::Unscaled, Some(scaling)) => scaling.input_type(),
        _ => descriptor.sample_type(),
    }
}

fn check_descriptor(descriptor: &DataDescriptor, output: SampleType, mode: ReadMode) -> Result<()> {
    let sample_type = descriptor.sample_type();
    if descriptor.element_count() != 1
        || sample_type == SampleType::Struct
        || sample_type.is_variable_size()
    {
        return Err(DaqError::configuration(format!(
            "descriptor '{}' does not describe scalar samples; read it with a PacketReader",
            descriptor.name()
        )));
    }

    let found = readable_type(descriptor, mode);
    if !found.is_convertible_to(output) {
        return Err(DaqError::IncompatibleSampleType { expected: output, found });
    }
    Ok(())
}

/// Decode samples `start..start + out.len()` of `packet`.
pub(crate) fn decode_range<T: SampleData>(
    packet: &DataPacket,
    start: usize,
    out: &mut [T],
    mode: ReadMode,
) -> Result<()> {
    let descriptor = packet.descriptor();

    if descriptor.is_implicit() {
        for (i, slot) in out.iter_mut().enumerate() {
            let value = packet
                .implicit_value(start + i)
                .ok_or(DaqError::Memory { offset: start + i })?;
            *slot = T::from_scalar(Scalar::from(value))?;
        }
        return Ok(());
    }

    let sample_size = descriptor.raw_sample_size().unwrap_or(0);
    let stored = descriptor.raw_sample_type();
    let sample = |index: usize| {
        packet.raw_sample(index).ok_or(DaqError::Memory { offset: index * sample_size })
    };

    match (mode, descriptor.post_scaling()) {
        (ReadMode::Scaled, Some(scaling)) => {
            for (i, slot) in out.iter_mut().enumerate() {
                let raw = read_scalar(sample(start + i)?, stored)?;
                *slot = T::from_scalar(Scalar::Float(scaling.apply(raw.as_f64())))?;
            }
        }
        _ => {
            for (i, slot) in out.iter_mut().enumerate() {
                *slot = T::decode(sample(start + i)?, stored)?;
            }
        }
    }
    Ok(())
}
