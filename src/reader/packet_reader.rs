//! Raw packet access

use std::sync::Arc;
use tracing::{debug, warn};

use super::{HeldPacket, Reader, ReaderHandoff, ReaderState};
use crate::connection::Connection;
use crate::types::{DataDescriptor, DescriptorChanged, Packet};
use crate::{DaqError, Result};

/// Hands out the packets of a connection unchanged.
///
/// Used for data the typed readers cannot decode, such as struct or
/// variable-size samples. Descriptor-changed events are returned like any
/// other packet and also update [`Reader::value_descriptor`].
///
/// A reader built with [`PacketReader::from_existing`] returns the packet its
/// predecessor was in the middle of first, whole. The samples already
/// returned by the predecessor are delivered again; skip the first
/// [`PacketReader::resume_position`] samples of that packet to avoid the
/// duplicates.
pub struct PacketReader {
    connection: Connection,
    value: Option<Arc<DataDescriptor>>,
    domain: Option<Arc<DataDescriptor>>,
    // Packet a previous reader was in the middle of
    pending: Option<HeldPacket>,
    resolved: bool,
}

impl PacketReader {
    pub fn new(connection: Connection) -> Result<Self> {
        if connection.is_closed() {
            return Err(DaqError::invalid_state("connection is closed"));
        }
        let (value, domain) = connection
            .signal()
            .map(|signal| (signal.descriptor(), signal.domain_descriptor()))
            .unwrap_or_default();
        let resolved = value.is_some();
        Ok(Self { connection, value, domain, pending: None, resolved })
    }

    /// Replace `old`. A packet `old` had partly read is returned whole by
    /// the first [`Self::read`]; see [`Self::resume_position`].
    pub fn from_existing<R: Reader>(old: R) -> Self {
        let ReaderHandoff { connection, value, domain, held, resolved } = old.into_handoff();
        if let Some(held) = &held {
            debug!(
                port = %connection.port_name(),
                returned = held.position(),
                "Packet reader resumes a partly read packet"
            );
        }
        Self { connection, value, domain, pending: held, resolved }
    }

    /// Leading samples of the next packet [`Self::read`] returns that the
    /// replaced reader already returned. `None` once that packet was read.
    pub fn resume_position(&self) -> Option<usize> {
        self.pending.as_ref().map(HeldPacket::position)
    }

    /// Take the next packet, or `None` if nothing is queued.
    pub fn read(&mut self) -> Option<Packet> {
        if let Some(held) = self.pending.take() {
            return Some(Packet::Data(Arc::clone(held.packet())));
        }
        let packet = self.connection.dequeue()?;
        self.track(&packet);
        Some(packet)
    }

    /// Take every queued packet.
    pub fn read_all(&mut self) -> Vec<Packet> {
        let mut packets: Vec<Packet> =
            self.pending.take().map(|held| Packet::Data(Arc::clone(held.packet()))).into_iter().collect();
        let queued = self.connection.dequeue_all();
        for packet in &queued {
            self.track(packet);
        }
        packets.extend(queued);
        packets
    }

    fn track(&mut self, packet: &Packet) {
        let Some(event) = packet.as_event().filter(|event| event.is_descriptor_changed()) else {
            return;
        };
        match DescriptorChanged::from_event(event) {
            Ok(change) => {
                change.value.apply(&mut self.value);
                change.domain.apply(&mut self.domain);
                self.resolved = true;
            }
            Err(e) => warn!(error = %e, "Ignoring malformed descriptor change"),
        }
    }
}

impl Reader for PacketReader {
    /// Packets that can be read without waiting.
    fn available_count(&self) -> usize {
        self.connection.packet_count() + usize::from(self.pending.is_some())
    }

    fn value_descriptor(&self) -> Option<Arc<DataDescriptor>> {
        self.value.clone()
    }

    fn domain_descriptor(&self) -> Option<Arc<DataDescriptor>> {
        self.domain.clone()
    }

    fn state(&self) -> ReaderState {
        if self.connection.is_closed() { ReaderState::Invalid } else { ReaderState::Bound }
    }

    fn connection(&self) -> &Connection {
        &self.connection
    }

    fn into_handoff(self) -> ReaderHandoff {
        ReaderHandoff {
            connection: self.connection,
            value: self.value,
            domain: self.domain,
            held: self.pending,
            resolved: self.resolved,
        }
    }
}

impl std::fmt::Debug for PacketReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketReader")
            .field("connection", &self.connection)
            .field("pending", &self.pending.is_some())
            .finish()
    }
}
