//! Signals: named packet sources fanning out to connections
//!
//! A [`Signal`] owns the current value descriptor, an optional domain signal
//! and one [`Connection`] per connected [`InputPort`]. Descriptor changes are
//! delivered in band as `DATA_DESCRIPTOR_CHANGED` event packets, so every
//! reader sees them at the exact position in the sample stream where they
//! took effect.

mod input_port;

pub use input_port::{InputPort, InputPortBuilder};

use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

use crate::connection::Connection;
use crate::types::{DataDescriptor, DescriptorUpdate, EventPacket, Packet};

/// Named source of packets.
///
/// Cloning a `Signal` clones a handle to the same signal.
#[derive(Clone)]
pub struct Signal {
    inner: Arc<SignalInner>,
}

pub(crate) struct SignalInner {
    name: String,
    remote: bool,
    state: RwLock<SignalState>,
}

#[derive(Default)]
struct SignalState {
    descriptor: Option<Arc<DataDescriptor>>,
    domain_signal: Option<Signal>,
    // Signals using this one as their domain
    value_signals: Vec<Weak<SignalInner>>,
    connections: Vec<Connection>,
}

impl Signal {
    pub fn new(name: impl Into<String>) -> Self {
        Self::create(name.into(), None, false)
    }

    pub fn with_descriptor(name: impl Into<String>, descriptor: DataDescriptor) -> Self {
        Self::create(name.into(), Some(Arc::new(descriptor)), false)
    }

    /// Signal of a remote device; its connections never carry packets locally.
    pub fn remote(name: impl Into<String>, descriptor: Option<DataDescriptor>) -> Self {
        Self::create(name.into(), descriptor.map(Arc::new), true)
    }

    fn create(name: String, descriptor: Option<Arc<DataDescriptor>>, remote: bool) -> Self {
        let state = SignalState { descriptor, ..Default::default() };
        Self { inner: Arc::new(SignalInner { name, remote, state: RwLock::new(state) }) }
    }

    pub(crate) fn from_inner(inner: Arc<SignalInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<SignalInner> {
        &self.inner
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_remote(&self) -> bool {
        self.inner.remote
    }

    pub fn descriptor(&self) -> Option<Arc<DataDescriptor>> {
        self.inner.state.read().descriptor.clone()
    }

    pub fn domain_signal(&self) -> Option<Signal> {
        self.inner.state.read().domain_signal.clone()
    }

    /// Descriptor of the domain signal, if one is set and described.
    pub fn domain_descriptor(&self) -> Option<Arc<DataDescriptor>> {
        self.domain_signal().and_then(|domain| domain.descriptor())
    }

    /// Replace the value descriptor and announce it on every connection.
    ///
    /// `None` announces that the signal currently has no descriptor. Signals
    /// using this one as their domain announce a domain change as well.
    pub fn set_descriptor(&self, descriptor: Option<DataDescriptor>) {
        let descriptor = descriptor.map(Arc::new);
        let (connections, value_signals) = {
            let mut state = self.inner.state.write();
            state.descriptor = descriptor.clone();
            state.value_signals.retain(|weak| weak.strong_count() > 0);
            (state.connections.clone(), state.value_signals.clone())
        };

        debug!(signal = %self.inner.name, connections = connections.len(), "Descriptor changed");
        let update = to_update(descriptor);
        let event = Packet::from(EventPacket::descriptor_changed(
            update.clone(),
            DescriptorUpdate::Unchanged,
        ));
        broadcast(&connections, event);

        let domain_event =
            Packet::from(EventPacket::descriptor_changed(DescriptorUpdate::Unchanged, update));
        for value_signal in value_signals.iter().filter_map(Weak::upgrade) {
            let connections = value_signal.state.read().connections.clone();
            broadcast(&connections, domain_event.clone());
        }
    }

    /// Set or clear the signal supplying this signal's domain values and
    /// announce the new domain descriptor on every connection.
    pub fn set_domain_signal(&self, domain: Option<&Signal>) {
        let (previous, connections) = {
            let mut state = self.inner.state.write();
            let previous = std::mem::replace(&mut state.domain_signal, domain.cloned());
            (previous, state.connections.clone())
        };

        if let Some(previous) = previous {
            previous
                .inner
                .state
                .write()
                .value_signals
                .retain(|weak| !std::ptr::eq(weak.as_ptr(), Arc::as_ptr(&self.inner)));
        }

        let descriptor = domain.and_then(|domain| {
            domain.inner.state.write().value_signals.push(Arc::downgrade(&self.inner));
            domain.descriptor()
        });

        debug!(
            signal = %self.inner.name,
            domain = domain.map(Signal::name).unwrap_or("none"),
            "Domain signal changed"
        );
        let event = Packet::from(EventPacket::descriptor_changed(
            DescriptorUpdate::Unchanged,
            to_update(descriptor),
        ));
        broadcast(&connections, event);
    }

    /// Send a packet to every connection, sharing the caller's handle.
    pub fn send_packet(&self, packet: &Packet) {
        for connection in self.connections() {
            connection.enqueue(packet);
        }
    }

    /// Send a packet to every connection, taking over the caller's handle.
    pub fn send_packet_and_steal_ref(&self, packet: Packet) {
        broadcast(&self.connections(), packet);
    }

    /// Send several packets in order; each connection receives them under a
    /// single enqueue.
    pub fn send_packets(&self, packets: Vec<Packet>) {
        let connections = self.connections();
        let Some((last, rest)) = connections.split_last() else {
            trace!(signal = %self.inner.name, "No connections, dropping packets");
            return;
        };
        for connection in rest {
            connection.enqueue_multiple(&packets);
        }
        last.enqueue_multiple_and_steal_refs(packets);
    }

    /// Close and forget every connection.
    pub fn remove(&self) {
        let connections = std::mem::take(&mut self.inner.state.write().connections);
        debug!(signal = %self.inner.name, connections = connections.len(), "Signal removed");
        for connection in connections {
            connection.close();
        }
    }

    /// Current connections, one per connected input port.
    pub fn connections(&self) -> Vec<Connection> {
        self.inner.state.read().connections.clone()
    }

    /// Register a new connection and queue its initial descriptor event.
    ///
    /// The event is queued under the signal lock so no packet sent
    /// concurrently can overtake it.
    pub(crate) fn attach(&self, connection: Connection) {
        let was_empty = {
            let mut state = self.inner.state.write();
            let was_empty = state.descriptor.clone().and_then(|descriptor| {
                let domain = state
                    .domain_signal
                    .as_ref()
                    .and_then(Signal::descriptor)
                    .map(DescriptorUpdate::Changed)
                    .unwrap_or_default();
                let event = EventPacket::descriptor_changed(DescriptorUpdate::Changed(descriptor), domain);
                connection.enqueue_deferred(Packet::from(event))
            });
            state.connections.push(connection.clone());
            was_empty
        };

        if let Some(was_empty) = was_empty {
            connection.notify_ready(was_empty);
        }
    }

    pub(crate) fn detach(&self, connection: &Connection) {
        self.inner.state.write().connections.retain(|c| !c.ptr_eq(connection));
    }
}

fn to_update(descriptor: Option<Arc<DataDescriptor>>) -> DescriptorUpdate {
    match descriptor {
        Some(descriptor) => DescriptorUpdate::Changed(descriptor),
        None => DescriptorUpdate::Cleared,
    }
}

fn broadcast(connections: &[Connection], packet: Packet) {
    let Some((last, rest)) = connections.split_last() else {
        return;
    };
    for connection in rest {
        connection.enqueue(&packet);
    }
    last.enqueue_and_steal_ref(packet);
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Signal")
            .field("name", &self.inner.name)
            .field("remote", &self.inner.remote)
            .field("descriptor", &state.descriptor.as_ref().map(|d| d.name().to_string()))
            .field("connections", &state.connections.len())
            .finish()
    }
}
