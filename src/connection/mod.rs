//! Packet queue between one signal and one input port
//!
//! A [`Connection`] is a single-producer/single-consumer FIFO of [`Packet`]s.
//! The producer side (usually [`Signal::send_packet`](crate::Signal::send_packet))
//! appends without blocking; the consumer side dequeues directly or through a
//! reader. Packets are never reordered and never mutated.

mod notify;
mod stream;

#[cfg(test)]
mod tests;

pub use notify::{
    MainLoopScheduler, NotificationMode, PacketListener, PacketNotifier, Scheduler, Task,
    TokioScheduler,
};

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::signal::{Signal, SignalInner};
use crate::types::Packet;

/// Ordered hand-off buffer between one producer and one consumer.
///
/// Cloning a `Connection` clones a handle to the same queue.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    queue: Mutex<VecDeque<Packet>>,
    ready: Condvar,
    closed: AtomicBool,
    remote: bool,
    signal: Weak<SignalInner>,
    port_name: String,
    notifier: Arc<PacketNotifier>,
    notify: Notify,
    cancel: CancellationToken,
}

impl Connection {
    /// Standalone connection not attached to a signal.
    pub fn new(port_name: impl Into<String>) -> Self {
        Self::build(Weak::new(), port_name.into(), Arc::new(PacketNotifier::default()), false)
    }

    /// Standalone connection whose packets are delivered out of band.
    pub fn new_remote(port_name: impl Into<String>) -> Self {
        Self::build(Weak::new(), port_name.into(), Arc::new(PacketNotifier::default()), true)
    }

    pub(crate) fn attached(
        signal: Weak<SignalInner>,
        port_name: String,
        notifier: Arc<PacketNotifier>,
        remote: bool,
    ) -> Self {
        Self::build(signal, port_name, notifier, remote)
    }

    fn build(
        signal: Weak<SignalInner>,
        port_name: String,
        notifier: Arc<PacketNotifier>,
        remote: bool,
    ) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                queue: Mutex::new(VecDeque::new()),
                ready: Condvar::new(),
                closed: AtomicBool::new(false),
                remote,
                signal,
                port_name,
                notifier,
                notify: Notify::new(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Append a packet, sharing the caller's handle.
    pub fn enqueue(&self, packet: &Packet) {
        self.enqueue_and_steal_ref(packet.clone());
    }

    /// Append a packet, taking over the caller's handle.
    pub fn enqueue_and_steal_ref(&self, packet: Packet) {
        if let Some(was_empty) = self.push(std::iter::once(packet)) {
            self.inner.notifier.packet_ready(self, was_empty);
        }
    }

    /// Append a packet and run the packet-ready listener on this thread,
    /// bypassing the port's notification mode.
    pub fn enqueue_on_this_thread(&self, packet: Packet) {
        if self.push(std::iter::once(packet)).is_some() {
            self.inner.notifier.packet_ready_on_this_thread(self);
        }
    }

    /// Append several packets in order under a single lock.
    pub fn enqueue_multiple(&self, packets: &[Packet]) {
        if let Some(was_empty) = self.push(packets.iter().cloned()) {
            self.inner.notifier.packet_ready(self, was_empty);
        }
    }

    /// Append several packets in order, taking over the caller's handles.
    pub fn enqueue_multiple_and_steal_refs(&self, packets: Vec<Packet>) {
        if let Some(was_empty) = self.push(packets) {
            self.inner.notifier.packet_ready(self, was_empty);
        }
    }

    /// Append without notifying the listener; pair with [`Self::notify_ready`]
    /// once the caller has released its own locks.
    pub(crate) fn enqueue_deferred(&self, packet: Packet) -> Option<bool> {
        self.push(std::iter::once(packet))
    }

    pub(crate) fn notify_ready(&self, queue_was_empty: bool) {
        self.inner.notifier.packet_ready(self, queue_was_empty);
    }

    /// Push under the queue lock and wake waiters.
    ///
    /// Returns whether the queue was empty beforehand, or `None` when nothing
    /// was appended.
    fn push(&self, packets: impl IntoIterator<Item = Packet>) -> Option<bool> {
        if self.inner.remote {
            trace!(port = %self.inner.port_name, "Dropping packets on remote connection");
            return None;
        }

        let was_empty = {
            let mut queue = self.inner.queue.lock();
            if self.inner.closed.load(Ordering::Acquire) {
                trace!(port = %self.inner.port_name, "Dropping packets on closed connection");
                return None;
            }
            let before = queue.len();
            queue.extend(packets);
            if queue.len() == before {
                return None;
            }
            before == 0
        };

        self.inner.ready.notify_all();
        self.inner.notify.notify_one();
        Some(was_empty)
    }

    /// Remove and return the front packet; `None` when the queue is empty.
    pub fn dequeue(&self) -> Option<Packet> {
        self.inner.queue.lock().pop_front()
    }

    /// Return the front packet without removing it.
    pub fn peek(&self) -> Option<Packet> {
        self.inner.queue.lock().front().cloned()
    }

    /// Remove and return every queued packet in order.
    pub fn dequeue_all(&self) -> VecDeque<Packet> {
        std::mem::take(&mut *self.inner.queue.lock())
    }

    pub fn packet_count(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Samples in all queued data packets, regardless of descriptor.
    pub fn available_samples(&self) -> usize {
        self.inner.queue.lock().iter().map(Packet::sample_count).sum()
    }

    /// Samples queued ahead of the first descriptor-changed event.
    pub fn samples_until_next_descriptor(&self) -> usize {
        samples_before(&self.inner.queue.lock(), Packet::is_descriptor_changed)
    }

    /// Samples queued ahead of the first event of any kind.
    pub fn samples_until_next_event(&self) -> usize {
        samples_before(&self.inner.queue.lock(), Packet::is_event)
    }

    pub fn has_event_packet(&self) -> bool {
        self.inner.queue.lock().iter().any(Packet::is_event)
    }

    pub fn is_remote(&self) -> bool {
        self.inner.remote
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Close the connection: drain the queue, refuse further packets and wake
    /// any blocked reader or stream.
    pub fn close(&self) {
        let drained = {
            let mut queue = self.inner.queue.lock();
            if self.inner.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *queue).len()
        };

        debug!(port = %self.inner.port_name, drained, "Connection closed");
        self.inner.ready.notify_all();
        self.inner.cancel.cancel();
    }

    /// Producing signal, if it is still alive.
    pub fn signal(&self) -> Option<Signal> {
        self.inner.signal.upgrade().map(Signal::from_inner)
    }

    pub(crate) fn is_from(&self, signal: &Arc<SignalInner>) -> bool {
        std::ptr::eq(self.inner.signal.as_ptr(), Arc::as_ptr(signal))
    }

    pub fn port_name(&self) -> &str {
        &self.inner.port_name
    }

    /// Whether both handles refer to the same queue.
    pub fn ptr_eq(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Block until `ready` holds for the queue, the deadline passes or the
    /// connection closes.
    ///
    /// Without a deadline the predicate is checked once and the call never
    /// waits. Returns the final predicate result.
    pub(crate) fn wait_until<F>(&self, deadline: Option<Instant>, mut ready: F) -> bool
    where
        F: FnMut(&VecDeque<Packet>) -> bool,
    {
        let mut queue = self.inner.queue.lock();
        loop {
            if ready(&queue) {
                return true;
            }
            if self.inner.closed.load(Ordering::Acquire) {
                return false;
            }
            let Some(deadline) = deadline else {
                return false;
            };
            if self.inner.ready.wait_until(&mut queue, deadline).timed_out() {
                return ready(&queue);
            }
        }
    }

    /// Run `f` with the queue locked.
    pub(crate) fn with_queue<R>(&self, f: impl FnOnce(&mut VecDeque<Packet>) -> R) -> R {
        f(&mut self.inner.queue.lock())
    }
}

/// Sum sample counts from the front until `stop` matches.
pub(crate) fn samples_before(queue: &VecDeque<Packet>, stop: impl Fn(&Packet) -> bool) -> usize {
    queue.iter().take_while(|p| !stop(p)).map(Packet::sample_count).sum()
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("port_name", &self.inner.port_name)
            .field("packet_count", &self.packet_count())
            .field("remote", &self.inner.remote)
            .field("closed", &self.is_closed())
            .finish()
    }
}
