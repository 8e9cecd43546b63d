//! Packet-ready notifications and the scheduler boundary
//!
//! A connection calls its [`PacketNotifier`] after every enqueue. The
//! notifier decides, per the owning port's [`NotificationMode`], whether the
//! registered [`PacketListener`] runs on the enqueuing thread or is handed to
//! a [`Scheduler`].

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::trace;

use super::Connection;

/// How an input port is told that packets arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NotificationMode {
    /// Listener runs synchronously on the enqueuing thread
    #[default]
    SameThread,
    /// Listener is scheduled on every enqueue
    Scheduler,
    /// Listener is scheduled only when the queue was empty before the enqueue
    SchedulerQueueWasEmpty,
}

/// Unit of deferred work handed to a scheduler.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Executes deferred listener callbacks.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, task: Task);
}

/// Consumer callback invoked when packets are ready on a connection.
pub trait PacketListener: Send + Sync {
    fn on_packet_ready(&self, connection: &Connection);
}

impl<F> PacketListener for F
where
    F: Fn(&Connection) + Send + Sync,
{
    fn on_packet_ready(&self, connection: &Connection) {
        self(connection)
    }
}

/// Scheduler running tasks on a tokio runtime's blocking pool.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Scheduler bound to the runtime of the calling context.
    ///
    /// Returns `None` outside a tokio runtime.
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, task: Task) {
        // Listeners may block on reads, so keep them off the async workers.
        drop(self.handle.spawn_blocking(task));
    }
}

/// Scheduler that queues tasks until the designated thread drains them.
#[derive(Default)]
pub struct MainLoopScheduler {
    tasks: Mutex<VecDeque<Task>>,
}

impl MainLoopScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every queued task on the calling thread; returns how many ran.
    ///
    /// Tasks scheduled while draining run in the same call.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = self.tasks.lock().pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl Scheduler for MainLoopScheduler {
    fn schedule(&self, task: Task) {
        self.tasks.lock().push_back(task);
    }
}

impl std::fmt::Debug for MainLoopScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainLoopScheduler").field("pending", &self.pending()).finish()
    }
}

/// Dispatches packet-ready callbacks for one input port.
pub struct PacketNotifier {
    mode: NotificationMode,
    scheduler: Option<Arc<dyn Scheduler>>,
    listener: RwLock<Option<Arc<dyn PacketListener>>>,
}

impl PacketNotifier {
    pub fn new(mode: NotificationMode, scheduler: Option<Arc<dyn Scheduler>>) -> Self {
        Self { mode, scheduler, listener: RwLock::new(None) }
    }

    pub fn mode(&self) -> NotificationMode {
        self.mode
    }

    pub fn set_listener(&self, listener: Option<Arc<dyn PacketListener>>) {
        *self.listener.write() = listener;
    }

    pub fn has_listener(&self) -> bool {
        self.listener.read().is_some()
    }

    /// Notify per the configured mode.
    pub(crate) fn packet_ready(&self, connection: &Connection, queue_was_empty: bool) {
        let Some(listener) = self.listener.read().clone() else {
            return;
        };

        let schedule = match self.mode {
            NotificationMode::SameThread => false,
            NotificationMode::Scheduler => true,
            NotificationMode::SchedulerQueueWasEmpty => {
                if !queue_was_empty {
                    return;
                }
                true
            }
        };

        match (&self.scheduler, schedule) {
            (Some(scheduler), true) => {
                let connection = connection.clone();
                scheduler.schedule(Box::new(move || listener.on_packet_ready(&connection)));
            }
            (None, true) => {
                trace!(mode = ?self.mode, "No scheduler configured, notifying on this thread");
                listener.on_packet_ready(connection);
            }
            (_, false) => listener.on_packet_ready(connection),
        }
    }

    /// Notify on the calling thread regardless of mode.
    pub(crate) fn packet_ready_on_this_thread(&self, connection: &Connection) {
        let listener = self.listener.read().clone();
        if let Some(listener) = listener {
            listener.on_packet_ready(connection);
        }
    }
}

impl Default for PacketNotifier {
    fn default() -> Self {
        Self::new(NotificationMode::SameThread, None)
    }
}

impl std::fmt::Debug for PacketNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketNotifier")
            .field("mode", &self.mode)
            .field("has_scheduler", &self.scheduler.is_some())
            .field("has_listener", &self.has_listener())
            .finish()
    }
}
