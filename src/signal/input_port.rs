//! Consumer endpoint accepting one signal at a time

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use super::Signal;
use crate::connection::{Connection, NotificationMode, PacketListener, PacketNotifier, Scheduler};
use crate::{DaqError, Result};

/// Consumer endpoint owning at most one [`Connection`].
///
/// Dropping the port disconnects it.
pub struct InputPort {
    name: String,
    notifier: Arc<PacketNotifier>,
    connection: Mutex<Option<Connection>>,
}

impl InputPort {
    pub fn builder(name: impl Into<String>) -> InputPortBuilder {
        InputPortBuilder {
            name: name.into(),
            mode: NotificationMode::default(),
            scheduler: None,
            listener: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn notification_mode(&self) -> NotificationMode {
        self.notifier.mode()
    }

    /// Connect to `signal`, replacing any connection to a different signal.
    ///
    /// The new connection starts with a descriptor-changed event when the
    /// signal is described.
    pub fn connect(&self, signal: &Signal) -> Result<Connection> {
        let (previous, connection) = {
            let mut current = self.connection.lock();
            if let Some(existing) = current.as_ref() {
                if !existing.is_closed() && existing.is_from(signal.inner()) {
                    return Err(DaqError::AlreadyConnected {
                        signal: signal.name().to_string(),
                        port: self.name.clone(),
                    });
                }
            }

            let connection = Connection::attached(
                Arc::downgrade(signal.inner()),
                self.name.clone(),
                Arc::clone(&self.notifier),
                signal.is_remote(),
            );
            (current.replace(connection.clone()), connection)
        };

        if let Some(previous) = previous {
            release(previous);
        }

        signal.attach(connection.clone());
        info!(port = %self.name, signal = %signal.name(), "Input port connected");
        Ok(connection)
    }

    /// Close the current connection and detach it from its signal.
    pub fn disconnect(&self) -> Result<()> {
        let connection = self
            .connection
            .lock()
            .take()
            .ok_or_else(|| DaqError::NotConnected { port: self.name.clone() })?;
        release(connection);
        info!(port = %self.name, "Input port disconnected");
        Ok(())
    }

    /// The live connection, if any.
    pub fn connection(&self) -> Option<Connection> {
        self.connection.lock().as_ref().filter(|c| !c.is_closed()).cloned()
    }

    pub fn set_listener(&self, listener: Option<Arc<dyn PacketListener>>) {
        self.notifier.set_listener(listener);
    }
}

fn release(connection: Connection) {
    if let Some(signal) = connection.signal() {
        signal.detach(&connection);
    }
    connection.close();
}

impl Drop for InputPort {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.get_mut().take() {
            debug!(port = %self.name, "Dropping connected input port");
            release(connection);
        }
    }
}

impl std::fmt::Debug for InputPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputPort")
            .field("name", &self.name)
            .field("notifier", &self.notifier)
            .field("connected", &self.connection().is_some())
            .finish()
    }
}

/// Builder for [`InputPort`].
pub struct InputPortBuilder {
    name: String,
    mode: NotificationMode,
    scheduler: Option<Arc<dyn Scheduler>>,
    listener: Option<Arc<dyn PacketListener>>,
}

impl InputPortBuilder {
    pub fn notification_mode(mut self, mode: NotificationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn PacketListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn build(self) -> InputPort {
        let notifier = PacketNotifier::new(self.mode, self.scheduler);
        notifier.set_listener(self.listener);
        InputPort { name: self.name, notifier: Arc::new(notifier), connection: Mutex::new(None) }
    }
}
