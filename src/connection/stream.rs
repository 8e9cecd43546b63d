//! Async consumption of a connection

use futures::Stream;

use super::Connection;
use crate::types::Packet;

impl Connection {
    /// Stream of dequeued packets, ending once the connection is closed.
    ///
    /// The stream competes with other consumers of the same queue; use either
    /// the stream or a reader, not both.
    pub fn packet_stream(&self) -> impl Stream<Item = Packet> + Send + 'static {
        futures::stream::unfold(self.clone(), |connection| async move {
            loop {
                if let Some(packet) = connection.dequeue() {
                    return Some((packet, connection));
                }
                if connection.is_closed() {
                    return None;
                }
                tokio::select! {
                    _ = connection.inner.notify.notified() => {}
                    _ = connection.inner.cancel.cancelled() => {}
                }
            }
        })
    }
}
