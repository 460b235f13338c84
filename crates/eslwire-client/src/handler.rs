use async_trait::async_trait;
use eslwire_frame::Event;

use crate::connection::Connection;

/// Callbacks driven by a connection's read loop.
///
/// Every hook has a no-op default, so implementors only override what they
/// need. `on_event` runs on its own task per notification; the other hooks
/// are awaited in place.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Fired once when the read loop starts.
    async fn on_connect(&self, _conn: &Connection) {}

    /// Fired for every `text/event-plain` notification.
    async fn on_event(&self, _conn: &Connection, _event: Event) {}

    /// Fired when the switch sends `text/disconnect-notice`.
    ///
    /// Runs on the read loop, which cannot deliver replies until it
    /// returns. Do not await requests on `conn` here; spawn a task instead.
    async fn on_disconnect(&self, _conn: &Connection, _event: Event) {}

    /// Fired exactly once when the connection transitions to closed.
    ///
    /// Requests issued from here fail with [`crate::ClientError::Closed`].
    async fn on_close(&self, _conn: &Connection) {}
}

/// Handler that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl Handler for NoopHandler {}
