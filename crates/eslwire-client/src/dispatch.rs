use std::sync::Arc;

use eslwire_frame::Event;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::connection::Connection;
use crate::handler::Handler;

/// Runs notification handlers on their own tasks, at most `limit` at a time.
pub(crate) struct Dispatcher {
    handler: Arc<dyn Handler>,
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    pub(crate) fn new(handler: Arc<dyn Handler>, limit: usize) -> Self {
        Self {
            handler,
            permits: Arc::new(Semaphore::new(limit.max(1))),
        }
    }

    /// Spawn `on_event` for `event`.
    ///
    /// Never waits: the spawned task queues for a permit, so a full dispatcher
    /// does not stall the caller. Notifications still waiting when the
    /// dispatcher closes are dropped.
    pub(crate) fn dispatch(&self, conn: Connection, event: Event) {
        let permits = self.permits.clone();
        let handler = self.handler.clone();
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                debug!("dispatcher closed, dropping notification");
                return;
            };
            handler.on_event(&conn, event).await;
        });
    }

    pub(crate) fn close(&self) {
        self.permits.close();
    }
}
