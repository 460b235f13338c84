//! Ordered hand-off of replies to waiting callers.
//!
//! Replies on the event socket carry no request identifier; the switch
//! answers strictly in the order requests were written. Each queue is a FIFO
//! of tagged slots: a slot is registered while the writer lock is held, so
//! slot order always matches write order.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use eslwire_frame::Event;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{ClientError, Result};

pub(crate) type ReplySender = oneshot::Sender<Result<Event>>;
pub(crate) type ReplyReceiver = oneshot::Receiver<Result<Event>>;

/// FIFO of pending waiters for one reply kind.
pub(crate) struct ReplyQueue {
    kind: &'static str,
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    next_id: u64,
    waiters: VecDeque<(u64, ReplySender)>,
    closed: bool,
}

impl ReplyQueue {
    pub(crate) fn new(kind: &'static str) -> Self {
        Self {
            kind,
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Append a slot for the next reply. Fails once the queue is closed.
    pub(crate) fn register(&self) -> Result<(u64, ReplyReceiver)> {
        let mut state = self.lock();
        if state.closed {
            return Err(ClientError::Closed);
        }
        let id = state.next_id;
        state.next_id = state.next_id.wrapping_add(1);
        let (tx, rx) = oneshot::channel();
        state.waiters.push_back((id, tx));
        Ok((id, rx))
    }

    /// Hand `outcome` to the oldest slot. Returns false if nobody was waiting.
    ///
    /// A slot whose caller gave up (timed out) still consumes its reply.
    pub(crate) fn complete(&self, outcome: Result<Event>) -> bool {
        let Some((id, tx)) = self.lock().waiters.pop_front() else {
            warn!(kind = self.kind, "reply with no waiter, dropping");
            return false;
        };
        if tx.send(outcome).is_err() {
            debug!(kind = self.kind, request_id = id, "waiter gone, discarding late reply");
        }
        true
    }

    /// Remove a slot whose request never reached the wire.
    pub(crate) fn abandon(&self, id: u64) {
        self.lock().waiters.retain(|(slot, _)| *slot != id);
    }

    /// Close the queue and fail every pending waiter.
    pub(crate) fn cancel_all(&self) {
        let waiters = {
            let mut state = self.lock();
            state.closed = true;
            std::mem::take(&mut state.waiters)
        };
        if !waiters.is_empty() {
            debug!(kind = self.kind, pending = waiters.len(), "cancelling waiters");
        }
        for (_, tx) in waiters {
            let _ = tx.send(Err(ClientError::Closed));
        }
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.lock().waiters.len()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
