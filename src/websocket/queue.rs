//! Outbound Queue
//!
//! Bounded FIFO between the session hub and a connection's write pump.
//!
//! Drop policy: enqueueing never waits. A full queue is reported as
//! [`EnqueueError::Full`] and the hub evicts that connection; the frame is
//! not retried. The queue closes once every [`OutboundSender`] is dropped,
//! after which the write pump drains what is left and stops.

use tokio::sync::mpsc::{self, error::TrySendError};

use super::messages::Frame;

/// Default per-connection capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    #[error("Outbound queue is full")]
    Full,

    #[error("Outbound queue is closed")]
    Closed,
}

/// Producer side, held by the hub (and briefly by the join handshake)
#[derive(Debug, Clone)]
pub struct OutboundSender {
    tx: mpsc::Sender<Frame>,
}

/// Consumer side, owned by the write pump
#[derive(Debug)]
pub struct OutboundReceiver {
    rx: mpsc::Receiver<Frame>,
}

/// Create a bounded outbound queue
pub fn outbound_queue(capacity: usize) -> (OutboundSender, OutboundReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (OutboundSender { tx }, OutboundReceiver { rx })
}

impl OutboundSender {
    /// Enqueue without waiting
    pub fn try_enqueue(&self, frame: Frame) -> Result<(), EnqueueError> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }
}

impl OutboundReceiver {
    /// Next frame in enqueue order; `None` once closed and drained
    pub async fn next(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    /// Non-waiting variant of [`next`](Self::next)
    pub fn try_next(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }
}
