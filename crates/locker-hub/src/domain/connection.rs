//! Connection handles.
//!
//! Every accepted WebSocket gets one writer task that owns the socket sink.
//! The rest of the hub never touches the socket: it holds a cheap, cloneable
//! [`ConnectionHandle`] and pushes [`OutboundFrame`]s into the writer's
//! bounded channel with `try_send`.  Sending therefore never blocks the
//! caller beyond the channel enqueue, which is what lets the dispatcher
//! answer the rental layer immediately.
//!
//! A peer that stops reading fills its queue.  The next send then fails and
//! closes the connection as a slow consumer instead of buffering without
//! limit.  One slot is always kept free so that Close frame fits.
//!
//! ```text
//! Hub ──send()──► mpsc ──► writer task ──► WebSocket sink
//! ```
//!
//! When the writer task ends (socket error or close requested) it drops the
//! receiver, and every clone of the handle reports `is_open() == false`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use locker_core::OutboundMsg;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;
use uuid::Uuid;

/// Messages a connection may have queued before it is cut off.
pub const DEFAULT_OUTBOUND_QUEUE: usize = 128;

/// Identity of one physical connection for its whole lifetime.
pub type ConnectionId = Uuid;

/// An item queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    /// Serialize and send as a text frame.
    Message(OutboundMsg),
    /// Send a Close frame and stop writing.
    Close { reason: String },
}

/// Cloneable handle to a live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    tx: mpsc::Sender<OutboundFrame>,
    closing: Arc<AtomicBool>,
}

impl ConnectionHandle {
    /// Creates a handle with a fresh id and the default queue depth,
    /// returning the receiver the writer task drains.
    pub fn new(peer: Option<SocketAddr>) -> (Self, mpsc::Receiver<OutboundFrame>) {
        Self::with_capacity(peer, DEFAULT_OUTBOUND_QUEUE)
    }

    /// Like [`new`](Self::new), with room for `queue` pending messages.
    pub fn with_capacity(
        peer: Option<SocketAddr>,
        queue: usize,
    ) -> (Self, mpsc::Receiver<OutboundFrame>) {
        // The extra slot is reserved for the Close frame.
        let (tx, rx) = mpsc::channel(queue.max(1) + 1);
        let handle = Self {
            id: Uuid::new_v4(),
            peer,
            tx,
            closing: Arc::new(AtomicBool::new(false)),
        };
        (handle, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// `true` while the writer task is alive and no close has been requested.
    pub fn is_open(&self) -> bool {
        !self.closing.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    /// Queues a message.  Returns `false` if the connection is closed or
    /// closing; the message is then discarded.
    ///
    /// A full queue closes the connection as a slow consumer.
    pub fn send(&self, msg: OutboundMsg) -> bool {
        if !self.is_open() {
            return false;
        }
        if self.tx.capacity() <= 1 {
            warn!(connection_id = %self.id, "outbound queue full; closing slow consumer");
            self.close("slow consumer");
            return false;
        }
        match self.tx.try_send(OutboundFrame::Message(msg)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.close("slow consumer");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Asks the writer task to send a Close frame and stop.
    ///
    /// Returns `false` if the connection was already closed or closing.
    pub fn close(&self, reason: impl Into<String>) -> bool {
        if self.closing.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.tx
            .try_send(OutboundFrame::Close {
                reason: reason.into(),
            })
            .is_ok()
    }
}

impl std::fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.peer {
            Some(peer) => write!(f, "{} ({peer})", self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
