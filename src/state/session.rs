//! Per-connection session state.
//!
//! A [`Session`] is the shared half of one authenticated connection: its
//! identity, the producer side of its bounded outbound queue, its lifecycle
//! state and the cancellation token its tasks watch. The transport and the
//! queue's receiver are owned by the connection task in
//! `network::connection`.
//!
//! Lifecycle is one-directional:
//!
//! ```text
//! Connecting ──activate──▶ Active ──close──▶ Draining ──mark_closed──▶ Closed
//!      └───────────────────────close──────────────▲
//! ```
//!
//! `close` is idempotent: only the first caller cancels the tasks, closes
//! the queue and unregisters; every later call returns `false`.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::ConnectionRegistry;
use crate::protocol::{OutboundFrame, UserId};

/// Shared outbound frame; built once, queued to many sessions.
pub type SharedFrame = Arc<OutboundFrame>;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SessionState {
    Connecting = 0,
    Active = 1,
    Draining = 2,
    Closed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Active,
            2 => Self::Draining,
            _ => Self::Closed,
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Client sent a Close frame or the stream ended.
    PeerClosed,
    ReadFailed,
    /// No inbound frame before the liveness deadline.
    LivenessExpired,
    WriteFailed,
    WriteTimeout,
    PingFailed,
    /// The outbound queue was closed underneath the writer.
    QueueClosed,
    /// The same user connected again.
    Superseded,
    ServerShutdown,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::ReadFailed => "read_failed",
            Self::LivenessExpired => "liveness_expired",
            Self::WriteFailed => "write_failed",
            Self::WriteTimeout => "write_timeout",
            Self::PingFailed => "ping_failed",
            Self::QueueClosed => "queue_closed",
            Self::Superseded => "superseded",
            Self::ServerShutdown => "server_shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a frame could not be queued to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnqueueError {
    #[error("outbound queue full")]
    Full,
    #[error("session closed")]
    Closed,
}

/// Shared state of one live connection.
pub struct Session {
    id: Uuid,
    user_id: UserId,
    outbound: RwLock<Option<mpsc::Sender<SharedFrame>>>,
    state: AtomicU8,
    cancel: CancellationToken,
    dropped: AtomicU64,
    close_reason: OnceLock<CloseReason>,
}

impl Session {
    /// Create a session in `Connecting` with an outbound queue of `capacity`.
    ///
    /// Returns the receiver the writer task drains.
    pub fn new(user_id: UserId, capacity: usize) -> (Arc<Self>, mpsc::Receiver<SharedFrame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let session = Arc::new(Self {
            id: Uuid::new_v4(),
            user_id,
            outbound: RwLock::new(Some(tx)),
            state: AtomicU8::new(SessionState::Connecting as u8),
            cancel: CancellationToken::new(),
            dropped: AtomicU64::new(0),
            close_reason: OnceLock::new(),
        });
        (session, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason.get().copied()
    }

    /// Frames dropped for this session because its queue was full.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Token fired when the session starts closing.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    #[cfg(test)]
    pub fn is_closing(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Move `Connecting` to `Active`. Returns false if the session was already closed.
    pub fn activate(&self) -> bool {
        self.state
            .compare_exchange(
                SessionState::Connecting as u8,
                SessionState::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Queue a frame without waiting.
    ///
    /// A full queue drops the frame for this session only.
    pub fn try_enqueue(&self, frame: SharedFrame) -> Result<(), EnqueueError> {
        let guard = self.outbound.read();
        let Some(tx) = guard.as_ref() else {
            return Err(EnqueueError::Closed);
        };
        match tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(EnqueueError::Full)
            }
            Err(TrySendError::Closed(_)) => Err(EnqueueError::Closed),
        }
    }

    /// Begin teardown. Only the first call has any effect.
    ///
    /// Fires the cancellation token, closes the outbound queue and removes
    /// this session from `registry` if it is still the installed one. Does
    /// not wait for the connection's tasks.
    pub fn close(&self, registry: &ConnectionRegistry, reason: CloseReason) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current >= SessionState::Draining as u8 {
                debug!(session = %self.id, user = %self.user_id, %reason, "close ignored, already closing");
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                SessionState::Draining as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        let _ = self.close_reason.set(reason);
        self.cancel.cancel();
        self.outbound.write().take();
        let removed = registry.unregister(&self.user_id, self);

        info!(
            session = %self.id,
            user = %self.user_id,
            %reason,
            unregistered = removed,
            dropped = self.dropped_frames(),
            "Session closing"
        );
        true
    }

    /// Record that the transport is closed and every task has finished.
    pub fn mark_closed(&self) {
        self.state.store(SessionState::Closed as u8, Ordering::Release);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("state", &self.state())
            .finish()
    }
}
