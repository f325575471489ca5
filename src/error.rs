//! Unified error handling for merehub.
//!
//! This module provides the error hierarchy for envelope dispatch and
//! connection transport, with metric labeling via `error_code()`.
//! Configuration, database and authentication errors live next to the code
//! that raises them.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::db::DbError;
use crate::protocol::{RoomId, UserId};
use crate::state::CloseReason;

// ============================================================================
// Handler Errors (envelope dispatch)
// ============================================================================

/// Errors that can occur while dispatching one inbound envelope.
///
/// None of these are fatal to the session; the reader logs them and keeps
/// reading.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("inbound rate limit exceeded")]
    RateLimited,
}

impl HandlerError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Protocol(e) => e.error_code(),
            Self::Ingest(e) => e.error_code(),
            Self::RateLimited => "rate_limited",
        }
    }
}

/// Result type for envelope handlers.
pub type HandlerResult = Result<(), HandlerError>;

// ============================================================================
// Protocol Errors (decoding)
// ============================================================================

/// Inbound payload could not be understood.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("unknown envelope type: {0:?}")]
    UnknownType(String),

    #[error("{0} envelope without roomID")]
    MissingRoom(&'static str),
}

impl ProtocolError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed_envelope",
            Self::UnknownType(_) => "unknown_type",
            Self::MissingRoom(_) => "missing_room",
        }
    }
}

// ============================================================================
// Ingest Errors (chat message persistence)
// ============================================================================

/// Why a chat message was not persisted and broadcast.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{user_id} is not a participant of room {room_id}")]
    NotMember { room_id: RoomId, user_id: UserId },

    #[error("message has neither content nor media")]
    EmptyMessage,

    #[error("membership lookup failed: {0}")]
    MembershipLookup(#[source] DbError),

    #[error("failed to persist message: {0}")]
    Persistence(#[source] DbError),
}

impl IngestError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotMember { .. } => "not_member",
            Self::EmptyMessage => "empty_message",
            Self::MembershipLookup(_) => "membership_lookup",
            Self::Persistence(_) => "persistence",
        }
    }
}

// ============================================================================
// Transport Errors (fatal to one session)
// ============================================================================

/// Failures on the WebSocket itself. Each one ends the session it occurred on.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("read failed: {0}")]
    Read(#[source] tungstenite::Error),

    #[error("write failed: {0}")]
    Write(#[source] tungstenite::Error),

    #[error("write timed out")]
    WriteTimeout,

    #[error("ping failed: {0}")]
    Ping(#[source] tungstenite::Error),

    #[error("ping timed out")]
    PingTimeout,

    #[error("no frame received before the liveness deadline")]
    LivenessExpired,
}

impl TransportError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Read(_) => "read_failed",
            Self::Write(_) => "write_failed",
            Self::WriteTimeout => "write_timeout",
            Self::Ping(_) => "ping_failed",
            Self::PingTimeout => "ping_timeout",
            Self::LivenessExpired => "liveness_expired",
        }
    }

    /// The session close reason this failure maps to.
    pub fn close_reason(&self) -> CloseReason {
        match self {
            Self::Read(_) => CloseReason::ReadFailed,
            Self::Write(_) => CloseReason::WriteFailed,
            Self::WriteTimeout => CloseReason::WriteTimeout,
            Self::Ping(_) | Self::PingTimeout => CloseReason::PingFailed,
            Self::LivenessExpired => CloseReason::LivenessExpired,
        }
    }
}
