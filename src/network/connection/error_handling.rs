//! Error handling utilities for connection management.
//!
//! Classifies transport read errors into close reasons and reports
//! per-envelope dispatch failures, which never end the session.

use std::io::ErrorKind;

use tokio_tungstenite::tungstenite::{self, error::ProtocolError as WsProtocolError};
use tracing::{debug, error, warn};

use crate::error::{HandlerError, IngestError, ProtocolError, TransportError};
use crate::state::CloseReason;

/// Classify a WebSocket read error into the reason the session ends with.
///
/// A peer that simply went away is `PeerClosed`; anything else is a read
/// failure.
pub(super) fn classify_read_error(e: tungstenite::Error) -> CloseReason {
    let peer_gone = match &e {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => true,
        tungstenite::Error::Protocol(WsProtocolError::ResetWithoutClosingHandshake) => true,
        tungstenite::Error::Io(io) => matches!(
            io.kind(),
            ErrorKind::ConnectionReset | ErrorKind::BrokenPipe | ErrorKind::UnexpectedEof
        ),
        _ => false,
    };
    if peer_gone {
        return CloseReason::PeerClosed;
    }

    let err = TransportError::Read(e);
    debug!(error = %err, code = err.error_code(), "Read error");
    err.close_reason()
}

/// Log and count an envelope that could not be handled.
pub(super) fn report_dispatch_error(kind: &'static str, err: &HandlerError) {
    crate::metrics::record_dispatch_error(kind, err.error_code());

    match err {
        HandlerError::Ingest(IngestError::NotMember { room_id, user_id }) => {
            warn!(%room_id, %user_id, "Dropped message from non-participant");
        }
        HandlerError::Ingest(IngestError::EmptyMessage) => {
            debug!("Dropped empty message");
        }
        HandlerError::Ingest(e @ (IngestError::MembershipLookup(_) | IngestError::Persistence(_))) => {
            error!(error = %e, "Message not stored");
        }
        HandlerError::Protocol(ProtocolError::Malformed(e)) => {
            debug!(error = %e, "Malformed envelope");
        }
        HandlerError::Protocol(e) => {
            warn!(error = %e, kind, "Rejected envelope");
        }
        HandlerError::RateLimited => {
            debug!(kind, "Inbound rate limit exceeded, envelope dropped");
        }
    }
}
