//! Outbound half of a connection.
//!
//! The writer is the only consumer of a session's queue, so frames reach
//! each recipient in the order they were enqueued.

use std::sync::Arc;
use std::time::Duration;

use futures_util::SinkExt;
use futures_util::stream::SplitSink;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, mpsc};
use tokio::time::{error::Elapsed, timeout};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{error, trace, warn};

use crate::error::TransportError;
use crate::metrics;
use crate::state::{CloseReason, Hub, Session, SharedFrame};

/// Write half of the socket, shared by the writer and heartbeat tasks.
pub(super) type SharedSink<S> = Arc<Mutex<SplitSink<WebSocketStream<S>, Message>>>;

/// Send one message, giving up after `limit`.
pub(super) async fn send_with_timeout<S>(
    sink: &SharedSink<S>,
    msg: Message,
    limit: Duration,
) -> Result<Result<(), tungstenite::Error>, Elapsed>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    timeout(limit, async {
        let mut sink = sink.lock().await;
        sink.send(msg).await
    })
    .await
}

/// Drain the outbound queue onto the socket until cancelled or a write fails.
pub(super) async fn write_loop<S>(
    hub: Arc<Hub>,
    session: Arc<Session>,
    mut outbound: mpsc::Receiver<SharedFrame>,
    sink: SharedSink<S>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let limit = hub.settings().write_timeout();
    let cancel = session.cancel_token().clone();

    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = outbound.recv() => frame,
        };
        let Some(frame) = frame else {
            session.close(hub.registry(), CloseReason::QueueClosed);
            break;
        };

        let json = match frame.to_json() {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, kind = frame.kind(), "Failed to serialize frame");
                continue;
            }
        };

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = send_with_timeout(&sink, Message::Text(json), limit) => sent,
        };
        let err = match sent {
            Ok(Ok(())) => {
                metrics::frame_sent(frame.kind());
                continue;
            }
            Ok(Err(e)) => TransportError::Write(e),
            Err(_) => TransportError::WriteTimeout,
        };

        warn!(error = %err, code = err.error_code(), "Outbound write failed");
        session.close(hub.registry(), err.close_reason());
        break;
    }

    trace!("Writer stopped");
}
