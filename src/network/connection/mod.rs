//! Connection - drives one authenticated WebSocket session.
//!
//! Each connection runs three cooperating tasks around a shared
//! [`Session`]:
//!
//! ```text
//!                    ┌───────────────────────────────┐
//!   socket ─read──▶  │ reader (connection task)      │ ──dispatch──▶ Hub
//!                    └───────────────────────────────┘
//!                    ┌───────────────────────────────┐
//!   socket ◀─write── │ writer (spawned)              │ ◀── outbound queue
//!                    └───────────────────────────────┘
//!                    ┌───────────────────────────────┐
//!   socket ◀─ping─── │ heartbeat (spawned)           │
//!                    └───────────────────────────────┘
//! ```
//!
//! Whichever task fails first calls [`Session::close`]; the shared
//! cancellation token then stops the other two. The connection task joins
//! the spawned tasks, closes the socket within the write timeout and marks
//! the session closed.

mod error_handling;
mod heartbeat;
mod reader;
mod writer;


use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, instrument, warn};

use crate::metrics;
use crate::protocol::UserId;
use crate::state::{CloseReason, Hub, Session, SharedFrame};

/// An upgraded, authenticated client connection.
pub struct Connection<S> {
    ws: WebSocketStream<S>,
    session: Arc<Session>,
    outbound: mpsc::Receiver<SharedFrame>,
    addr: SocketAddr,
    hub: Arc<Hub>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Create the session for `user`. Nothing is registered until [`run`](Self::run).
    pub fn new(ws: WebSocketStream<S>, user: UserId, addr: SocketAddr, hub: Arc<Hub>) -> Self {
        let (session, outbound) = Session::new(user, hub.settings().queue_capacity);
        Self {
            ws,
            session,
            outbound,
            addr,
            hub,
        }
    }

    #[cfg(test)]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Register the session, run it to completion and return why it ended.
    #[instrument(
        skip(self),
        fields(user = %self.session.user_id(), session = %self.session.id(), addr = %self.addr),
        name = "connection"
    )]
    pub async fn run(self) -> CloseReason {
        let Self {
            ws,
            session,
            outbound,
            addr: _,
            hub,
        } = self;
        let registry = hub.registry();

        if let Some(prior) = registry.register(&session) {
            info!(prior = %prior.id(), "Superseding existing session");
            prior.close(registry, CloseReason::Superseded);
        }

        if !session.activate() {
            // Closed between registration and activation (shutdown or a newer login).
            let reason = session.close_reason().unwrap_or(CloseReason::ServerShutdown);
            session.mark_closed();
            debug!(%reason, "Session closed before activation");
            return reason;
        }
        metrics::session_opened();
        info!("Session active");

        let (sink, mut stream) = ws.split();
        let sink: writer::SharedSink<S> = Arc::new(Mutex::new(sink));

        let writer = tokio::spawn(writer::write_loop(
            Arc::clone(&hub),
            Arc::clone(&session),
            outbound,
            Arc::clone(&sink),
        ));
        let heartbeat = tokio::spawn(heartbeat::heartbeat_loop(
            Arc::clone(&hub),
            Arc::clone(&session),
            Arc::clone(&sink),
        ));

        let observed = reader::read_loop(&mut stream, &hub, &session).await;
        session.close(registry, observed);

        if let Err(e) = writer.await {
            warn!(error = %e, "Writer task failed");
        }
        if let Err(e) = heartbeat.await {
            warn!(error = %e, "Heartbeat task failed");
        }

        let write_timeout = hub.settings().write_timeout();
        match timeout(write_timeout, async { sink.lock().await.close().await }).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "Error closing socket"),
            Err(_) => debug!("Timed out closing socket"),
        }

        session.mark_closed();
        let reason = session.close_reason().unwrap_or(observed);
        metrics::session_closed(reason.as_str());
        info!(%reason, dropped = session.dropped_frames(), "Session closed");
        reason
    }
}
