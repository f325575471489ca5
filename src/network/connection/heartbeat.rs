//! Liveness pings.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_tungstenite::tungstenite::Message;
use tracing::{trace, warn};

use super::writer::{SharedSink, send_with_timeout};
use crate::error::TransportError;
use crate::state::{Hub, Session};

/// Ping the peer every heartbeat interval until cancelled or a ping fails.
///
/// The first ping goes out one full interval after the session starts.
pub(super) async fn heartbeat_loop<S>(hub: Arc<Hub>, session: Arc<Session>, sink: SharedSink<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let period = hub.settings().heartbeat_interval();
    let limit = hub.settings().write_timeout();
    let cancel = session.cancel_token().clone();

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = send_with_timeout(&sink, Message::Ping(Vec::new()), limit) => sent,
        };
        let err = match sent {
            Ok(Ok(())) => {
                trace!("Ping sent");
                continue;
            }
            Ok(Err(e)) => TransportError::Ping(e),
            Err(_) => TransportError::PingTimeout,
        };

        warn!(error = %err, code = err.error_code(), "Heartbeat failed");
        session.close(hub.registry(), err.close_reason());
        break;
    }

    trace!("Heartbeat stopped");
}
