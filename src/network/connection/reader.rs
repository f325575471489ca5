//! Inbound half of a connection.
//!
//! Runs on the connection task itself. Every received frame, control frames
//! included, pushes the liveness deadline forward; data frames are decoded
//! as envelopes and dispatched one at a time before the next read.

use futures_util::StreamExt;
use futures_util::stream::SplitStream;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{Instant, sleep};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace};

use super::error_handling::{classify_read_error, report_dispatch_error};
use crate::config::SessionConfig;
use crate::error::{HandlerError, TransportError};
use crate::handlers::dispatch;
use crate::protocol::Envelope;
use crate::state::{CloseReason, Hub, Session};
use crate::telemetry::DispatchTimer;

/// Read until the peer goes away, the transport fails, the session is
/// cancelled or the liveness deadline lapses.
pub(super) async fn read_loop<S>(
    stream: &mut SplitStream<WebSocketStream<S>>,
    hub: &Hub,
    session: &Session,
) -> CloseReason
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let liveness = hub.settings().liveness_timeout();
    let limiter = inbound_limiter(hub.settings());
    let cancel = session.cancel_token();

    let deadline = sleep(liveness);
    tokio::pin!(deadline);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return session.close_reason().unwrap_or(CloseReason::ServerShutdown);
            }
            _ = &mut deadline => {
                let err = TransportError::LivenessExpired;
                info!(timeout_secs = liveness.as_secs(), "{err}");
                return err.close_reason();
            }
            next = stream.next() => next,
        };

        deadline.as_mut().reset(Instant::now() + liveness);

        let payload = match next {
            None => return CloseReason::PeerClosed,
            Some(Err(e)) => return classify_read_error(e),
            Some(Ok(Message::Text(text))) => text.into_bytes(),
            // Binary frames carry the same JSON envelopes.
            Some(Ok(Message::Binary(data))) => data,
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                trace!("Control frame");
                continue;
            }
            Some(Ok(Message::Close(frame))) => {
                debug!(?frame, "Peer sent close");
                return CloseReason::PeerClosed;
            }
            Some(Ok(Message::Frame(_))) => continue,
        };

        handle_payload(hub, session, &payload, limiter.as_ref()).await;
    }
}

async fn handle_payload(
    hub: &Hub,
    session: &Session,
    payload: &[u8],
    limiter: Option<&DefaultDirectRateLimiter>,
) {
    let envelope = match Envelope::decode(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            report_dispatch_error("malformed", &HandlerError::from(e));
            return;
        }
    };
    let kind = envelope.classify().as_str();

    if let Some(limiter) = limiter
        && limiter.check().is_err()
    {
        report_dispatch_error(kind, &HandlerError::RateLimited);
        return;
    }

    let _timer = DispatchTimer::new(kind);
    if let Err(e) = dispatch(hub, session, envelope).await {
        report_dispatch_error(kind, &e);
    }
}

/// Per-session token bucket, or `None` when inbound limiting is off.
fn inbound_limiter(settings: &SessionConfig) -> Option<DefaultDirectRateLimiter> {
    let (rate, burst) = settings.inbound_quota()?;
    Some(RateLimiter::direct(Quota::per_second(rate).allow_burst(burst)))
}
