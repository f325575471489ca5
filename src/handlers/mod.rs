//! Inbound envelope handlers.
//!
//! [`dispatch`] routes one decoded envelope from a session's reader:
//! chat messages go through the [`MessageIngestWriter`], typing indicators
//! and presence announcements go straight to the [`BroadcastRouter`].
//! Errors are returned to the reader, which logs and counts them; none of
//! them end the session.

mod broadcast;
mod ingest;

pub use broadcast::BroadcastRouter;
pub use ingest::{IngestRequest, MessageIngestWriter};

use std::sync::Arc;

use tracing::debug;

use crate::error::{HandlerResult, ProtocolError};
use crate::protocol::{Envelope, EnvelopeKind, OutboundFrame, PresenceFrame, TypingFrame};
use crate::state::{Hub, Session};

/// Route one envelope received on `session`.
pub async fn dispatch(hub: &Hub, session: &Session, envelope: Envelope) -> HandlerResult {
    let sender = session.user_id();
    match envelope.classify() {
        EnvelopeKind::Message => {
            let room = envelope.require_room()?.clone();
            let request = IngestRequest::from_envelope(sender.clone(), room, envelope);
            hub.ingest().ingest(request).await?;
        }
        EnvelopeKind::Typing => {
            let room = envelope.require_room()?.clone();
            let frame = Arc::new(OutboundFrame::from(TypingFrame {
                sender: sender.clone(),
                room_id: room.clone(),
            }));
            hub.router().send_to_room(&room, frame).await;
        }
        EnvelopeKind::Presence => {
            debug!(user = %sender, online = envelope.online, "Presence update");
            let frame = Arc::new(OutboundFrame::from(PresenceFrame {
                from: sender.clone(),
                online: envelope.online,
            }));
            hub.router().send_to_all(frame);
        }
        EnvelopeKind::Unknown => {
            return Err(ProtocolError::UnknownType(envelope.kind).into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::db::memory::MemoryStore;
    use crate::error::{HandlerError, IngestError};
    use crate::protocol::UserId;
    use crate::state::SharedFrame;
    use tokio::sync::mpsc;

    fn hub(store: MemoryStore) -> Arc<Hub> {
        Hub::new(Arc::new(store), SessionConfig::default())
    }

    fn connect(hub: &Hub, user: &str) -> (Arc<Session>, mpsc::Receiver<SharedFrame>) {
        let (session, rx) = Session::new(UserId::from(user), 8);
        hub.registry().register(&session);
        session.activate();
        (session, rx)
    }

    fn envelope(json: &str) -> Envelope {
        Envelope::decode(json.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn typing_reaches_room_participants() {
        let hub = hub(MemoryStore::with_room("c1", &["u1", "u2"]));
        let (s1, mut rx1) = connect(&hub, "u1");
        let (_s2, mut rx2) = connect(&hub, "u2");

        dispatch(&hub, &s1, envelope(r#"{"type":"typing","roomID":"c1"}"#))
            .await
            .unwrap();

        for rx in [&mut rx1, &mut rx2] {
            match rx.try_recv().unwrap().as_ref() {
                OutboundFrame::Typing(t) => {
                    assert_eq!(t.sender.as_str(), "u1");
                    assert_eq!(t.room_id.as_str(), "c1");
                }
                other => panic!("expected typing frame, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn presence_reaches_everyone_including_sender() {
        let hub = hub(MemoryStore::default());
        let (s1, mut rx1) = connect(&hub, "u1");
        let (_s2, mut rx2) = connect(&hub, "u2");

        dispatch(&hub, &s1, envelope(r#"{"type":"presence","online":true}"#))
            .await
            .unwrap();

        for rx in [&mut rx1, &mut rx2] {
            match rx.try_recv().unwrap().as_ref() {
                OutboundFrame::Presence(p) => {
                    assert_eq!(p.from.as_str(), "u1");
                    assert!(p.online);
                }
                other => panic!("expected presence frame, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn message_goes_through_ingest() {
        let hub = hub(MemoryStore::with_room("c1", &["u1"]));
        let (s1, mut rx1) = connect(&hub, "u1");

        dispatch(
            &hub,
            &s1,
            envelope(r#"{"type":"message","roomID":"c1","content":"hi","clientCorrelationID":"t1"}"#),
        )
        .await
        .unwrap();

        match rx1.try_recv().unwrap().as_ref() {
            OutboundFrame::Message(m) => {
                assert_eq!(m.content, "hi");
                assert_eq!(m.client_correlation_id.as_deref(), Some("t1"));
            }
            other => panic!("expected message frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_member_message_surfaces_ingest_error() {
        let hub = hub(MemoryStore::with_room("c1", &["u2"]));
        let (s1, mut rx1) = connect(&hub, "u1");

        let err = dispatch(&hub, &s1, envelope(r#"{"type":"message","roomID":"c1","content":"x"}"#))
            .await
            .unwrap_err();

        assert!(matches!(err, HandlerError::Ingest(IngestError::NotMember { .. })));
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_type_is_protocol_error() {
        let hub = hub(MemoryStore::default());
        let (s1, _rx1) = connect(&hub, "u1");

        let err = dispatch(&hub, &s1, envelope(r#"{"type":"reaction"}"#))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "unknown_type");
    }

    #[tokio::test]
    async fn typing_without_room_is_protocol_error() {
        let hub = hub(MemoryStore::default());
        let (s1, _rx1) = connect(&hub, "u1");

        let err = dispatch(&hub, &s1, envelope(r#"{"type":"typing"}"#))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "missing_room");
    }
}
