//! Chat message ingest: authorize, persist, touch the room, fan out.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::BroadcastRouter;
use crate::db::{ChatStore, NewMessage, StoredMessage};
use crate::error::IngestError;
use crate::metrics;
use crate::protocol::{Envelope, Media, MessageFrame, OutboundFrame, RoomId, UserId};

/// One inbound chat message, attributed to an authenticated sender.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub sender: UserId,
    pub room_id: RoomId,
    pub content: String,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
    pub client_correlation_id: Option<String>,
}

impl IngestRequest {
    pub fn from_envelope(sender: UserId, room_id: RoomId, envelope: Envelope) -> Self {
        Self {
            sender,
            room_id,
            content: envelope.content.unwrap_or_default(),
            media_url: envelope.media_url,
            media_type: envelope.media_type,
            client_correlation_id: envelope.client_correlation_id.filter(|id| !id.is_empty()),
        }
    }

    fn is_empty(&self) -> bool {
        self.content.is_empty() && self.media_url.as_deref().is_none_or(str::is_empty)
    }
}

/// Turns accepted chat messages into stored records and room broadcasts.
#[derive(Clone)]
pub struct MessageIngestWriter {
    store: Arc<dyn ChatStore>,
    router: BroadcastRouter,
}

impl MessageIngestWriter {
    pub fn new(store: Arc<dyn ChatStore>, router: BroadcastRouter) -> Self {
        Self { store, router }
    }

    /// Authorize, persist and broadcast one message.
    ///
    /// Nothing is sent back to the sender on failure; the caller logs the
    /// returned error. On success the canonical frame has already been
    /// handed to the router and is returned for observability.
    pub async fn ingest(&self, request: IngestRequest) -> Result<MessageFrame, IngestError> {
        let member = self
            .store
            .is_participant(&request.room_id, &request.sender)
            .await
            .map_err(IngestError::MembershipLookup)?;
        if !member {
            return Err(IngestError::NotMember {
                room_id: request.room_id,
                user_id: request.sender,
            });
        }

        if request.is_empty() {
            return Err(IngestError::EmptyMessage);
        }

        let media = Media::from_parts(request.media_url.as_deref(), request.media_type.as_deref());
        let stored = self
            .store
            .insert_message(NewMessage {
                room_id: request.room_id.clone(),
                sender: request.sender.clone(),
                content: request.content,
                media,
            })
            .await
            .map_err(IngestError::Persistence)?;
        metrics::message_persisted();

        if let Err(e) = self.store.touch_room(&stored.room_id, stored.created_at).await {
            warn!(room = %stored.room_id, error = %e, "Failed to update room activity");
        }

        let frame = message_frame(stored, request.client_correlation_id);
        info!(
            room = %frame.room_id,
            sender = %frame.sender,
            message = %frame.id,
            "Message stored"
        );

        let fanout = self
            .router
            .send_to_room(&frame.room_id, Arc::new(OutboundFrame::from(frame.clone())))
            .await;
        debug!(message = %frame.id, delivered = fanout.delivered, dropped = fanout.dropped, "Message fanned out");

        Ok(frame)
    }
}

fn message_frame(stored: StoredMessage, client_correlation_id: Option<String>) -> MessageFrame {
    MessageFrame {
        id: stored.id,
        sender: stored.sender,
        content: stored.content,
        created_at: stored.created_at,
        media: stored.media,
        room_id: stored.room_id,
        client_correlation_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::db::memory::MemoryStore;
    use crate::state::{ConnectionRegistry, Session, SharedFrame};
    use std::sync::atomic::Ordering;
    use tokio::sync::mpsc;

    struct Fixture {
        writer: MessageIngestWriter,
        registry: Arc<ConnectionRegistry>,
    }

    fn fixture(store: Arc<dyn ChatStore>) -> Fixture {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = BroadcastRouter::new(Arc::clone(&registry), Arc::clone(&store));
        Fixture {
            writer: MessageIngestWriter::new(store, router),
            registry,
        }
    }

    fn connect(registry: &ConnectionRegistry, user: &str) -> (Arc<Session>, mpsc::Receiver<SharedFrame>) {
        let (session, rx) = Session::new(UserId::from(user), 8);
        registry.register(&session);
        session.activate();
        (session, rx)
    }

    fn request(sender: &str, room: &str, content: &str) -> IngestRequest {
        IngestRequest {
            sender: UserId::from(sender),
            room_id: RoomId::from(room),
            content: content.to_string(),
            media_url: None,
            media_type: None,
            client_correlation_id: None,
        }
    }

    #[tokio::test]
    async fn member_message_is_stored_and_broadcast() {
        let db = Database::new(":memory:").await.unwrap();
        db.rooms()
            .create(&RoomId::from("c1"), &[UserId::from("u1"), UserId::from("u2")], None)
            .await
            .unwrap();
        let fx = fixture(Arc::new(db.clone()));
        let (_s1, mut rx1) = connect(&fx.registry, "u1");
        let (_s2, mut rx2) = connect(&fx.registry, "u2");

        let frame = fx.writer.ingest(request("u1", "c1", "hi")).await.unwrap();

        assert_eq!(frame.content, "hi");
        assert_eq!(frame.room_id.as_str(), "c1");
        assert!(!frame.id.is_empty());

        let stored = db.messages().get(&frame.id).await.unwrap().unwrap();
        assert_eq!(stored.content, "hi");
        assert_eq!(stored.sender.as_str(), "u1");

        for rx in [&mut rx1, &mut rx2] {
            match rx.try_recv().unwrap().as_ref() {
                OutboundFrame::Message(m) => assert_eq!(m.id, frame.id),
                other => panic!("expected message frame, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn non_member_is_rejected_without_side_effects() {
        let store = Arc::new(MemoryStore::with_room("c1", &["u1", "u2"]));
        let fx = fixture(store.clone());
        let (_s1, mut rx1) = connect(&fx.registry, "u1");
        let (_s9, mut rx9) = connect(&fx.registry, "u9");

        let err = fx.writer.ingest(request("u9", "c1", "sneaky")).await.unwrap_err();

        assert!(matches!(err, IngestError::NotMember { .. }));
        assert!(store.messages().is_empty());
        assert!(rx1.try_recv().is_err());
        assert!(rx9.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let store = Arc::new(MemoryStore::with_room("c1", &["u1"]));
        let fx = fixture(store.clone());

        let err = fx.writer.ingest(request("u1", "c1", "")).await.unwrap_err();
        assert!(matches!(err, IngestError::EmptyMessage));

        let mut media_without_type = request("u1", "c1", "");
        media_without_type.media_url = Some(String::new());
        let err = fx.writer.ingest(media_without_type).await.unwrap_err();
        assert!(matches!(err, IngestError::EmptyMessage));
        assert!(store.messages().is_empty());
    }

    #[tokio::test]
    async fn media_only_message_is_accepted() {
        let store = Arc::new(MemoryStore::with_room("c1", &["u1"]));
        let fx = fixture(store.clone());

        let mut req = request("u1", "c1", "");
        req.media_url = Some("https://cdn/p.jpg".into());
        req.media_type = Some("image".into());
        req.client_correlation_id = Some("tmp-3".into());

        let frame = fx.writer.ingest(req).await.unwrap();
        assert_eq!(
            frame.media,
            Some(Media {
                url: "https://cdn/p.jpg".into(),
                kind: "image".into()
            })
        );
        assert_eq!(frame.client_correlation_id.as_deref(), Some("tmp-3"));
        assert_eq!(store.messages().len(), 1);
    }

    #[tokio::test]
    async fn media_url_without_type_is_stored_without_media() {
        let store = Arc::new(MemoryStore::with_room("c1", &["u1"]));
        let fx = fixture(store.clone());

        let mut req = request("u1", "c1", "");
        req.media_url = Some("https://cdn/p.jpg".into());

        let frame = fx.writer.ingest(req).await.unwrap();
        assert!(frame.media.is_none());
    }

    #[tokio::test]
    async fn persistence_failure_aborts_broadcast() {
        let store = Arc::new(MemoryStore::with_room("c1", &["u1"]));
        store.fail_inserts.store(true, Ordering::SeqCst);
        let fx = fixture(store.clone());
        let (_s1, mut rx1) = connect(&fx.registry, "u1");

        let err = fx.writer.ingest(request("u1", "c1", "hi")).await.unwrap_err();

        assert!(matches!(err, IngestError::Persistence(_)));
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn membership_lookup_failure_is_reported() {
        let store = Arc::new(MemoryStore::with_room("c1", &["u1"]));
        store.fail_lookups.store(true, Ordering::SeqCst);
        let fx = fixture(store);

        let err = fx.writer.ingest(request("u1", "c1", "hi")).await.unwrap_err();
        assert!(matches!(err, IngestError::MembershipLookup(_)));
    }

    #[tokio::test]
    async fn touch_failure_does_not_block_broadcast() {
        let store = Arc::new(MemoryStore::with_room("c1", &["u1"]));
        store.fail_touch.store(true, Ordering::SeqCst);
        let fx = fixture(store.clone());
        let (_s1, mut rx1) = connect(&fx.registry, "u1");

        fx.writer.ingest(request("u1", "c1", "hi")).await.unwrap();

        assert!(rx1.try_recv().is_ok());
        assert!(store.touched_at("c1").is_none());
    }

    #[tokio::test]
    async fn room_activity_uses_message_timestamp() {
        let store = Arc::new(MemoryStore::with_room("c1", &["u1"]));
        let fx = fixture(store.clone());

        let frame = fx.writer.ingest(request("u1", "c1", "hi")).await.unwrap();
        assert_eq!(store.touched_at("c1"), Some(frame.created_at));
    }

    #[test]
    fn envelope_conversion_drops_empty_correlation_id() {
        let envelope = Envelope::decode(
            br#"{"type":"message","roomID":"c1","content":"x","clientCorrelationID":""}"#,
        )
        .unwrap();
        let req = IngestRequest::from_envelope(UserId::from("u1"), RoomId::from("c1"), envelope);
        assert!(req.client_correlation_id.is_none());
        assert_eq!(req.content, "x");
    }
}
