//! Frame fan-out to connected sessions.
//!
//! Delivery is enqueue-or-drop: a frame is offered to each target session's
//! bounded queue without waiting. A full queue loses that one frame for that
//! one recipient; the sender and every other recipient are unaffected.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::db::ChatStore;
use crate::metrics;
use crate::protocol::RoomId;
use crate::state::{ConnectionRegistry, EnqueueError, Session, SharedFrame};

/// Outcome of one broadcast. Informational only; never an error.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Fanout {
    /// Live sessions the target set resolved to.
    pub recipients: usize,
    pub delivered: usize,
    /// Recipients whose queue was full.
    pub dropped: usize,
    /// Recipients that started closing between lookup and enqueue.
    pub closed: usize,
}

/// Resolves target sets and performs best-effort delivery.
#[derive(Clone)]
pub struct BroadcastRouter {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn ChatStore>,
}

impl BroadcastRouter {
    pub fn new(registry: Arc<ConnectionRegistry>, store: Arc<dyn ChatStore>) -> Self {
        Self { registry, store }
    }

    /// Deliver `frame` to every connected participant of `room`.
    ///
    /// Membership is fetched fresh for each call. An unknown room or a store
    /// failure delivers nothing.
    pub async fn send_to_room(&self, room: &RoomId, frame: SharedFrame) -> Fanout {
        let participants = match self.store.room_participants(room).await {
            Ok(Some(participants)) => participants,
            Ok(None) => {
                warn!(%room, kind = frame.kind(), "Broadcast to unknown room");
                return Fanout::default();
            }
            Err(e) => {
                error!(%room, kind = frame.kind(), error = %e, "Failed to load room participants");
                return Fanout::default();
            }
        };

        let targets = self.registry.lookup_many(&participants);
        let fanout = deliver(targets.into_values(), &frame);
        debug!(
            %room,
            kind = frame.kind(),
            participants = participants.len(),
            recipients = fanout.recipients,
            dropped = fanout.dropped,
            "Broadcast to room"
        );
        fanout
    }

    /// Deliver `frame` to every connected session, the originator included.
    pub fn send_to_all(&self, frame: SharedFrame) -> Fanout {
        let fanout = deliver(self.registry.snapshot_all(), &frame);
        debug!(
            kind = frame.kind(),
            recipients = fanout.recipients,
            dropped = fanout.dropped,
            "Broadcast to all"
        );
        fanout
    }
}

fn deliver(targets: impl IntoIterator<Item = Arc<Session>>, frame: &SharedFrame) -> Fanout {
    let mut fanout = Fanout::default();
    for session in targets {
        fanout.recipients += 1;
        match session.try_enqueue(Arc::clone(frame)) {
            Ok(()) => fanout.delivered += 1,
            Err(EnqueueError::Full) => {
                fanout.dropped += 1;
                metrics::frame_dropped(frame.kind());
                warn!(
                    user = %session.user_id(),
                    session = %session.id(),
                    kind = frame.kind(),
                    dropped_total = session.dropped_frames(),
                    "Outbound queue full, dropping frame (slow client)"
                );
            }
            Err(EnqueueError::Closed) => {
                fanout.closed += 1;
                debug!(user = %session.user_id(), kind = frame.kind(), "Skipping closing session");
            }
        }
    }
    metrics::record_fanout(fanout.recipients);
    fanout
}
