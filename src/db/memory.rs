//! In-memory `ChatStore` for unit tests, with failure injection.

use super::{ChatStore, DbError, NewMessage, StoredMessage, now_millis};
use crate::protocol::{RoomId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct MemoryStore {
    rooms: Mutex<HashMap<RoomId, BTreeSet<UserId>>>,
    messages: Mutex<Vec<StoredMessage>>,
    touched: Mutex<HashMap<RoomId, DateTime<Utc>>>,
    pub fail_lookups: AtomicBool,
    pub fail_inserts: AtomicBool,
    pub fail_touch: AtomicBool,
}

impl MemoryStore {
    pub fn with_room(room: &str, participants: &[&str]) -> Self {
        let store = Self::default();
        store.add_room(room, participants);
        store
    }

    pub fn add_room(&self, room: &str, participants: &[&str]) {
        self.rooms.lock().insert(
            RoomId::from(room),
            participants.iter().map(|u| UserId::from(*u)).collect(),
        );
    }

    pub fn messages(&self) -> Vec<StoredMessage> {
        self.messages.lock().clone()
    }

    pub fn touched_at(&self, room: &str) -> Option<DateTime<Utc>> {
        self.touched.lock().get(&RoomId::from(room)).copied()
    }

    fn injected(flag: &AtomicBool, what: &str) -> Result<(), DbError> {
        if flag.load(Ordering::SeqCst) {
            Err(DbError::Internal(format!("injected {what} failure")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn room_participants(&self, room: &RoomId) -> Result<Option<Vec<UserId>>, DbError> {
        Self::injected(&self.fail_lookups, "lookup")?;
        Ok(self
            .rooms
            .lock()
            .get(room)
            .map(|users| users.iter().cloned().collect()))
    }

    async fn is_participant(&self, room: &RoomId, user: &UserId) -> Result<bool, DbError> {
        Self::injected(&self.fail_lookups, "lookup")?;
        Ok(self
            .rooms
            .lock()
            .get(room)
            .is_some_and(|users| users.contains(user)))
    }

    async fn insert_message(&self, message: NewMessage) -> Result<StoredMessage, DbError> {
        Self::injected(&self.fail_inserts, "insert")?;
        let stored = StoredMessage {
            id: uuid::Uuid::new_v4().to_string(),
            room_id: message.room_id,
            sender: message.sender,
            content: message.content,
            media: message.media,
            created_at: now_millis(),
        };
        self.messages.lock().push(stored.clone());
        Ok(stored)
    }

    async fn touch_room(&self, room: &RoomId, at: DateTime<Utc>) -> Result<(), DbError> {
        Self::injected(&self.fail_touch, "touch")?;
        self.touched.lock().insert(room.clone(), at);
        Ok(())
    }
}
