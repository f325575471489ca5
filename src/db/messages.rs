//! Message repository.

use super::{DbError, NewMessage, StoredMessage, now_millis};
use sqlx::SqlitePool;
use uuid::Uuid;

#[cfg(test)]
use crate::protocol::{Media, RoomId, UserId};
#[cfg(test)]
use chrono::DateTime;

#[cfg(test)]
type MessageRow = (String, String, String, String, Option<String>, Option<String>, i64);

#[cfg(test)]
fn row_to_message(row: MessageRow) -> Result<StoredMessage, DbError> {
    let (id, room_id, sender, content, media_url, media_type, created_at) = row;
    let created_at = DateTime::from_timestamp_millis(created_at)
        .ok_or_else(|| DbError::Internal(format!("message {id} has invalid timestamp")))?;
    Ok(StoredMessage {
        media: Media::from_parts(media_url.as_deref(), media_type.as_deref()),
        id,
        room_id: RoomId::from(room_id),
        sender: UserId::from(sender),
        content,
        created_at,
    })
}

/// Repository for message operations.
pub struct MessageRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> MessageRepository<'a> {
    /// Create a new message repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Store a message, assigning a UUID and the current time.
    pub async fn insert(&self, message: NewMessage) -> Result<StoredMessage, DbError> {
        let id = Uuid::new_v4().to_string();
        let created_at = now_millis();
        let (media_url, media_type) = match &message.media {
            Some(media) => (Some(media.url.as_str()), Some(media.kind.as_str())),
            None => (None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO messages (id, room_id, sender, content, media_url, media_type, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(message.room_id.as_str())
        .bind(message.sender.as_str())
        .bind(&message.content)
        .bind(media_url)
        .bind(media_type)
        .bind(created_at.timestamp_millis())
        .execute(self.pool)
        .await?;

        Ok(StoredMessage {
            id,
            room_id: message.room_id,
            sender: message.sender,
            content: message.content,
            media: message.media,
            created_at,
        })
    }

    /// Fetch a message by id.
    #[cfg(test)]
    pub async fn get(&self, id: &str) -> Result<Option<StoredMessage>, DbError> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, room_id, sender, content, media_url, media_type, created_at
            FROM messages
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(row_to_message).transpose()
    }

    #[cfg(test)]
    pub async fn count_in_room(&self, room: &RoomId) -> Result<i64, DbError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages WHERE room_id = ?")
            .bind(room.as_str())
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}
