//! Room repository.
//!
//! Rooms are created by the surrounding application; the hub reads
//! membership and bumps `updated_at` when a message lands.

use super::DbError;
#[cfg(test)]
use super::now_millis;
use crate::protocol::{RoomId, UserId};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// The entity a room is attached to (e.g. a listing or an order).
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomEntity {
    pub kind: String,
    pub id: String,
}

/// Repository for room operations.
pub struct RoomRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> RoomRepository<'a> {
    /// Create a new room repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a room with its initial participants.
    #[cfg(test)]
    pub async fn create(
        &self,
        room: &RoomId,
        participants: &[UserId],
        entity: Option<&RoomEntity>,
    ) -> Result<(), DbError> {
        let now = now_millis().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO rooms (id, entity_type, entity_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(room.as_str())
        .bind(entity.map(|e| e.kind.as_str()))
        .bind(entity.map(|e| e.id.as_str()))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for user in participants {
            sqlx::query(
                "INSERT OR IGNORE INTO room_participants (room_id, user_id) VALUES (?, ?)",
            )
            .bind(room.as_str())
            .bind(user.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Add a participant to an existing room. Returns false if already present.
    #[cfg(test)]
    pub async fn add_participant(&self, room: &RoomId, user: &UserId) -> Result<bool, DbError> {
        if !self.exists(room).await? {
            return Err(DbError::RoomNotFound(room.to_string()));
        }
        let result = sqlx::query(
            "INSERT OR IGNORE INTO room_participants (room_id, user_id) VALUES (?, ?)",
        )
        .bind(room.as_str())
        .bind(user.as_str())
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn exists(&self, room: &RoomId) -> Result<bool, DbError> {
        let row = sqlx::query_scalar::<_, i64>("SELECT 1 FROM rooms WHERE id = ?")
            .bind(room.as_str())
            .fetch_optional(self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Participant set of a room, `None` when the room is unknown.
    pub async fn participants(&self, room: &RoomId) -> Result<Option<Vec<UserId>>, DbError> {
        if !self.exists(room).await? {
            return Ok(None);
        }

        let rows = sqlx::query_scalar::<_, String>(
            "SELECT user_id FROM room_participants WHERE room_id = ? ORDER BY user_id",
        )
        .bind(room.as_str())
        .fetch_all(self.pool)
        .await?;

        Ok(Some(rows.into_iter().map(UserId::from).collect()))
    }

    pub async fn is_participant(&self, room: &RoomId, user: &UserId) -> Result<bool, DbError> {
        let row = sqlx::query_scalar::<_, i64>(
            "SELECT 1 FROM room_participants WHERE room_id = ? AND user_id = ?",
        )
        .bind(room.as_str())
        .bind(user.as_str())
        .fetch_optional(self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// Set `updated_at`. Returns false if the room does not exist.
    pub async fn touch(&self, room: &RoomId, at: DateTime<Utc>) -> Result<bool, DbError> {
        let result = sqlx::query("UPDATE rooms SET updated_at = ? WHERE id = ?")
            .bind(at.timestamp_millis())
            .bind(room.as_str())
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Last activity timestamp of a room.
    #[cfg(test)]
    pub async fn updated_at(&self, room: &RoomId) -> Result<Option<DateTime<Utc>>, DbError> {
        let millis = sqlx::query_scalar::<_, i64>("SELECT updated_at FROM rooms WHERE id = ?")
            .bind(room.as_str())
            .fetch_optional(self.pool)
            .await?;
        Ok(millis.and_then(DateTime::from_timestamp_millis))
    }
}
