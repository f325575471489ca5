//! Database module for persistent storage.
//!
//! Provides async SQLite database access using SQLx for:
//! - Rooms and their participant sets
//! - Chat messages posted to rooms
//!
//! The connection layer only needs the narrow [`ChatStore`] view;
//! [`Database`] implements it on top of the repositories.

mod messages;
mod rooms;

#[cfg(test)]
pub mod memory;

pub use messages::MessageRepository;
pub use rooms::RoomRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::protocol::{Media, RoomId, UserId};

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(sqlx::Error),
    #[error("migration error: {0}")]
    Migration(sqlx::migrate::MigrateError),
    #[error("room not found: {0}")]
    RoomNotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// A chat message about to be stored. The store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub room_id: RoomId,
    pub sender: UserId,
    pub content: String,
    pub media: Option<Media>,
}

/// A chat message as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: String,
    pub room_id: RoomId,
    pub sender: UserId,
    pub content: String,
    pub media: Option<Media>,
    pub created_at: DateTime<Utc>,
}

/// What the hub needs from room and message storage.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Participants of a room, or `None` if the room does not exist.
    async fn room_participants(&self, room: &RoomId) -> Result<Option<Vec<UserId>>, DbError>;

    async fn is_participant(&self, room: &RoomId, user: &UserId) -> Result<bool, DbError>;

    /// Store a message with a fresh id and a millisecond-precision timestamp.
    async fn insert_message(&self, message: NewMessage) -> Result<StoredMessage, DbError>;

    /// Record activity on a room.
    async fn touch_room(&self, room: &RoomId, at: DateTime<Utc>) -> Result<(), DbError>;
}

/// Current time truncated to whole milliseconds.
pub(crate) fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// Database handle with connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connection acquire timeout - prevents connection storms from blocking indefinitely.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Create a new database connection, running migrations if needed.
    pub async fn new(path: &str) -> Result<Self, DbError> {
        let pool = if path == ":memory:" {
            // Uniquely named shared-cache memory database per call so parallel
            // tests never see each other's rows.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:merehub-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true)
                .foreign_keys(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .foreign_keys(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        };

        info!(path = %path, "Database connected");

        Self::run_migrations(&pool).await?;

        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&pool)
            .await?;

        let integrity_result: String = sqlx::query_scalar("PRAGMA integrity_check")
            .fetch_one(&pool)
            .await?;

        if integrity_result != "ok" {
            tracing::error!(
                integrity_check = %integrity_result,
                "Database integrity check FAILED - corruption detected!"
            );
            return Err(DbError::Internal(format!(
                "integrity check failed: {integrity_result}"
            )));
        }

        info!("Database integrity check passed");

        Ok(Self { pool })
    }

    /// Run embedded migrations.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(DbError::Migration)?;

        info!("Database migrations checked/applied");
        Ok(())
    }

    /// Get room repository.
    pub fn rooms(&self) -> RoomRepository<'_> {
        RoomRepository::new(&self.pool)
    }

    /// Get message repository.
    pub fn messages(&self) -> MessageRepository<'_> {
        MessageRepository::new(&self.pool)
    }
}

#[async_trait]
impl ChatStore for Database {
    async fn room_participants(&self, room: &RoomId) -> Result<Option<Vec<UserId>>, DbError> {
        self.rooms().participants(room).await
    }

    async fn is_participant(&self, room: &RoomId, user: &UserId) -> Result<bool, DbError> {
        self.rooms().is_participant(room, user).await
    }

    async fn insert_message(&self, message: NewMessage) -> Result<StoredMessage, DbError> {
        self.messages().insert(message).await
    }

    async fn touch_room(&self, room: &RoomId, at: DateTime<Utc>) -> Result<(), DbError> {
        if self.rooms().touch(room, at).await? {
            Ok(())
        } else {
            Err(DbError::RoomNotFound(room.to_string()))
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        DbError::Sqlx(err)
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::Migration(err)
    }
}
