//! SQLite-backed message store
//!
//! Messages and presence rows live in one database file. A single pool is
//! opened up front and shared by every operation.

use super::{MessageStore, StoreResult};
use crate::models::{Message, UserId, UserPresenceRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    sender_id: String,
    receiver_id: String,
    content: String,
    created_at: DateTime<Utc>,
    is_read: bool,
    read_at: Option<DateTime<Utc>>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            sender_id: UserId::new(row.sender_id),
            receiver_id: UserId::new(row.receiver_id),
            content: row.content,
            created_at: row.created_at,
            is_read: row.is_read,
            read_at: row.read_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    is_online: bool,
    last_seen: DateTime<Utc>,
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database file at `path`
    pub async fn open(path: &Path) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        let store = Self { pool };
        store.init_db().await?;

        info!("[Store] SQLite database at {:?}", path);
        Ok(store)
    }

    /// Private in-memory database. Pinned to one connection so every query
    /// sees the same data.
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init_db().await?;
        Ok(store)
    }

    async fn init_db(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT UNIQUE NOT NULL,
                sender_id TEXT NOT NULL,
                receiver_id TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                read_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_pair ON messages (sender_id, receiver_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                is_online INTEGER NOT NULL DEFAULT 0,
                last_seen TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn create_message(
        &self,
        sender_id: &UserId,
        receiver_id: &UserId,
        content: &str,
    ) -> StoreResult<Message> {
        let message = Message::new(sender_id.clone(), receiver_id.clone(), content);

        sqlx::query(
            "INSERT INTO messages (id, sender_id, receiver_id, content, created_at, is_read, read_at)
             VALUES (?, ?, ?, ?, ?, 0, NULL)",
        )
        .bind(&message.id)
        .bind(message.sender_id.as_str())
        .bind(message.receiver_id.as_str())
        .bind(&message.content)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;

        Ok(message)
    }

    async fn get_message(&self, id: &str) -> StoreResult<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as(
            "SELECT id, sender_id, receiver_id, content, created_at, is_read, read_at
             FROM messages WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Message::from))
    }

    async fn update_message_read(&self, id: &str, read_at: DateTime<Utc>) -> StoreResult<bool> {
        let result =
            sqlx::query("UPDATE messages SET is_read = 1, read_at = ? WHERE id = ? AND is_read = 0")
                .bind(read_at)
                .bind(id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_user_presence(
        &self,
        user_id: &UserId,
        is_online: bool,
        last_seen: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, is_online, last_seen) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                is_online = excluded.is_online,
                last_seen = excluded.last_seen
            "#,
        )
        .bind(user_id.as_str())
        .bind(is_online)
        .bind(last_seen)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_messages_between(&self, a: &UserId, b: &UserId) -> StoreResult<Vec<Message>> {
        // created_at is stored as RFC 3339 UTC, which sorts chronologically as
        // text; seq breaks ties in insertion order
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, sender_id, receiver_id, content, created_at, is_read, read_at
            FROM messages
            WHERE (sender_id = ?1 AND receiver_id = ?2)
               OR (sender_id = ?2 AND receiver_id = ?1)
            ORDER BY created_at ASC, seq ASC
            "#,
        )
        .bind(a.as_str())
        .bind(b.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Message::from).collect())
    }

    async fn list_users(&self) -> StoreResult<Vec<UserPresenceRecord>> {
        let rows: Vec<UserRow> =
            sqlx::query_as("SELECT id, is_online, last_seen FROM users ORDER BY is_online DESC, id ASC")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|row| UserPresenceRecord {
                user_id: UserId::new(row.id),
                is_online: row.is_online,
                last_seen: row.last_seen,
            })
            .collect())
    }
}
