//! Message storage
//!
//! The storage collaborator is the system of record for messages and the
//! durable side of presence. The routing engine only talks to it through
//! [`MessageStore`].

pub mod memory;
pub mod sqlite;

#[cfg(test)]
pub(crate) mod testing;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::models::{Message, UserId, UserPresenceRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by a storage backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a new unread message, assigning its id and creation time
    async fn create_message(
        &self,
        sender_id: &UserId,
        receiver_id: &UserId,
        content: &str,
    ) -> StoreResult<Message>;

    async fn get_message(&self, id: &str) -> StoreResult<Option<Message>>;

    /// Flip a message to read. Returns `false` when it was already read
    /// (or does not exist), so concurrent callers see exactly one winner.
    async fn update_message_read(&self, id: &str, read_at: DateTime<Utc>) -> StoreResult<bool>;

    async fn update_user_presence(
        &self,
        user_id: &UserId,
        is_online: bool,
        last_seen: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Both directions of a conversation, oldest first
    async fn list_messages_between(&self, a: &UserId, b: &UserId) -> StoreResult<Vec<Message>>;

    /// Known users, online first, then by id
    async fn list_users(&self) -> StoreResult<Vec<UserPresenceRecord>>;
}
