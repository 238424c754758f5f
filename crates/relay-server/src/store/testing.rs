//! Test doubles for the storage collaborator

use super::{MessageStore, StoreError, StoreResult};
use crate::models::{Message, UserId, UserPresenceRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Store whose every call fails
pub struct DownStore;

fn down<T>() -> StoreResult<T> {
    Err(StoreError::Unavailable("down".into()))
}

#[async_trait]
impl MessageStore for DownStore {
    async fn create_message(&self, _: &UserId, _: &UserId, _: &str) -> StoreResult<Message> {
        down()
    }
    async fn get_message(&self, _: &str) -> StoreResult<Option<Message>> {
        down()
    }
    async fn update_message_read(&self, _: &str, _: DateTime<Utc>) -> StoreResult<bool> {
        down()
    }
    async fn update_user_presence(&self, _: &UserId, _: bool, _: DateTime<Utc>) -> StoreResult<()> {
        down()
    }
    async fn list_messages_between(&self, _: &UserId, _: &UserId) -> StoreResult<Vec<Message>> {
        down()
    }
    async fn list_users(&self) -> StoreResult<Vec<UserPresenceRecord>> {
        down()
    }
}
