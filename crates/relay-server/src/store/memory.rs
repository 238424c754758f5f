//! In-process message store
//!
//! Keeps everything in memory; used when no database is configured and by
//! tests that do not care about durability.

use super::{MessageStore, StoreResult};
use crate::models::{Message, UserId, UserPresenceRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct MemoryStore {
    /// Messages in insertion order
    messages: RwLock<Vec<Message>>,
    users: RwLock<HashMap<UserId, UserPresenceRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_count(&self) -> usize {
        self.messages.read().len()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create_message(
        &self,
        sender_id: &UserId,
        receiver_id: &UserId,
        content: &str,
    ) -> StoreResult<Message> {
        let message = Message::new(sender_id.clone(), receiver_id.clone(), content);
        self.messages.write().push(message.clone());
        Ok(message)
    }

    async fn get_message(&self, id: &str) -> StoreResult<Option<Message>> {
        Ok(self.messages.read().iter().find(|m| m.id == id).cloned())
    }

    async fn update_message_read(&self, id: &str, read_at: DateTime<Utc>) -> StoreResult<bool> {
        let mut messages = self.messages.write();
        match messages.iter_mut().find(|m| m.id == id) {
            Some(message) if !message.is_read => {
                message.is_read = true;
                message.read_at = Some(read_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_user_presence(
        &self,
        user_id: &UserId,
        is_online: bool,
        last_seen: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.users.write().insert(
            user_id.clone(),
            UserPresenceRecord {
                user_id: user_id.clone(),
                is_online,
                last_seen,
            },
        );
        Ok(())
    }

    async fn list_messages_between(&self, a: &UserId, b: &UserId) -> StoreResult<Vec<Message>> {
        let mut conversation: Vec<Message> = self
            .messages
            .read()
            .iter()
            .filter(|m| {
                (&m.sender_id == a && &m.receiver_id == b)
                    || (&m.sender_id == b && &m.receiver_id == a)
            })
            .cloned()
            .collect();

        // Stable sort keeps insertion order for equal timestamps
        conversation.sort_by(|x, y| x.created_at.cmp(&y.created_at));
        Ok(conversation)
    }

    async fn list_users(&self) -> StoreResult<Vec<UserPresenceRecord>> {
        let mut users: Vec<UserPresenceRecord> = self.users.read().values().cloned().collect();
        users.sort_by(|x, y| {
            y.is_online
                .cmp(&x.is_online)
                .then_with(|| x.user_id.cmp(&y.user_id))
        });
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mark_read_unknown_id_is_not_applied() {
        let store = MemoryStore::new();
        assert!(!store.update_message_read("nope", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_conversation_excludes_other_pairs() {
        let store = MemoryStore::new();
        store
            .create_message(&"alice".into(), &"bob".into(), "for bob")
            .await
            .unwrap();
        store
            .create_message(&"alice".into(), &"carol".into(), "for carol")
            .await
            .unwrap();

        let messages = store
            .list_messages_between(&"alice".into(), &"bob".into())
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "for bob");
        assert_eq!(store.message_count(), 2);
    }
}
