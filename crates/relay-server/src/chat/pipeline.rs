//! Message pipeline
//!
//! Validate, persist, then fan out. A message reaches its receiver only after
//! the store has accepted it, and its read flag flips at most once.

use super::router::{Delivery, EventRouter};
use crate::error::{ChatError, Result};
use crate::models::{Message, UserId};
use crate::protocol::ServerEvent;
use crate::store::MessageStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of a successful send
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub message: Message,
    pub receiver: Delivery,
    pub sender_echo: Delivery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This call flipped the flag; `receipt` says whether the sender heard
    Marked { receipt: Delivery },
    AlreadyRead,
}

pub struct MessagePipeline {
    router: Arc<EventRouter>,
    store: Arc<dyn MessageStore>,
    max_message_len: usize,
}

impl MessagePipeline {
    pub fn new(router: Arc<EventRouter>, store: Arc<dyn MessageStore>, max_message_len: usize) -> Self {
        Self {
            router,
            store,
            max_message_len,
        }
    }

    fn validate(&self, receiver_id: &UserId, content: &str) -> Result<()> {
        if receiver_id.as_str().trim().is_empty() {
            return Err(ChatError::Validation("Receiver is required".to_string()));
        }
        if content.trim().is_empty() {
            return Err(ChatError::Validation("Message content is empty".to_string()));
        }
        if content.chars().count() > self.max_message_len {
            return Err(ChatError::Validation(format!(
                "Message exceeds {} characters",
                self.max_message_len
            )));
        }
        Ok(())
    }

    pub async fn send_message(
        &self,
        sender_id: &UserId,
        receiver_id: &UserId,
        content: &str,
    ) -> Result<SendOutcome> {
        self.validate(receiver_id, content)?;

        let message = self
            .store
            .create_message(sender_id, receiver_id, content)
            .await?;

        let receiver = self.router.deliver_to_user(
            receiver_id,
            ServerEvent::ReceiveMessage {
                message: message.clone(),
            },
        );
        let sender_echo = self.router.deliver_to_user(
            sender_id,
            ServerEvent::MessageSent {
                message: message.clone(),
            },
        );

        info!(
            message_id = %message.id,
            sender = %sender_id,
            receiver = %receiver_id,
            delivered = receiver.is_delivered(),
            "Message persisted"
        );

        Ok(SendOutcome {
            message,
            receiver,
            sender_echo,
        })
    }

    pub async fn mark_read(&self, message_id: &str, reader_id: &UserId) -> Result<ReadOutcome> {
        let message = self
            .store
            .get_message(message_id)
            .await?
            .filter(|m| &m.receiver_id == reader_id)
            .ok_or_else(|| ChatError::NotFound("Message".to_string()))?;

        if message.is_read {
            debug!(message_id, "Message already read");
            return Ok(ReadOutcome::AlreadyRead);
        }

        // Conditional update: only one concurrent caller wins
        if !self.store.update_message_read(message_id, Utc::now()).await? {
            debug!(message_id, "Message read concurrently");
            return Ok(ReadOutcome::AlreadyRead);
        }

        let receipt = self.router.deliver_to_user(
            &message.sender_id,
            ServerEvent::ReadReceipt {
                message_id: message_id.to_string(),
            },
        );
        info!(message_id, reader = %reader_id, receipt = receipt.is_delivered(), "Message read");

        Ok(ReadOutcome::Marked { receipt })
    }

    /// Conversation history between two users, oldest first
    pub async fn conversation(&self, a: &UserId, b: &UserId) -> Result<Vec<Message>> {
        Ok(self.store.list_messages_between(a, b).await?)
    }
}
