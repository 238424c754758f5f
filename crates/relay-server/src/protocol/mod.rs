//! Wire protocol for the WebSocket transport
//!
//! Every frame is a JSON object tagged by a snake_case `type` field,
//! with camelCase payload fields.

use crate::models::{Message, UserId};
use serde::{Deserialize, Serialize};

/// Events sent by a client over its connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    SendMessage { receiver_id: UserId, content: String },
    Typing { receiver_id: UserId },
    StopTyping { receiver_id: UserId },
    MarkRead { message_id: String },
}

/// Events pushed by the server to a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    PresenceChanged { user_id: UserId, is_online: bool },
    OnlineUsers { user_ids: Vec<UserId> },
    UserTyping { user_id: UserId },
    UserStoppedTyping { user_id: UserId },
    ReceiveMessage { message: Message },
    MessageSent { message: Message },
    MessageError { reason: String },
    ReadReceipt { message_id: String },
}

impl ServerEvent {
    /// Short name used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::PresenceChanged { .. } => "presence_changed",
            ServerEvent::OnlineUsers { .. } => "online_users",
            ServerEvent::UserTyping { .. } => "user_typing",
            ServerEvent::UserStoppedTyping { .. } => "user_stopped_typing",
            ServerEvent::ReceiveMessage { .. } => "receive_message",
            ServerEvent::MessageSent { .. } => "message_sent",
            ServerEvent::MessageError { .. } => "message_error",
            ServerEvent::ReadReceipt { .. } => "read_receipt",
        }
    }
}

/// Parse one inbound text frame
pub fn decode_client_event(text: &str) -> serde_json::Result<ClientEvent> {
    serde_json::from_str(text)
}

/// Serialize one outbound event into a text frame
pub fn encode_server_event(event: &ServerEvent) -> serde_json::Result<String> {
    serde_json::to_string(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_send_message() {
        let event =
            decode_client_event(r#"{"type":"send_message","receiverId":"bob","content":"hi"}"#)
                .unwrap();
        assert_eq!(
            event,
            ClientEvent::SendMessage {
                receiver_id: "bob".into(),
                content: "hi".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_mark_read() {
        let event = decode_client_event(r#"{"type":"mark_read","messageId":"m1"}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::MarkRead {
                message_id: "m1".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(decode_client_event(r#"{"type":"join_room","room":"x"}"#).is_err());
    }

    #[test]
    fn test_encode_presence_changed() {
        let text = encode_server_event(&ServerEvent::PresenceChanged {
            user_id: "alice".into(),
            is_online: true,
        })
        .unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["type"], "presence_changed");
        assert_eq!(json["userId"], "alice");
        assert_eq!(json["isOnline"], true);
    }
}
