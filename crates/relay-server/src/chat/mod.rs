//! Chat Service Layer
//!
//! Presence tracking and direct-message routing. [`ChatHub`] owns the
//! registry and the components built on it, and exposes one method per
//! inbound transport event.

pub mod pipeline;
pub mod presence;
pub mod registry;
pub mod router;

pub use pipeline::{MessagePipeline, ReadOutcome, SendOutcome};
pub use presence::{PresenceTracker, PresenceTransition};
pub use registry::{ConnectionHandle, ConnectionRegistry};
pub use router::{Delivery, EventRouter};

use crate::error::Result;
use crate::models::{TypingSignal, UserId};
use crate::protocol::{ClientEvent, ServerEvent};
use crate::store::MessageStore;
use std::sync::Arc;
use tracing::warn;

pub struct ChatHub {
    registry: Arc<ConnectionRegistry>,
    router: Arc<EventRouter>,
    presence: PresenceTracker,
    pipeline: MessagePipeline,
}

impl ChatHub {
    pub fn new(store: Arc<dyn MessageStore>, max_message_len: usize) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = Arc::new(EventRouter::new(registry.clone()));
        let presence = PresenceTracker::new(registry.clone(), router.clone(), store.clone());
        let pipeline = MessagePipeline::new(router.clone(), store, max_message_len);

        Self {
            registry,
            router,
            presence,
            pipeline,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn pipeline(&self) -> &MessagePipeline {
        &self.pipeline
    }

    pub async fn connect(&self, user_id: &UserId, handle: &ConnectionHandle) -> PresenceTransition {
        self.presence.connect(user_id, handle).await
    }

    pub async fn disconnect(&self, handle: &ConnectionHandle) -> PresenceTransition {
        self.presence.disconnect(handle).await
    }

    pub async fn send_message(
        &self,
        sender_id: &UserId,
        receiver_id: &UserId,
        content: &str,
    ) -> Result<SendOutcome> {
        self.pipeline.send_message(sender_id, receiver_id, content).await
    }

    pub fn typing(&self, sender_id: &UserId, receiver_id: &UserId) -> Delivery {
        self.relay_typing(sender_id, receiver_id, true)
    }

    pub fn stop_typing(&self, sender_id: &UserId, receiver_id: &UserId) -> Delivery {
        self.relay_typing(sender_id, receiver_id, false)
    }

    fn relay_typing(&self, sender_id: &UserId, receiver_id: &UserId, is_typing: bool) -> Delivery {
        let signal = TypingSignal {
            sender_id: sender_id.clone(),
            receiver_id: receiver_id.clone(),
        };
        self.router.relay_typing(&signal, is_typing)
    }

    pub async fn mark_read(&self, message_id: &str, reader_id: &UserId) -> Result<ReadOutcome> {
        self.pipeline.mark_read(message_id, reader_id).await
    }

    /// Dispatch one inbound event from `user_id`'s connection. Failures are
    /// reported back on that connection only.
    pub async fn handle_client_event(
        &self,
        user_id: &UserId,
        handle: &ConnectionHandle,
        event: ClientEvent,
    ) {
        let result = match event {
            ClientEvent::SendMessage {
                receiver_id,
                content,
            } => self
                .send_message(user_id, &receiver_id, &content)
                .await
                .map(|_| ()),
            ClientEvent::Typing { receiver_id } => {
                self.typing(user_id, &receiver_id);
                Ok(())
            }
            ClientEvent::StopTyping { receiver_id } => {
                self.stop_typing(user_id, &receiver_id);
                Ok(())
            }
            ClientEvent::MarkRead { message_id } => {
                self.mark_read(&message_id, user_id).await.map(|_| ())
            }
        };

        if let Err(e) = result {
            warn!(user_id = %user_id, error = %e, "Client event failed");
            self.router.deliver_to_handle(
                handle,
                ServerEvent::MessageError {
                    reason: e.client_reason(),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_reconnect_does_not_rebroadcast() {
        let hub = ChatHub::new(Arc::new(MemoryStore::new()), 1000);
        let (watcher, mut watcher_rx) = ConnectionHandle::channel();
        hub.connect(&"watcher".into(), &watcher).await;
        while watcher_rx.try_recv().is_ok() {}

        let (first, _first_rx) = ConnectionHandle::channel();
        let (second, _second_rx) = ConnectionHandle::channel();
        assert_eq!(hub.connect(&"alice".into(), &first).await, PresenceTransition::CameOnline);
        assert_eq!(
            hub.connect(&"alice".into(), &second).await,
            PresenceTransition::SessionReplaced
        );
        // Late disconnect of the replaced session is not an offline edge
        assert_eq!(hub.disconnect(&first).await, PresenceTransition::Unchanged);

        let mut presence_events = Vec::new();
        while let Ok(event) = watcher_rx.try_recv() {
            presence_events.push(event);
        }
        assert_eq!(
            presence_events,
            vec![ServerEvent::PresenceChanged {
                user_id: "alice".into(),
                is_online: true
            }]
        );
        assert!(hub.presence().presence(&"alice".into()).is_online);
    }

    #[tokio::test]
    async fn test_failed_event_reports_to_initiator_only() {
        let hub = ChatHub::new(Arc::new(MemoryStore::new()), 1000);
        let (alice, mut alice_rx) = ConnectionHandle::channel();
        let (bob, mut bob_rx) = ConnectionHandle::channel();
        hub.connect(&"alice".into(), &alice).await;
        hub.connect(&"bob".into(), &bob).await;
        while alice_rx.try_recv().is_ok() {}
        while bob_rx.try_recv().is_ok() {}

        hub.handle_client_event(
            &"alice".into(),
            &alice,
            ClientEvent::SendMessage {
                receiver_id: "bob".into(),
                content: "   ".to_string(),
            },
        )
        .await;

        assert!(matches!(
            alice_rx.try_recv(),
            Ok(ServerEvent::MessageError { .. })
        ));
        assert!(bob_rx.try_recv().is_err());
    }
}
