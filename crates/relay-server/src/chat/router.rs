//! Event router
//!
//! Resolves users to connections through the registry and enqueues events on
//! them. Nothing is buffered for users who are not connected.

use super::registry::{ConnectionHandle, ConnectionRegistry};
use crate::models::{TypingSignal, UserId};
use crate::protocol::ServerEvent;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of a single-recipient delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Enqueued on the recipient's live connection
    Delivered,
    /// Recipient not connected (or its connection just closed); dropped
    Missed,
}

impl Delivery {
    pub fn is_delivered(self) -> bool {
        matches!(self, Delivery::Delivered)
    }
}

pub struct EventRouter {
    registry: Arc<ConnectionRegistry>,
}

impl EventRouter {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn deliver_to_user(&self, user_id: &UserId, event: ServerEvent) -> Delivery {
        // The registry lock is released before the event is enqueued
        let Some(handle) = self.registry.lookup(user_id) else {
            debug!(user_id = %user_id, event = event.kind(), "Recipient offline, dropping event");
            return Delivery::Missed;
        };
        self.deliver_to_handle(&handle, event)
    }

    pub fn deliver_to_handle(&self, handle: &ConnectionHandle, event: ServerEvent) -> Delivery {
        let kind = event.kind();
        if handle.send(event) {
            Delivery::Delivered
        } else {
            debug!(connection = %handle.id(), event = kind, "Connection closed, dropping event");
            Delivery::Missed
        }
    }

    /// Deliver to every registered connection. Returns how many accepted it.
    ///
    /// Takes the registry lock to snapshot handles, so it must not be called
    /// from a registry callback. Presence edges are announced from inside
    /// the registry's critical section through [`fan_out`](Self::fan_out)
    /// over the callback's peers instead.
    pub fn broadcast_all(&self, event: ServerEvent) -> usize {
        let handles = self.registry.handles();
        Self::fan_out(&handles, &event)
    }

    /// Enqueue `event` on each handle. A closed connection is logged and
    /// skipped; the rest still receive the event.
    pub fn fan_out<'a, I>(handles: I, event: &ServerEvent) -> usize
    where
        I: IntoIterator<Item = &'a ConnectionHandle>,
    {
        let mut delivered = 0;
        let mut skipped = 0;

        for handle in handles {
            if handle.send(event.clone()) {
                delivered += 1;
            } else {
                skipped += 1;
                warn!(connection = %handle.id(), event = event.kind(), "Broadcast to closed connection skipped");
            }
        }

        debug!(event = event.kind(), delivered, skipped, "Broadcast complete");
        delivered
    }

    /// Relay a typing indicator. Dropped silently when the receiver is offline.
    pub fn relay_typing(&self, signal: &TypingSignal, is_typing: bool) -> Delivery {
        let event = if is_typing {
            ServerEvent::UserTyping {
                user_id: signal.sender_id.clone(),
            }
        } else {
            ServerEvent::UserStoppedTyping {
                user_id: signal.sender_id.clone(),
            }
        };
        self.deliver_to_user(&signal.receiver_id, event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Arc<ConnectionRegistry>, EventRouter) {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = EventRouter::new(registry.clone());
        (registry, router)
    }

    #[tokio::test]
    async fn test_deliver_to_offline_user_is_missed() {
        let (_registry, router) = setup();
        let delivery = router.deliver_to_user(
            &"ghost".into(),
            ServerEvent::ReadReceipt {
                message_id: "m1".to_string(),
            },
        );
        assert_eq!(delivery, Delivery::Missed);
    }

    #[tokio::test]
    async fn test_events_arrive_in_submission_order() {
        let (registry, router) = setup();
        let (handle, mut rx) = ConnectionHandle::channel();
        registry.register("bob".into(), handle);

        for i in 0..50 {
            router.deliver_to_user(
                &"bob".into(),
                ServerEvent::ReadReceipt {
                    message_id: format!("m{}", i),
                },
            );
        }

        for i in 0..50 {
            assert_eq!(
                rx.recv().await.unwrap(),
                ServerEvent::ReadReceipt {
                    message_id: format!("m{}", i)
                }
            );
        }
    }

    #[tokio::test]
    async fn test_broadcast_skips_closed_connection() {
        let (registry, router) = setup();
        let (alive, mut alive_rx) = ConnectionHandle::channel();
        let (dead, dead_rx) = ConnectionHandle::channel();
        registry.register("alice".into(), alive);
        registry.register("bob".into(), dead);
        drop(dead_rx);

        let delivered = router.broadcast_all(ServerEvent::PresenceChanged {
            user_id: "carol".into(),
            is_online: true,
        });

        assert_eq!(delivered, 1);
        assert!(matches!(
            alive_rx.recv().await,
            Some(ServerEvent::PresenceChanged { .. })
        ));
    }

    #[tokio::test]
    async fn test_typing_to_offline_user_produces_nothing() {
        let (registry, router) = setup();
        let (sender, mut sender_rx) = ConnectionHandle::channel();
        registry.register("alice".into(), sender);

        let delivery = router.relay_typing(
            &TypingSignal {
                sender_id: "alice".into(),
                receiver_id: "bob".into(),
            },
            true,
        );

        assert_eq!(delivery, Delivery::Missed);
        assert!(sender_rx.try_recv().is_err());
    }
}
