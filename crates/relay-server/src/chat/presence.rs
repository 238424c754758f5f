//! Presence tracking
//!
//! Turns registry mutations into `presence_changed` broadcasts and durable
//! last-seen updates. Only genuine online/offline edges are announced.

use super::registry::{ConnectionHandle, ConnectionRegistry, Peers};
use super::router::EventRouter;
use crate::models::{PresenceState, UserId};
use crate::protocol::ServerEvent;
use crate::store::MessageStore;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a connect or disconnect did to the user's presence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceTransition {
    CameOnline,
    /// Already online; the new connection replaced the old one
    SessionReplaced,
    WentOffline(UserId),
    /// Handle was already removed or replaced
    Unchanged,
}

pub struct PresenceTracker {
    registry: Arc<ConnectionRegistry>,
    router: Arc<EventRouter>,
    store: Arc<dyn MessageStore>,
    last_seen: RwLock<HashMap<UserId, DateTime<Utc>>>,
}

impl PresenceTracker {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        router: Arc<EventRouter>,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            registry,
            router,
            store,
            last_seen: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection for `user_id` and announce the user if they
    /// were offline. The new connection also receives the current online set,
    /// enqueued in the same critical section so no later presence edge can
    /// overtake it.
    pub async fn connect(&self, user_id: &UserId, handle: &ConnectionHandle) -> PresenceTransition {
        let mut seen_at = None;

        self.registry
            .register_with(user_id.clone(), handle.clone(), |user, previous, peers| {
                let snapshot = ServerEvent::OnlineUsers {
                    user_ids: peers.users(),
                };
                if previous.is_none() {
                    let event = ServerEvent::PresenceChanged {
                        user_id: user.clone(),
                        is_online: true,
                    };
                    seen_at = Some(self.announce(user, peers, &event));
                }
                self.router.deliver_to_handle(handle, snapshot);
            });

        match seen_at {
            Some(now) => {
                self.persist(user_id, true, now).await;
                PresenceTransition::CameOnline
            }
            None => {
                debug!(user_id = %user_id, connection = %handle.id(), "Session replaced, no broadcast");
                PresenceTransition::SessionReplaced
            }
        }
    }

    /// Drop `handle` from the registry and announce the user offline if it
    /// was their live connection. Safe to call more than once.
    pub async fn disconnect(&self, handle: &ConnectionHandle) -> PresenceTransition {
        let mut seen_at = None;

        let removed = self.registry.unregister_with(handle, |user, peers| {
            let event = ServerEvent::PresenceChanged {
                user_id: user.clone(),
                is_online: false,
            };
            seen_at = Some(self.announce(user, peers, &event));
        });

        let (Some(user_id), Some(now)) = (removed, seen_at) else {
            debug!(connection = %handle.id(), "Disconnect for unknown or replaced connection");
            return PresenceTransition::Unchanged;
        };

        self.persist(&user_id, false, now).await;
        PresenceTransition::WentOffline(user_id)
    }

    /// Runs inside the registry's critical section, so announcements for one
    /// user go out in the same order as the table changes.
    fn announce(&self, user_id: &UserId, peers: Peers<'_>, event: &ServerEvent) -> DateTime<Utc> {
        let now = Utc::now();
        self.last_seen.write().insert(user_id.clone(), now);
        let delivered = EventRouter::fan_out(peers, event);
        match event {
            ServerEvent::PresenceChanged { is_online: true, .. } => {
                info!(user_id = %user_id, delivered, "User online")
            }
            _ => info!(user_id = %user_id, delivered, "User offline"),
        }
        now
    }

    /// Storage failures are logged only; the broadcast has already gone out
    async fn persist(&self, user_id: &UserId, is_online: bool, last_seen: DateTime<Utc>) {
        if let Err(e) = self
            .store
            .update_user_presence(user_id, is_online, last_seen)
            .await
        {
            warn!(user_id = %user_id, is_online, error = %e, "Failed to persist presence");
        }
    }

    pub fn presence(&self, user_id: &UserId) -> PresenceState {
        PresenceState {
            user_id: user_id.clone(),
            is_online: self.registry.is_online(user_id),
            last_seen: self.last_seen.read().get(user_id).copied(),
        }
    }
}
