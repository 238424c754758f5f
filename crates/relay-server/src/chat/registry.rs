//! Connection registry
//!
//! Maps each online user to exactly one live connection and back. Both
//! directions live behind one mutex so every mutation is a single atomic step.
//! Lock sections never await.

use crate::models::{ConnectionId, UserId};
use crate::protocol::ServerEvent;
use parking_lot::Mutex;
use std::collections::hash_map;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Sending half of one client connection
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    /// New handle plus the receiver the connection's writer drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: ConnectionId::new(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Enqueue an event for this connection. Never waits; returns false when
    /// the connection's writer has already gone away.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

/// Live connections visible to a registry callback
pub struct Peers<'a> {
    by_user: &'a HashMap<UserId, ConnectionHandle>,
    handles: hash_map::Values<'a, UserId, ConnectionHandle>,
}

impl<'a> Peers<'a> {
    fn new(by_user: &'a HashMap<UserId, ConnectionHandle>) -> Self {
        Self {
            by_user,
            handles: by_user.values(),
        }
    }

    /// Online users as of this critical section, sorted
    pub fn users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.by_user.keys().cloned().collect();
        users.sort();
        users
    }
}

impl<'a> Iterator for Peers<'a> {
    type Item = &'a ConnectionHandle;

    fn next(&mut self) -> Option<Self::Item> {
        self.handles.next()
    }
}

#[derive(Default)]
struct Tables {
    by_user: HashMap<UserId, ConnectionHandle>,
    by_connection: HashMap<ConnectionId, UserId>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    tables: Mutex<Tables>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `user_id` to `handle`, replacing any earlier connection.
    ///
    /// Returns the handle that was replaced. `None` means the user was
    /// offline until now.
    pub fn register(&self, user_id: UserId, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.register_with(user_id, handle, |_, _, _| {})
    }

    /// [`register`](Self::register), running `on_registered` with the user,
    /// the replaced handle (`None` when the user was offline) and every live
    /// connection, the new one included. The callback runs inside the
    /// critical section and must not block.
    pub fn register_with<F>(
        &self,
        user_id: UserId,
        handle: ConnectionHandle,
        on_registered: F,
    ) -> Option<ConnectionHandle>
    where
        F: FnOnce(&UserId, Option<&ConnectionHandle>, Peers<'_>),
    {
        let mut tables = self.tables.lock();

        // A handle belongs to one user only
        if let Some(owner) = tables.by_connection.get(&handle.id).cloned() {
            if owner != user_id {
                tables.by_user.remove(&owner);
            }
        }

        let previous = tables.by_user.insert(user_id.clone(), handle.clone());
        if let Some(previous) = &previous {
            if previous.id != handle.id {
                tables.by_connection.remove(&previous.id);
            }
        }
        tables.by_connection.insert(handle.id, user_id.clone());

        on_registered(&user_id, previous.as_ref(), Peers::new(&tables.by_user));
        previous
    }

    /// Remove the entry held by `handle`.
    ///
    /// Returns the user it belonged to, or `None` if the handle was already
    /// removed or replaced by a newer connection.
    pub fn unregister(&self, handle: &ConnectionHandle) -> Option<UserId> {
        self.unregister_with(handle, |_, _| {})
    }

    /// [`unregister`](Self::unregister), running `on_offline` with the
    /// user and the remaining connections when an entry was actually removed. The callback
    /// runs inside the critical section and must not block.
    pub fn unregister_with<F>(&self, handle: &ConnectionHandle, on_offline: F) -> Option<UserId>
    where
        F: FnOnce(&UserId, Peers<'_>),
    {
        let mut tables = self.tables.lock();

        let user_id = tables.by_connection.remove(&handle.id)?;
        if tables
            .by_user
            .get(&user_id)
            .is_some_and(|current| current.id == handle.id)
        {
            tables.by_user.remove(&user_id);
        }

        on_offline(&user_id, Peers::new(&tables.by_user));
        Some(user_id)
    }

    pub fn lookup(&self, user_id: &UserId) -> Option<ConnectionHandle> {
        self.tables.lock().by_user.get(user_id).cloned()
    }

    pub fn user_of(&self, connection: ConnectionId) -> Option<UserId> {
        self.tables.lock().by_connection.get(&connection).cloned()
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.tables.lock().by_user.contains_key(user_id)
    }

    /// Snapshot of every live connection
    pub fn handles(&self) -> Vec<ConnectionHandle> {
        self.tables.lock().by_user.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tables.lock().by_user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn assert_consistent(&self) {
        let tables = self.tables.lock();
        assert_eq!(tables.by_user.len(), tables.by_connection.len());
        for (user, handle) in &tables.by_user {
            assert_eq!(tables.by_connection.get(&handle.id), Some(user));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn handle() -> ConnectionHandle {
        ConnectionHandle::channel().0
    }

    #[test]
    fn test_register_reports_previous_handle() {
        let registry = ConnectionRegistry::new();
        let first = handle();
        let second = handle();

        assert!(registry.register("alice".into(), first.clone()).is_none());
        assert_eq!(registry.register("alice".into(), second.clone()), Some(first.clone()));
        assert_eq!(registry.lookup(&"alice".into()), Some(second));
        assert_eq!(registry.len(), 1);
        registry.assert_consistent();
    }

    #[test]
    fn test_unregister_twice_is_noop() {
        let registry = ConnectionRegistry::new();
        let h = handle();
        registry.register("alice".into(), h.clone());

        assert_eq!(registry.unregister(&h), Some("alice".into()));
        assert_eq!(registry.unregister(&h), None);
        assert!(registry.lookup(&"alice".into()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_replaced_handle_cannot_evict_new_session() {
        let registry = ConnectionRegistry::new();
        let old = handle();
        let new = handle();
        registry.register("alice".into(), old.clone());
        registry.register("alice".into(), new.clone());

        assert_eq!(registry.unregister(&old), None);
        assert_eq!(registry.lookup(&"alice".into()), Some(new));
        registry.assert_consistent();
    }

    #[test]
    fn test_handle_moved_to_other_user_keeps_mapping_injective() {
        let registry = ConnectionRegistry::new();
        let h = handle();
        registry.register("alice".into(), h.clone());
        registry.register("bob".into(), h.clone());

        assert!(registry.lookup(&"alice".into()).is_none());
        assert_eq!(registry.user_of(h.id()), Some("bob".into()));
        registry.assert_consistent();
    }

    #[test]
    fn test_callbacks_see_previous_handle_and_genuine_removals() {
        let registry = ConnectionRegistry::new();
        let first = handle();
        let second = handle();
        let mut calls = Vec::new();

        registry.register_with("alice".into(), first.clone(), |user, previous, peers| {
            calls.push(("register", user.to_string(), previous.cloned(), peers.count()))
        });
        registry.register_with("alice".into(), second.clone(), |user, previous, peers| {
            calls.push(("register", user.to_string(), previous.cloned(), peers.count()))
        });
        registry.unregister_with(&first, |user, peers| {
            calls.push(("offline", user.to_string(), None, peers.count()))
        });
        registry.unregister_with(&second, |user, peers| {
            calls.push(("offline", user.to_string(), None, peers.count()))
        });

        assert_eq!(
            calls,
            vec![
                ("register", "alice".to_string(), None, 1),
                ("register", "alice".to_string(), Some(first), 1),
                ("offline", "alice".to_string(), None, 0),
            ]
        );
    }

    #[test]
    fn test_peers_list_users_inside_critical_section() {
        let registry = ConnectionRegistry::new();
        registry.register("carol".into(), handle());
        registry.register("alice".into(), handle());

        let mut seen = Vec::new();
        registry.register_with("bob".into(), handle(), |_, _, peers| seen = peers.users());

        assert_eq!(seen, vec![UserId::from("alice"), "bob".into(), "carol".into()]);
    }

    #[test]
    fn test_lookup_matches_model_over_operation_sequence() {
        let registry = ConnectionRegistry::new();
        let users: Vec<UserId> = ["a", "b", "c", "d"].iter().map(|u| UserId::from(*u)).collect();
        let mut issued: Vec<(UserId, ConnectionHandle)> = Vec::new();
        let mut model: HashMap<UserId, ConnectionHandle> = HashMap::new();

        // Small deterministic LCG so the run is reproducible
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) as usize
        };

        for _ in 0..2_000 {
            if issued.is_empty() || next() % 2 == 0 {
                let user = users[next() % users.len()].clone();
                let h = handle();
                registry.register(user.clone(), h.clone());
                model.insert(user.clone(), h.clone());
                issued.push((user, h));
            } else {
                let (user, h) = issued[next() % issued.len()].clone();
                let removed = registry.unregister(&h);
                if model.get(&user) == Some(&h) {
                    assert_eq!(removed, Some(user.clone()));
                    model.remove(&user);
                } else {
                    assert_eq!(removed, None);
                }
            }

            for user in &users {
                assert_eq!(registry.lookup(user), model.get(user).cloned());
            }
        }
        registry.assert_consistent();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_register_unregister_stays_consistent() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut tasks = Vec::new();

        for i in 0..32 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let user = UserId::new(format!("user-{}", i % 8));
                for _ in 0..200 {
                    let h = handle();
                    registry.register(user.clone(), h.clone());
                    tokio::task::yield_now().await;
                    registry.unregister(&h);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        registry.assert_consistent();
        assert!(registry.is_empty());
    }
}
