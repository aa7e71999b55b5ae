//! Registry of live connections, owned by the dispatcher task.
//!
//! Not shared: only the dispatcher reads or writes it, so registration,
//! removal and fan-out are serialized by construction.

use std::collections::HashMap;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc;

use crate::models::user::UserId;

use super::connection::{Connection, ConnectionId};

/// A registered connection and the sending half of its outbound queue.
///
/// Dropping the entry drops the sender, which closes the queue and ends the
/// connection's outbound pump once it has drained.
pub struct Member {
    pub connection: Connection,
    pub outbound: mpsc::Sender<Utf8Bytes>,
}

/// Which registered connections an event goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Everyone,
    /// Every connection held by either user.
    Users([UserId; 2]),
}

#[derive(Default)]
pub struct Registry {
    members: HashMap<ConnectionId, Member>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the id was already present; the entry is left as is.
    pub fn insert(&mut self, member: Member) -> bool {
        let id = member.connection.id.clone();
        if self.members.contains_key(&id) {
            return false;
        }
        self.members.insert(id, member);
        true
    }

    pub fn remove(&mut self, id: &ConnectionId) -> Option<Member> {
        self.members.remove(id)
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&Member> {
        self.members.get(id)
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.members.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn has_user(&self, user_id: UserId) -> bool {
        self.members.values().any(|m| m.connection.user_id == user_id)
    }

    /// Ids of the connections in `audience`, collected so callers can remove
    /// entries while walking the result.
    pub fn targets(&self, audience: Audience) -> Vec<ConnectionId> {
        self.members
            .iter()
            .filter(|(_, m)| match audience {
                Audience::Everyone => true,
                Audience::Users(users) => users.contains(&m.connection.user_id),
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Registered connections, by connect time.
    pub fn snapshot(&self) -> Vec<Connection> {
        let mut all: Vec<Connection> = self.members.values().map(|m| m.connection.clone()).collect();
        all.sort_by(|a, b| a.connected_at.cmp(&b.connected_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Remove every entry, closing all outbound queues.
    pub fn clear(&mut self) -> usize {
        let n = self.members.len();
        self.members.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(user_id: UserId) -> (Member, mpsc::Receiver<Utf8Bytes>) {
        let (outbound, rx) = mpsc::channel(4);
        (
            Member {
                connection: Connection::new(user_id),
                outbound,
            },
            rx,
        )
    }

    #[test]
    fn insert_and_remove() {
        let mut registry = Registry::new();
        let (m, _rx) = member(1);
        let id = m.connection.id.clone();

        assert!(registry.insert(m));
        assert!(registry.contains(&id));
        assert_eq!(registry.len(), 1);

        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut registry = Registry::new();
        let (a, _rx_a) = member(1);
        let (mut b, _rx_b) = member(2);
        b.connection.id = a.connection.id.clone();

        assert!(registry.insert(a));
        assert!(!registry.insert(b));
        assert_eq!(registry.snapshot()[0].user_id, 1);
    }

    #[test]
    fn targets_filter_by_user() {
        let mut registry = Registry::new();
        let mut rxs = Vec::new();
        for user in [1, 1, 2, 3] {
            let (m, rx) = member(user);
            registry.insert(m);
            rxs.push(rx);
        }

        assert_eq!(registry.targets(Audience::Everyone).len(), 4);
        assert!(registry.has_user(3));
        assert!(!registry.has_user(4));
        let routed = registry.targets(Audience::Users([1, 2]));
        assert_eq!(routed.len(), 3);
        assert!(routed
            .iter()
            .all(|id| registry.get(id).unwrap().connection.user_id != 3));
    }

    #[tokio::test]
    async fn removal_closes_the_queue() {
        let mut registry = Registry::new();
        let (m, mut rx) = member(1);
        let id = m.connection.id.clone();
        registry.insert(m);
        registry
            .get(&id)
            .unwrap()
            .outbound
            .try_send(Utf8Bytes::from_static("x"))
            .unwrap();

        drop(registry.remove(&id));
        assert_eq!(rx.recv().await.unwrap().as_str(), "x");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn clear_closes_everything() {
        let mut registry = Registry::new();
        let (a, mut rx_a) = member(1);
        let (b, mut rx_b) = member(2);
        registry.insert(a);
        registry.insert(b);

        assert_eq!(registry.clear(), 2);
        assert!(rx_a.recv().await.is_none());
        assert!(rx_b.recv().await.is_none());
    }
}
