//! Per-connection identity.

use std::fmt;

use axum::extract::ws::Utf8Bytes;
use chrono::{DateTime, Utc};
use relay_common::id::{prefix, PrefixedId};
use tokio::sync::mpsc;

use crate::models::user::UserId;

/// Opaque connection identifier (`conn_` prefixed ULID). Unique per accepted
/// socket, so one user may hold several at once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl PrefixedId for ConnectionId {
    const PREFIX: &'static str = prefix::CONNECTION;
}

impl ConnectionId {
    pub fn new() -> Self {
        Self(<Self as PrefixedId>::generate())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered connection as the hub sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub id: ConnectionId,
    pub user_id: UserId,
    pub connected_at: DateTime<Utc>,
}

impl Connection {
    pub fn new(user_id: UserId) -> Self {
        Self {
            id: ConnectionId::new(),
            user_id,
            connected_at: Utc::now(),
        }
    }
}

/// Returned by [`HubHandle::register`](super::dispatcher::HubHandle::register).
///
/// `outbound` yields encoded frames in dispatch order and closes once the
/// hub removes the connection.
pub struct Registration {
    pub connection: Connection,
    pub outbound: mpsc::Receiver<Utf8Bytes>,
}
