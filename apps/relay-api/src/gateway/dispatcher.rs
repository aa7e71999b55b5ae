//! The hub: a single task that owns the [`Registry`] and serializes every
//! register, unregister and broadcast through one command queue.
//!
//! Because one task applies commands in arrival order, every connection sees
//! broadcasts in the same relative order, and a broadcast issued after a
//! registration returns reaches that connection. Fan-out never blocks: a
//! connection whose outbound queue is full is dropped on the spot.

use std::collections::VecDeque;
use std::str::FromStr;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::models::user::UserId;

use super::connection::{Connection, ConnectionId, Registration};
use super::events::ServerEvent;
use super::presence;
use super::registry::{Audience, Member, Registry};

/// Outbound queue capacity per connection.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Who receives one-to-one events (chat messages and typing indicators).
/// Presence always goes to every connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// Only connections held by the sender or the receiver.
    #[default]
    Routed,
    /// Every registered connection.
    Broadcast,
}

impl DeliveryPolicy {
    fn audience(self, event: &ServerEvent) -> Audience {
        match (self, event.participants()) {
            (DeliveryPolicy::Routed, Some(users)) => Audience::Users(users),
            _ => Audience::Everyone,
        }
    }
}

impl FromStr for DeliveryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "routed" => Ok(Self::Routed),
            "broadcast" => Ok(Self::Broadcast),
            other => Err(format!("expected `routed` or `broadcast`, got `{other}`")),
        }
    }
}

enum Command {
    Register(Member),
    Unregister(ConnectionId),
    Broadcast(ServerEvent),
    Snapshot(oneshot::Sender<Vec<Connection>>),
    IsConnected(UserId, oneshot::Sender<bool>),
    Shutdown,
}

/// Cloneable handle to the hub task. Store in `AppState`.
///
/// Every method only enqueues a command, so none of them wait on slow
/// connections or on each other.
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<Command>,
    queue_capacity: usize,
}

impl HubHandle {
    /// Create a connection for `user_id` and add it to the registry.
    ///
    /// Any broadcast enqueued after this returns is delivered to the new
    /// connection. Its `user_status` online event goes to everyone,
    /// the new connection included.
    pub fn register(&self, user_id: UserId) -> Registration {
        let (outbound, rx) = mpsc::channel(self.queue_capacity);
        let connection = Connection::new(user_id);
        self.send(Command::Register(Member {
            connection: connection.clone(),
            outbound,
        }));
        Registration {
            connection,
            outbound: rx,
        }
    }

    /// Remove a connection. A no-op if it is already gone.
    pub fn unregister(&self, id: &ConnectionId) {
        self.send(Command::Unregister(id.clone()));
    }

    pub fn broadcast(&self, event: ServerEvent) {
        self.send(Command::Broadcast(event));
    }

    /// Registered connections, by connect time, as of every command enqueued
    /// before this call. Empty once the hub has stopped.
    pub async fn connections(&self) -> Vec<Connection> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx));
        rx.await.unwrap_or_default()
    }

    /// Whether `user_id` still holds any registered connection, as of every
    /// command enqueued before this call.
    pub async fn is_connected(&self, user_id: UserId) -> bool {
        let (tx, rx) = oneshot::channel();
        self.send(Command::IsConnected(user_id, tx));
        rx.await.unwrap_or(false)
    }

    /// Stop the hub. Every outbound queue is closed, so each connection
    /// drains what it already has and then closes its socket.
    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("hub is not running, command dropped");
        }
    }
}

pub struct Dispatcher {
    registry: Registry,
    policy: DeliveryPolicy,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl Dispatcher {
    /// Spawn the hub task on the current runtime.
    pub fn spawn(policy: DeliveryPolicy, queue_capacity: usize) -> HubHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher {
            registry: Registry::new(),
            policy,
            commands: rx,
        };
        tokio::spawn(dispatcher.run());
        HubHandle {
            commands: tx,
            queue_capacity: queue_capacity.max(1),
        }
    }

    async fn run(mut self) {
        tracing::info!(policy = ?self.policy, "hub started");

        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Register(member) => self.register(member),
                Command::Unregister(id) => self.unregister(&id),
                Command::Broadcast(event) => self.publish(event),
                Command::Snapshot(reply) => {
                    let _ = reply.send(self.registry.snapshot());
                }
                Command::IsConnected(user_id, reply) => {
                    let _ = reply.send(self.registry.has_user(user_id));
                }
                Command::Shutdown => break,
            }
        }

        let closed = self.registry.clear();
        tracing::info!(closed, "hub stopped");
    }

    fn register(&mut self, member: Member) {
        let user_id = member.connection.user_id;
        let conn_id = member.connection.id.clone();
        if !self.registry.insert(member) {
            tracing::warn!(%conn_id, "duplicate connection id, registration ignored");
            return;
        }
        tracing::info!(
            %conn_id,
            user_id,
            connections = self.registry.len(),
            "connection registered"
        );
        self.publish(presence::online(user_id));
    }

    fn unregister(&mut self, id: &ConnectionId) {
        let Some(member) = self.registry.remove(id) else {
            return;
        };
        let user_id = member.connection.user_id;
        drop(member);
        tracing::info!(
            conn_id = %id,
            user_id,
            connections = self.registry.len(),
            "connection unregistered"
        );
        self.publish(presence::offline(user_id));
    }

    /// Encode once and offer the frame to every target queue.
    ///
    /// Offline events for connections dropped during this fan-out are queued
    /// locally and published after it, before the next command is taken.
    fn publish(&mut self, event: ServerEvent) {
        let mut pending = VecDeque::from([event]);

        while let Some(event) = pending.pop_front() {
            let frame = match event.encode() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!(kind = event.kind(), error = %e, "failed to encode event");
                    continue;
                }
            };

            for id in self.registry.targets(self.policy.audience(&event)) {
                let Some(member) = self.registry.get(&id) else {
                    continue;
                };
                let result = member.outbound.try_send(frame.clone());
                match result {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        if let Some(dropped) = self.registry.remove(&id) {
                            let user_id = dropped.connection.user_id;
                            tracing::warn!(
                                conn_id = %id,
                                user_id,
                                kind = event.kind(),
                                "outbound queue full, dropping connection"
                            );
                            pending.push_back(presence::offline(user_id));
                        }
                    }
                    // The pump is gone; its teardown will unregister.
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!(conn_id = %id, "outbound queue closed, skipping");
                    }
                }
            }
        }
    }
}
