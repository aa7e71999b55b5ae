#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use relay_api::config::Config;
use relay_api::db::store::{ChatStore, MemoryStore};
use relay_api::error::StoreError;
use relay_api::models::conversation::ConversationResponse;
use relay_api::models::message::{Message as ChatMessage, NewMessage};
use relay_api::models::user::{NewUser, User, UserChanges, UserId};
use relay_api::AppState;

pub const TEST_SECRET: &str = "relay-test-secret";

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Build a test AppState on a fresh in-memory store.
pub fn test_state() -> (AppState, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(Config::new(TEST_SECRET), store.clone());
    (state, store)
}

/// Build the full application router wired to the test state.
pub fn test_app() -> (Router, AppState, Arc<MemoryStore>) {
    let (state, store) = test_state();
    let app = relay_api::routes::router().with_state(state.clone());
    (app, state, store)
}

pub fn token_for(state: &AppState, user_id: UserId) -> String {
    state.auth.issue_token(user_id).expect("issue token")
}

/// Insert a user directly and return its id.
pub async fn seed_user(store: &dyn ChatStore, username: &str) -> UserId {
    store
        .create_user(NewUser {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password_hash: "unused".to_string(),
        })
        .await
        .expect("seed user")
        .id
}

/// Seed `n` users. On a fresh `MemoryStore` they get ids `1..=n`.
pub async fn seed_users(store: &dyn ChatStore, n: usize) -> Vec<UserId> {
    let mut ids = Vec::with_capacity(n);
    for i in 1..=n {
        ids.push(seed_user(store, &format!("user{i}")).await);
    }
    ids
}

/// Poll the stored presence of `user_id` until it equals `is_online`.
/// Returns whether it got there within a second.
pub async fn wait_for_presence(store: &dyn ChatStore, user_id: UserId, is_online: bool) -> bool {
    for _ in 0..50 {
        let user = store.find_user(user_id).await.unwrap().expect("user exists");
        if user.is_online == is_online {
            return true;
        }
        time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Start an actual TCP server for WebSocket testing. The server runs in the
/// background for the rest of the test.
pub async fn start_ws_server(state: AppState) -> SocketAddr {
    let app = relay_api::routes::router().with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

/// Connect and wait until the hub has announced this connection, so the
/// caller knows it is registered.
pub async fn connect(addr: SocketAddr, token: &str, user_id: UserId) -> WsClient {
    let url = format!("ws://{addr}/ws?token={token}");
    let (mut ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");

    loop {
        let event = next_event(&mut ws).await;
        if event["type"] == "user_status"
            && event["payload"]["user_id"] == user_id
            && event["payload"]["is_online"] == true
        {
            return ws;
        }
    }
}

pub async fn send_json(ws: &mut WsClient, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("ws send");
}

/// Next text frame as JSON, skipping control frames.
pub async fn next_event(ws: &mut WsClient) -> serde_json::Value {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for event")
            .expect("stream ended")
            .expect("ws read error");

        match msg {
            Message::Text(text) => return serde_json::from_str(&text).expect("parse event"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Next event of type `kind`, skipping any others (mostly presence).
pub async fn next_event_of(ws: &mut WsClient, kind: &str) -> serde_json::Value {
    loop {
        let event = next_event(ws).await;
        if event["type"] == kind {
            return event;
        }
    }
}

/// Next event that is not presence.
pub async fn next_non_presence(ws: &mut WsClient) -> serde_json::Value {
    loop {
        let event = next_event(ws).await;
        if event["type"] != "user_status" {
            return event;
        }
    }
}

/// A `MemoryStore` with injected faults. Everything not overridden is
/// delegated.
pub struct FaultyStore {
    pub inner: MemoryStore,
    fail_writes: bool,
    upsert_delay: Duration,
}

impl FaultyStore {
    /// Every `persist_message` fails.
    pub fn failing_writes() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_writes: true,
            upsert_delay: Duration::ZERO,
        }
    }

    /// `upsert_conversation` sleeps for `delay` before applying.
    pub fn slow_upserts(delay: Duration) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_writes: false,
            upsert_delay: delay,
        }
    }
}

#[async_trait]
impl ChatStore for FaultyStore {
    async fn persist_message(&self, message: NewMessage) -> Result<ChatMessage, StoreError> {
        if self.fail_writes {
            return Err(StoreError::Unavailable("writes disabled".into()));
        }
        self.inner.persist_message(message).await
    }

    async fn upsert_conversation(
        &self,
        a: UserId,
        b: UserId,
        last_message_id: i64,
    ) -> Result<(), StoreError> {
        time::sleep(self.upsert_delay).await;
        self.inner.upsert_conversation(a, b, last_message_id).await
    }
    async fn set_presence(
        &self,
        user_id: UserId,
        is_online: bool,
        last_seen: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner.set_presence(user_id, is_online, last_seen).await
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        self.inner.create_user(user).await
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        self.inner.find_user(id).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.inner.find_user_by_email(email).await
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        self.inner.list_users().await
    }

    async fn update_user(
        &self,
        id: UserId,
        changes: UserChanges,
    ) -> Result<Option<User>, StoreError> {
        self.inner.update_user(id, changes).await
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, StoreError> {
        self.inner.delete_user(id).await
    }

    async fn history(&self, a: UserId, b: UserId) -> Result<Vec<ChatMessage>, StoreError> {
        self.inner.history(a, b).await
    }

    async fn mark_read(
        &self,
        reader: UserId,
        other: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner.mark_read(reader, other, at).await
    }

    async fn conversations(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ConversationResponse>, StoreError> {
        self.inner.conversations(user_id).await
    }
}
