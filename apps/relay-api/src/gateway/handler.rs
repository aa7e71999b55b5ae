//! Handling of decoded client events.

use chrono::Utc;

use crate::error::StoreError;
use crate::models::message::{Message, NewMessage};
use crate::models::user::UserId;
use crate::AppState;

use super::events::{ChatMessagePayload, ClientEvent, ServerEvent};
use super::presence;

/// Apply one client event on behalf of `sender_id`, the identity resolved at
/// admission.
pub async fn handle_client_event(state: &AppState, sender_id: UserId, event: ClientEvent) {
    match event {
        ClientEvent::ChatMessage(payload) => {
            let receiver_id = payload.receiver_id;
            if let Err(e) = relay_chat_message(state, sender_id, payload).await {
                tracing::warn!(
                    sender_id,
                    receiver_id,
                    error = %e,
                    "chat message not stored, not relayed"
                );
            }
        }
        ClientEvent::TypingStatus(payload) => {
            state.hub.broadcast(presence::typing(sender_id, payload));
        }
    }
}

/// Stamp, store and relay a chat message.
///
/// Nothing is broadcast unless the message was stored. A failed conversation
/// update is logged and does not hold the message back.
pub async fn relay_chat_message(
    state: &AppState,
    sender_id: UserId,
    payload: ChatMessagePayload,
) -> Result<Message, StoreError> {
    let receiver_id = payload.receiver_id;
    let message = state
        .store
        .persist_message(NewMessage {
            id: state.snowflake.generate(),
            sender_id,
            receiver_id,
            content: payload.content,
            kind: payload.kind,
            created_at: Utc::now(),
        })
        .await?;

    if let Err(e) = state
        .store
        .upsert_conversation(sender_id, receiver_id, message.id)
        .await
    {
        tracing::warn!(sender_id, receiver_id, error = %e, "conversation update failed");
    }

    state.hub.broadcast(ServerEvent::ChatMessage(message.clone()));
    tracing::debug!(message_id = message.id, sender_id, receiver_id, "chat message relayed");
    Ok(message)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Config;
    use crate::db::store::{ChatStore, MemoryStore};
    use crate::gateway::events::TypingPayload;
    use crate::models::user::NewUser;

    /// State over a store holding users 1 and 2.
    async fn state() -> (AppState, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        for name in ["alice", "bob"] {
            store
                .create_user(NewUser {
                    username: name.into(),
                    email: format!("{name}@example.com"),
                    password_hash: "hash".into(),
                })
                .await
                .unwrap();
        }
        (AppState::new(Config::new("handler-test"), store.clone()), store)
    }

    fn payload(receiver_id: UserId, content: &str) -> ChatMessagePayload {
        ChatMessagePayload {
            receiver_id,
            content: content.into(),
            kind: "text".into(),
        }
    }

    #[tokio::test]
    async fn chat_message_is_stored_then_relayed() {
        let (state, store) = state().await;
        let mut receiver = state.hub.register(2);

        let message = relay_chat_message(&state, 1, payload(2, "hello")).await.unwrap();
        state.hub.connections().await;

        assert_eq!(store.message_count(), 1);
        assert_eq!(message.sender_id, 1);
        assert_eq!(message.content, "hello");
        let conversation = store.conversation_between(2, 1).unwrap();
        assert_eq!(conversation.last_message_id, message.id);
        assert_eq!(conversation.unread_count, 1);

        let mut relayed = Vec::new();
        while let Ok(frame) = receiver.outbound.try_recv() {
            relayed.push(serde_json::from_str::<ServerEvent>(frame.as_str()).unwrap());
        }
        assert_eq!(relayed.last(), Some(&ServerEvent::ChatMessage(message)));
    }

    #[tokio::test]
    async fn message_ids_increase() {
        let (state, _store) = state().await;
        let first = relay_chat_message(&state, 1, payload(2, "a")).await.unwrap();
        let second = relay_chat_message(&state, 2, payload(1, "b")).await.unwrap();
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn typing_is_broadcast_and_never_stored() {
        let (state, store) = state().await;
        let mut receiver = state.hub.register(2);

        handle_client_event(
            &state,
            1,
            ClientEvent::TypingStatus(TypingPayload {
                receiver_id: 2,
                is_typing: true,
            }),
        )
        .await;
        state.hub.connections().await;

        let frames: Vec<_> = std::iter::from_fn(|| receiver.outbound.try_recv().ok()).collect();
        assert_eq!(
            serde_json::from_str::<ServerEvent>(frames.last().unwrap().as_str()).unwrap(),
            presence::typing(
                1,
                TypingPayload {
                    receiver_id: 2,
                    is_typing: true,
                }
            )
        );
        assert_eq!(store.message_count(), 0);
        assert!(store.conversation_between(1, 2).is_none());
    }

    #[tokio::test]
    async fn message_to_unknown_user_is_not_relayed() {
        let (state, store) = state().await;
        let mut sender = state.hub.register(1);

        let err = relay_chat_message(&state, 1, payload(42, "hello?")).await.unwrap_err();
        state.hub.connections().await;

        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(store.message_count(), 0);
        let frames: Vec<_> = std::iter::from_fn(|| sender.outbound.try_recv().ok()).collect();
        assert!(frames
            .iter()
            .all(|f| !matches!(serde_json::from_str::<ServerEvent>(f.as_str()), Ok(ServerEvent::ChatMessage(_)))));
    }
}
