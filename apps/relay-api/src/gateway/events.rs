//! Wire envelope and typed relay events.
//!
//! Every frame in either direction is a JSON object `{"type": ..., "payload": ...}`.
//! Inbound frames are decoded in one pass: the envelope is parsed with the
//! payload left as raw JSON, then the tag picks the concrete payload type.

use axum::extract::ws::Utf8Bytes;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use utoipa::ToSchema;

use crate::error::DecodeError;
use crate::models::message::{Message, DEFAULT_MESSAGE_KIND};
use crate::models::user::UserId;

// ---------------------------------------------------------------------------
// Event type tags
// ---------------------------------------------------------------------------

pub const CHAT_MESSAGE: &str = "chat_message";
pub const TYPING_STATUS: &str = "typing_status";
pub const USER_STATUS: &str = "user_status";

/// Longest accepted chat message body, in characters.
pub const MAX_CONTENT_CHARS: usize = 4000;

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope<'a> {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, borrow)]
    payload: Option<&'a RawValue>,
}

/// A decoded client frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    ChatMessage(ChatMessagePayload),
    TypingStatus(TypingPayload),
}

#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
pub struct ChatMessagePayload {
    pub receiver_id: UserId,
    pub content: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
}

fn default_kind() -> String {
    DEFAULT_MESSAGE_KIND.to_string()
}

impl ChatMessagePayload {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.receiver_id <= 0 {
            return Err("receiver_id must be a positive user id");
        }
        if self.content.trim().is_empty() {
            return Err("content is required");
        }
        if self.content.chars().count() > MAX_CONTENT_CHARS {
            return Err("content must be 4000 characters or fewer");
        }
        if self.kind.trim().is_empty() {
            return Err("type must not be empty");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TypingPayload {
    pub receiver_id: UserId,
    pub is_typing: bool,
}

/// Decode one inbound text frame.
pub fn decode_client_event(text: &str) -> Result<ClientEvent, DecodeError> {
    let envelope: Envelope<'_> = serde_json::from_str(text).map_err(DecodeError::Envelope)?;

    match envelope.kind.as_str() {
        CHAT_MESSAGE => {
            let payload: ChatMessagePayload = decode_payload(CHAT_MESSAGE, envelope.payload)?;
            payload.validate().map_err(|reason| DecodeError::Invalid {
                kind: CHAT_MESSAGE,
                reason,
            })?;
            Ok(ClientEvent::ChatMessage(payload))
        }
        TYPING_STATUS => Ok(ClientEvent::TypingStatus(decode_payload(
            TYPING_STATUS,
            envelope.payload,
        )?)),
        _ => Err(DecodeError::UnknownType(envelope.kind)),
    }
}

fn decode_payload<T: for<'de> Deserialize<'de>>(
    kind: &'static str,
    raw: Option<&RawValue>,
) -> Result<T, DecodeError> {
    let raw = raw.ok_or(DecodeError::MissingPayload(kind))?;
    serde_json::from_str(raw.get()).map_err(|source| DecodeError::Payload { kind, source })
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// An event fanned out by the hub. Carries everything needed to encode it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerEvent {
    #[serde(rename = "chat_message")]
    ChatMessage(Message),
    #[serde(rename = "typing_status")]
    TypingStatus(TypingStatus),
    #[serde(rename = "user_status")]
    PresenceChanged(UserStatus),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingStatus {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStatus {
    pub user_id: UserId,
    pub is_online: bool,
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::ChatMessage(_) => CHAT_MESSAGE,
            ServerEvent::TypingStatus(_) => TYPING_STATUS,
            ServerEvent::PresenceChanged(_) => USER_STATUS,
        }
    }

    /// The two users a one-to-one event concerns. `None` for public events.
    pub fn participants(&self) -> Option<[UserId; 2]> {
        match self {
            ServerEvent::ChatMessage(m) => Some([m.sender_id, m.receiver_id]),
            ServerEvent::TypingStatus(t) => Some([t.sender_id, t.receiver_id]),
            ServerEvent::PresenceChanged(_) => None,
        }
    }

    /// Encode once; the result is shared by every recipient queue.
    pub fn encode(&self) -> Result<Utf8Bytes, serde_json::Error> {
        serde_json::to_string(self).map(Utf8Bytes::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn decodes_chat_message() {
        let event = decode_client_event(
            r#"{"type":"chat_message","payload":{"receiver_id":2,"content":"hi","type":"text"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::ChatMessage(ChatMessagePayload {
                receiver_id: 2,
                content: "hi".into(),
                kind: "text".into(),
            })
        );
    }

    #[test]
    fn chat_message_kind_defaults_to_text() {
        let event =
            decode_client_event(r#"{"type":"chat_message","payload":{"receiver_id":2,"content":"x"}}"#)
                .unwrap();
        let ClientEvent::ChatMessage(p) = event else {
            panic!("expected chat message");
        };
        assert_eq!(p.kind, "text");
    }

    #[test]
    fn client_supplied_sender_is_ignored() {
        let event = decode_client_event(
            r#"{"type":"chat_message","payload":{"sender_id":99,"receiver_id":2,"content":"x"}}"#,
        )
        .unwrap();
        assert!(matches!(event, ClientEvent::ChatMessage(p) if p.receiver_id == 2));
    }

    #[test]
    fn decodes_typing_status() {
        let event = decode_client_event(
            r#"{"type":"typing_status","payload":{"receiver_id":5,"is_typing":true}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::TypingStatus(TypingPayload {
                receiver_id: 5,
                is_typing: true,
            })
        );
    }

    #[test]
    fn unknown_type_is_reported_by_name() {
        let err = decode_client_event(r#"{"type":"reaction","payload":{}}"#).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownType(t) if t == "reaction"));
    }

    #[test]
    fn malformed_frames_are_decode_errors() {
        assert!(matches!(
            decode_client_event("not json"),
            Err(DecodeError::Envelope(_))
        ));
        assert!(matches!(
            decode_client_event(r#"{"type":"chat_message"}"#),
            Err(DecodeError::MissingPayload(CHAT_MESSAGE))
        ));
        assert!(matches!(
            decode_client_event(r#"{"type":"typing_status","payload":{"receiver_id":"x"}}"#),
            Err(DecodeError::Payload { kind: TYPING_STATUS, .. })
        ));
        assert!(matches!(
            decode_client_event(r#"{"type":"chat_message","payload":{"receiver_id":2,"content":"  "}}"#),
            Err(DecodeError::Invalid { kind: CHAT_MESSAGE, .. })
        ));
    }

    #[test]
    fn overlong_content_is_invalid() {
        let payload = ChatMessagePayload {
            receiver_id: 1,
            content: "a".repeat(MAX_CONTENT_CHARS + 1),
            kind: "text".into(),
        };
        assert!(payload.validate().is_err());
    }

    #[test]
    fn server_events_use_the_envelope() {
        let status = ServerEvent::PresenceChanged(UserStatus {
            user_id: 3,
            is_online: true,
        });
        let value: serde_json::Value = serde_json::from_str(status.encode().unwrap().as_str()).unwrap();
        assert_eq!(
            value,
            json!({"type": "user_status", "payload": {"user_id": 3, "is_online": true}})
        );

        let message = ServerEvent::ChatMessage(Message {
            id: 10,
            sender_id: 1,
            receiver_id: 2,
            content: "hi".into(),
            kind: "text".into(),
            created_at: Utc::now(),
            read_at: None,
        });
        let value: serde_json::Value = serde_json::from_str(message.encode().unwrap().as_str()).unwrap();
        assert_eq!(value["type"], "chat_message");
        assert_eq!(value["payload"]["id"], 10);
        assert_eq!(value["payload"]["sender_id"], 1);
        assert_eq!(value["payload"]["type"], "text");
        assert!(value["payload"]["timestamp"].is_string());
        assert_eq!(message.participants(), Some([1, 2]));
        assert_eq!(status.participants(), None);
    }
}
