use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::schema::messages;
use crate::models::user::UserId;

/// Kind used when a client does not say what it is sending.
pub const DEFAULT_MESSAGE_KIND: &str = "text";

/// A persisted one-to-one chat message.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize, ToSchema)]
#[diesel(table_name = messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Message {
    pub id: i64,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    /// text, image, file, ...
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

/// A message that has been stamped by the server but not yet stored.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessage {
    pub id: i64,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

impl NewMessage {
    /// The row as it looks right after insertion.
    pub fn into_message(self) -> Message {
        Message {
            id: self.id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            content: self.content,
            kind: self.kind,
            created_at: self.created_at,
            read_at: None,
        }
    }
}
