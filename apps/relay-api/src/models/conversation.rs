use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::conversations;
use crate::models::message::Message;
use crate::models::user::UserId;

/// Running summary of a one-to-one conversation.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = conversations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Conversation {
    pub id: i64,
    pub user1_id: UserId,
    pub user2_id: UserId,
    pub last_message_id: i64,
    pub unread_count: i32,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Whether this conversation is between `a` and `b`, in either order.
    pub fn is_between(&self, a: UserId, b: UserId) -> bool {
        (self.user1_id == a && self.user2_id == b) || (self.user1_id == b && self.user2_id == a)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = conversations)]
pub struct NewConversation {
    pub user1_id: UserId,
    pub user2_id: UserId,
    pub last_message_id: i64,
    pub unread_count: i32,
    pub updated_at: DateTime<Utc>,
}

/// Conversation with its most recent message embedded.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConversationResponse {
    pub id: i64,
    pub user1_id: UserId,
    pub user2_id: UserId,
    pub last_message_id: i64,
    pub unread_count: i32,
    pub updated_at: DateTime<Utc>,
    pub last_message: Option<Message>,
}

impl ConversationResponse {
    pub fn new(c: Conversation, last_message: Option<Message>) -> Self {
        Self {
            id: c.id,
            user1_id: c.user1_id,
            user2_id: c.user2_id,
            last_message_id: c.last_message_id,
            unread_count: c.unread_count,
            updated_at: c.updated_at,
            last_message,
        }
    }
}
