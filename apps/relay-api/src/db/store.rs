use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::StoreError;
use crate::models::conversation::{Conversation, ConversationResponse};
use crate::models::message::{Message, NewMessage};
use crate::models::user::{NewUser, User, UserChanges, UserId};

/// Persistence used by the relay.
///
/// The hub itself only needs the first three operations; the rest back the
/// HTTP routes. Backed by PostgreSQL in production and an in-memory map in
/// tests and database-less local runs.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Store a stamped chat message and return the stored row.
    ///
    /// Fails with [`StoreError::NotFound`] if either participant does not
    /// exist.
    async fn persist_message(&self, message: NewMessage) -> Result<Message, StoreError>;

    /// Point the conversation between `a` and `b` at `last_message_id` and
    /// bump its unread counter, creating it if absent.
    async fn upsert_conversation(
        &self,
        a: UserId,
        b: UserId,
        last_message_id: i64,
    ) -> Result<(), StoreError>;

    async fn set_presence(
        &self,
        user_id: UserId,
        is_online: bool,
        last_seen: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Fails with [`StoreError::Conflict`] on a duplicate username or email.
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;

    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    /// Returns `None` when the user does not exist.
    async fn update_user(&self, id: UserId, changes: UserChanges)
        -> Result<Option<User>, StoreError>;

    /// Returns whether a user was deleted.
    async fn delete_user(&self, id: UserId) -> Result<bool, StoreError>;

    /// All messages exchanged between `a` and `b`, oldest first.
    async fn history(&self, a: UserId, b: UserId) -> Result<Vec<Message>, StoreError>;

    /// Mark everything `other` sent to `reader` as read and reset the
    /// conversation's unread counter.
    async fn mark_read(
        &self,
        reader: UserId,
        other: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn conversations(&self, user_id: UserId)
        -> Result<Vec<ConversationResponse>, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    next_user_id: UserId,
    messages: BTreeMap<i64, Message>,
    conversations: Vec<Conversation>,
    next_conversation_id: i64,
}

pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables {
                next_user_id: 1,
                next_conversation_id: 1,
                ..Tables::default()
            }),
        }
    }

    /// Snapshot of the conversation between `a` and `b`, if any.
    pub fn conversation_between(&self, a: UserId, b: UserId) -> Option<Conversation> {
        self.tables
            .lock()
            .conversations
            .iter()
            .find(|c| c.is_between(a, b))
            .cloned()
    }

    pub fn message_count(&self) -> usize {
        self.tables.lock().messages.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn persist_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        let mut t = self.tables.lock();
        if t.messages.contains_key(&message.id) {
            return Err(StoreError::Conflict("Message id already exists"));
        }
        if !t.users.contains_key(&message.sender_id) || !t.users.contains_key(&message.receiver_id) {
            return Err(StoreError::NotFound("User not found"));
        }
        let stored = message.into_message();
        t.messages.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn upsert_conversation(
        &self,
        a: UserId,
        b: UserId,
        last_message_id: i64,
    ) -> Result<(), StoreError> {
        let mut t = self.tables.lock();
        let now = Utc::now();
        if let Some(c) = t.conversations.iter_mut().find(|c| c.is_between(a, b)) {
            c.last_message_id = last_message_id;
            c.unread_count += 1;
            c.updated_at = now;
            return Ok(());
        }
        let id = t.next_conversation_id;
        t.next_conversation_id += 1;
        t.conversations.push(Conversation {
            id,
            user1_id: a,
            user2_id: b,
            last_message_id,
            unread_count: 1,
            updated_at: now,
        });
        Ok(())
    }

    async fn set_presence(
        &self,
        user_id: UserId,
        is_online: bool,
        last_seen: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(user) = self.tables.lock().users.get_mut(&user_id) {
            user.is_online = is_online;
            user.last_seen = last_seen;
        }
        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut t = self.tables.lock();
        if t.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict("Username is already taken"));
        }
        if t.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("Email is already registered"));
        }
        let id = t.next_user_id;
        t.next_user_id += 1;
        let now = Utc::now();
        let created = User {
            id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            profile_image: None,
            is_online: false,
            last_seen: now,
            created_at: now,
            updated_at: now,
        };
        t.users.insert(id, created.clone());
        Ok(created)
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.tables.lock().users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .tables
            .lock()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.tables.lock().users.values().cloned().collect())
    }

    async fn update_user(
        &self,
        id: UserId,
        changes: UserChanges,
    ) -> Result<Option<User>, StoreError> {
        let mut t = self.tables.lock();
        if let Some(ref name) = changes.username {
            if t.users.values().any(|u| u.id != id && &u.username == name) {
                return Err(StoreError::Conflict("Username is already taken"));
            }
        }
        if let Some(ref email) = changes.email {
            if t.users.values().any(|u| u.id != id && &u.email == email) {
                return Err(StoreError::Conflict("Email is already registered"));
            }
        }
        let Some(user) = t.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(username) = changes.username {
            user.username = username;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(image) = changes.profile_image {
            user.profile_image = Some(image);
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, StoreError> {
        let mut t = self.tables.lock();
        if t.users.remove(&id).is_none() {
            return Ok(false);
        }
        t.messages
            .retain(|_, m| m.sender_id != id && m.receiver_id != id);
        t.conversations
            .retain(|c| c.user1_id != id && c.user2_id != id);
        Ok(true)
    }

    async fn history(&self, a: UserId, b: UserId) -> Result<Vec<Message>, StoreError> {
        // BTreeMap iteration is id order, which is creation order.
        Ok(self
            .tables
            .lock()
            .messages
            .values()
            .filter(|m| {
                (m.sender_id == a && m.receiver_id == b) || (m.sender_id == b && m.receiver_id == a)
            })
            .cloned()
            .collect())
    }

    async fn mark_read(
        &self,
        reader: UserId,
        other: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut t = self.tables.lock();
        for m in t.messages.values_mut() {
            if m.sender_id == other && m.receiver_id == reader && m.read_at.is_none() {
                m.read_at = Some(at);
            }
        }
        if let Some(c) = t
            .conversations
            .iter_mut()
            .find(|c| c.is_between(reader, other))
        {
            c.unread_count = 0;
        }
        Ok(())
    }

    async fn conversations(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ConversationResponse>, StoreError> {
        let t = self.tables.lock();
        let mut mine: Vec<&Conversation> = t
            .conversations
            .iter()
            .filter(|c| c.user1_id == user_id || c.user2_id == user_id)
            .collect();
        mine.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(mine
            .into_iter()
            .map(|c| ConversationResponse::new(c.clone(), t.messages.get(&c.last_message_id).cloned()))
            .collect())
    }
}
