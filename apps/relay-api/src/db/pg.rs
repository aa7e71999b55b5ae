//! PostgreSQL-backed [`ChatStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::{AsyncConnection, RunQueryDsl};
use scoped_futures::ScopedFutureExt;

use crate::db::pool::DbPool;
use crate::db::schema::{conversations, messages, users};
use crate::db::store::ChatStore;
use crate::error::StoreError;
use crate::models::conversation::{Conversation, ConversationResponse, NewConversation};
use crate::models::message::{Message, NewMessage};
use crate::models::user::{NewUser, User, UserChanges, UserId};

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Map a unique violation on `users` to a conflict naming the column.
fn user_conflict(err: DieselError) -> StoreError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info) => {
            let constraint = info.constraint_name().unwrap_or("");
            if constraint.contains("username") {
                StoreError::Conflict("Username is already taken")
            } else if constraint.contains("email") {
                StoreError::Conflict("Email is already registered")
            } else {
                StoreError::Conflict("A user with that information already exists")
            }
        }
        other => StoreError::from(other),
    }
}

/// Map a foreign key violation on `messages` to a missing participant.
fn missing_participant(err: DieselError) -> StoreError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
            StoreError::NotFound("User not found")
        }
        other => StoreError::from(other),
    }
}

/// Filter matching the conversation between `a` and `b` in either order.
macro_rules! between {
    ($a:expr, $b:expr) => {
        conversations::user1_id
            .eq($a)
            .and(conversations::user2_id.eq($b))
            .or(conversations::user1_id.eq($b).and(conversations::user2_id.eq($a)))
    };
}

#[async_trait]
impl ChatStore for PgStore {
    async fn persist_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        let mut conn = self.pool.get().await?;
        diesel::insert_into(messages::table)
            .values(&message)
            .returning(Message::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(missing_participant)
    }

    async fn upsert_conversation(
        &self,
        a: UserId,
        b: UserId,
        last_message_id: i64,
    ) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now();

        conn.transaction::<_, DieselError, _>(|conn| {
            async move {
                let updated = diesel::update(conversations::table.filter(between!(a, b)))
                    .set((
                        conversations::last_message_id.eq(last_message_id),
                        conversations::unread_count.eq(conversations::unread_count + 1),
                        conversations::updated_at.eq(now),
                    ))
                    .execute(conn)
                    .await?;

                if updated == 0 {
                    // The pair index turns a concurrent first message into a
                    // no-op insert; the loser's bump is folded in below.
                    let inserted = diesel::insert_into(conversations::table)
                        .values(NewConversation {
                            user1_id: a,
                            user2_id: b,
                            last_message_id,
                            unread_count: 1,
                            updated_at: now,
                        })
                        .on_conflict_do_nothing()
                        .execute(conn)
                        .await?;

                    if inserted == 0 {
                        diesel::update(conversations::table.filter(between!(a, b)))
                            .set((
                                conversations::last_message_id.eq(last_message_id),
                                conversations::unread_count.eq(conversations::unread_count + 1),
                                conversations::updated_at.eq(now),
                            ))
                            .execute(conn)
                            .await?;
                    }
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await?;

        Ok(())
    }

    async fn set_presence(
        &self,
        user_id: UserId,
        is_online: bool,
        last_seen: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        diesel::update(users::table.find(user_id))
            .set((users::is_online.eq(is_online), users::last_seen.eq(last_seen)))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut conn = self.pool.get().await?;
        diesel::insert_into(users::table)
            .values(&user)
            .returning(User::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(user_conflict)
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let mut conn = self.pool.get().await?;
        let user = users::table
            .find(id)
            .select(User::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let mut conn = self.pool.get().await?;
        let user = users::table
            .filter(users::email.eq(email))
            .select(User::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let mut conn = self.pool.get().await?;
        let all = users::table
            .order(users::id.asc())
            .select(User::as_select())
            .load(&mut conn)
            .await?;
        Ok(all)
    }

    async fn update_user(
        &self,
        id: UserId,
        changes: UserChanges,
    ) -> Result<Option<User>, StoreError> {
        if changes.is_empty() {
            return self.find_user(id).await;
        }
        let mut conn = self.pool.get().await?;
        diesel::update(users::table.find(id))
            .set((&changes, users::updated_at.eq(Utc::now())))
            .returning(User::as_returning())
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(user_conflict)
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, StoreError> {
        let mut conn = self.pool.get().await?;
        let deleted = diesel::delete(users::table.find(id))
            .execute(&mut conn)
            .await?;
        Ok(deleted > 0)
    }

    async fn history(&self, a: UserId, b: UserId) -> Result<Vec<Message>, StoreError> {
        let mut conn = self.pool.get().await?;
        let rows = messages::table
            .filter(
                messages::sender_id
                    .eq(a)
                    .and(messages::receiver_id.eq(b))
                    .or(messages::sender_id.eq(b).and(messages::receiver_id.eq(a))),
            )
            .order(messages::id.asc())
            .select(Message::as_select())
            .load(&mut conn)
            .await?;
        Ok(rows)
    }

    async fn mark_read(
        &self,
        reader: UserId,
        other: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, DieselError, _>(|conn| {
            async move {
                diesel::update(
                    messages::table
                        .filter(messages::sender_id.eq(other))
                        .filter(messages::receiver_id.eq(reader))
                        .filter(messages::read_at.is_null()),
                )
                .set(messages::read_at.eq(Some(at)))
                .execute(conn)
                .await?;

                diesel::update(conversations::table.filter(between!(reader, other)))
                    .set(conversations::unread_count.eq(0))
                    .execute(conn)
                    .await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await?;

        Ok(())
    }

    async fn conversations(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ConversationResponse>, StoreError> {
        let mut conn = self.pool.get().await?;

        let rows: Vec<(Conversation, Option<Message>)> = conversations::table
            .left_join(messages::table)
            .filter(
                conversations::user1_id
                    .eq(user_id)
                    .or(conversations::user2_id.eq(user_id)),
            )
            .order(conversations::updated_at.desc())
            .select((Conversation::as_select(), Option::<Message>::as_select()))
            .load(&mut conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(c, last)| ConversationResponse::new(c, last))
            .collect())
    }
}
