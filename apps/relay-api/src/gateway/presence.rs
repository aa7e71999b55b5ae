//! Shaping of presence and typing events.
//!
//! Presence is per connection: a user with two sockets produces two
//! `user_status` online events and two offline events. Clients that want a
//! per-user view count them.

use crate::models::user::UserId;

use super::events::{ServerEvent, TypingPayload, TypingStatus, UserStatus};

/// Emitted when a connection is registered.
pub fn online(user_id: UserId) -> ServerEvent {
    ServerEvent::PresenceChanged(UserStatus {
        user_id,
        is_online: true,
    })
}

/// Emitted when a connection leaves the registry, whether by teardown or by
/// being dropped for overflow.
pub fn offline(user_id: UserId) -> ServerEvent {
    ServerEvent::PresenceChanged(UserStatus {
        user_id,
        is_online: false,
    })
}

/// Typing indicators are relayed as-is with the authenticated sender attached.
pub fn typing(sender_id: UserId, payload: TypingPayload) -> ServerEvent {
    ServerEvent::TypingStatus(TypingStatus {
        sender_id,
        receiver_id: payload.receiver_id,
        is_typing: payload.is_typing,
    })
}
