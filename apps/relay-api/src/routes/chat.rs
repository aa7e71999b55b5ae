//! Chat history, conversation summaries and the HTTP send path.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::gateway::events::ChatMessagePayload;
use crate::gateway::handler::relay_chat_message;
use crate::models::conversation::ConversationResponse;
use crate::models::message::Message;
use crate::models::user::UserId;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat/history/{receiver_id}", get(history))
        .route("/chat/conversations", get(conversations))
        .route("/chat/message", post(send_message))
}

/// Messages between the caller and `receiver_id`, oldest first. Everything
/// the other side sent is marked read.
#[utoipa::path(
    get,
    path = "/chat/history/{receiver_id}",
    tag = "Chat",
    security(("bearer" = [])),
    params(("receiver_id" = i64, Path, description = "The other participant")),
    responses(
        (status = 200, description = "Conversation history", body = Vec<Message>),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn history(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(receiver_id): Path<UserId>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let messages = state.store.history(auth.user_id, receiver_id).await?;
    state
        .store
        .mark_read(auth.user_id, receiver_id, Utc::now())
        .await?;
    Ok(Json(messages))
}

#[utoipa::path(
    get,
    path = "/chat/conversations",
    tag = "Chat",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Caller's conversations, most recent first", body = Vec<ConversationResponse>),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn conversations(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<ConversationResponse>>, ApiError> {
    Ok(Json(state.store.conversations(auth.user_id).await?))
}

/// Same path as a `chat_message` frame: stored first, then relayed.
#[utoipa::path(
    post,
    path = "/chat/message",
    tag = "Chat",
    security(("bearer" = [])),
    request_body = ChatMessagePayload,
    responses(
        (status = 201, description = "Message stored and relayed", body = Message),
        (status = 400, description = "Validation failed", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Receiver not found", body = ApiErrorBody),
    ),
)]
pub async fn send_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<ChatMessagePayload>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    if let Err(reason) = body.validate() {
        return Err(ApiError::validation(vec![FieldError {
            field: "payload".into(),
            message: reason.into(),
        }]));
    }

    let message = relay_chat_message(&state, auth.user_id, body).await?;
    Ok((StatusCode::CREATED, Json(message)))
}
