use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::models::user::{UserChanges, UserId, UserResponse};
use crate::AppState;

use super::auth::{validate_email, validate_username};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route(
            "/users/{user_id}",
            get(get_user).put(update_user).delete(delete_user),
        )
}

#[utoipa::path(
    get,
    path = "/users",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "All users", body = Vec<UserResponse>),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_users(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = state.store.list_users().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/users/{user_id}",
    tag = "Users",
    security(("bearer" = [])),
    params(("user_id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User found", body = UserResponse),
        (status = 404, description = "User not found", body = ApiErrorBody),
    ),
)]
pub async fn get_user(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(user_id): Path<UserId>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .store
        .find_user(user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(UserResponse::from(user)))
}

/// Users may only edit themselves.
#[utoipa::path(
    put,
    path = "/users/{user_id}",
    tag = "Users",
    security(("bearer" = [])),
    params(("user_id" = i64, Path, description = "User ID")),
    request_body = UserChanges,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 400, description = "Validation failed", body = ApiErrorBody),
        (status = 403, description = "Not your account", body = ApiErrorBody),
        (status = 404, description = "User not found", body = ApiErrorBody),
        (status = 409, description = "Username or email taken", body = ApiErrorBody),
    ),
)]
pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<UserId>,
    Json(mut changes): Json<UserChanges>,
) -> Result<Json<UserResponse>, ApiError> {
    if auth.user_id != user_id {
        return Err(ApiError::forbidden("You can only update your own account"));
    }

    let mut errors: Vec<FieldError> = Vec::new();
    if let Some(username) = changes.username.as_mut() {
        *username = username.trim().to_string();
        validate_username(username, &mut errors);
    }
    if let Some(email) = changes.email.as_mut() {
        *email = email.trim().to_lowercase();
        validate_email(email, &mut errors);
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let user = state
        .store
        .update_user(user_id, changes)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    tracing::info!(user_id, "user updated");
    Ok(Json(UserResponse::from(user)))
}

#[utoipa::path(
    delete,
    path = "/users/{user_id}",
    tag = "Users",
    security(("bearer" = [])),
    params(("user_id" = i64, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 403, description = "Not your account", body = ApiErrorBody),
        (status = 404, description = "User not found", body = ApiErrorBody),
    ),
)]
pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<UserId>,
) -> Result<StatusCode, ApiError> {
    if auth.user_id != user_id {
        return Err(ApiError::forbidden("You can only delete your own account"));
    }
    if !state.store.delete_user(user_id).await? {
        return Err(ApiError::not_found("User not found"));
    }
    tracing::info!(user_id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}
