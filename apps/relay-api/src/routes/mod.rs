pub mod auth;
pub mod chat;
pub mod health;
pub mod users;

use axum::Router;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .merge(auth::router())
        .merge(users::router())
        .merge(chat::router())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Auth
        auth::register,
        auth::login,
        // Users
        users::list_users,
        users::get_user,
        users::update_user,
        users::delete_user,
        // Chat
        chat::history,
        chat::conversations,
        chat::send_message,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            // Models
            crate::models::message::Message,
            crate::models::conversation::ConversationResponse,
            crate::models::user::UserResponse,
            crate::models::user::UserChanges,
            crate::gateway::events::ChatMessagePayload,
            // Route request/response types
            health::HealthResponse,
            auth::RegisterRequest,
            auth::LoginRequest,
            auth::TokenResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Auth", description = "Registration and login"),
        (name = "Users", description = "User profiles"),
        (name = "Chat", description = "History, conversations and sending"),
    )
)]
pub struct ApiDoc;
