use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use relay_api::config::Config;
use relay_api::db::pg::PgStore;
use relay_api::db::store::{ChatStore, MemoryStore};
use relay_api::routes::ApiDoc;
use relay_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let store: Arc<dyn ChatStore> = match &config.database_url {
        Some(url) => {
            let pool = relay_api::db::pool::connect(url).expect("failed to create database pool");
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let cors = CorsLayer::new()
        .allow_origin(match &config.cors_origin {
            Some(origin) => AllowOrigin::exact(
                HeaderValue::from_str(origin).expect("CORS_ORIGIN is not a valid header value"),
            ),
            None => AllowOrigin::from(Any),
        })
        .allow_methods(Any)
        .allow_headers(Any);

    tracing::info!(
        delivery = ?config.delivery,
        queue_capacity = config.queue_capacity,
        read_limit = config.read_limit,
        "relay-api configured"
    );

    let state = AppState::new(config, store);
    let hub = state.hub.clone();

    let app = Router::new()
        .merge(relay_api::routes::router())
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "relay-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("shutdown requested, closing connections");
            hub.shutdown();
        })
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
