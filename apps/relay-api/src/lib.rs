pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod routes;

use std::sync::Arc;

use auth::{Authenticator, JwtAuthenticator};
use config::Config;
use db::store::ChatStore;
use gateway::{Dispatcher, HubHandle};
use relay_common::SnowflakeGenerator;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChatStore>,
    pub auth: Arc<dyn Authenticator>,
    pub hub: HubHandle,
    pub config: Arc<Config>,
    pub snowflake: Arc<SnowflakeGenerator>,
}

impl AppState {
    /// Build state around `store` and spawn the hub on the current runtime.
    pub fn new(config: Config, store: Arc<dyn ChatStore>) -> Self {
        let hub = Dispatcher::spawn(config.delivery, config.queue_capacity);
        Self {
            store,
            auth: Arc::new(JwtAuthenticator::new(config.jwt_secret.as_bytes())),
            hub,
            snowflake: Arc::new(SnowflakeGenerator::new(config.worker_id)),
            config: Arc::new(config),
        }
    }
}
