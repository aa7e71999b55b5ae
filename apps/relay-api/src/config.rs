use crate::gateway::dispatcher::{DeliveryPolicy, DEFAULT_QUEUE_CAPACITY};

/// Default inbound frame limit in bytes.
pub const DEFAULT_READ_LIMIT: usize = 1024;

/// Relay API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string. When unset the in-memory store is used.
    pub database_url: Option<String>,
    /// HMAC secret used to sign and verify bearer tokens.
    pub jwt_secret: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Capacity of each connection's outbound queue.
    pub queue_capacity: usize,
    /// Largest inbound WebSocket message accepted, in bytes.
    pub read_limit: usize,
    /// Who receives chat and typing events.
    pub delivery: DeliveryPolicy,
    /// Snowflake worker id for message ids.
    pub worker_id: u16,
    /// Allowed CORS origin. Any origin when unset.
    pub cors_origin: Option<String>,
}

impl Config {
    /// Defaults for everything but the signing secret. No database.
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            database_url: None,
            jwt_secret: jwt_secret.into(),
            port: 8080,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            read_limit: DEFAULT_READ_LIMIT,
            delivery: DeliveryPolicy::default(),
            worker_id: 0,
            cors_origin: None,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing or
    /// a present variable cannot be parsed.
    pub fn from_env() -> Self {
        let defaults = Self::new(required_var("JWT_SECRET"));
        Self {
            database_url: optional_var("DATABASE_URL"),
            port: parsed_var("PORT").unwrap_or(defaults.port),
            queue_capacity: parsed_var("RELAY_QUEUE_CAPACITY").unwrap_or(defaults.queue_capacity),
            read_limit: parsed_var("RELAY_READ_LIMIT").unwrap_or(defaults.read_limit),
            delivery: parsed_var("RELAY_DELIVERY").unwrap_or(defaults.delivery),
            worker_id: parsed_var("RELAY_WORKER_ID").unwrap_or(defaults.worker_id),
            cors_origin: optional_var("CORS_ORIGIN"),
            ..defaults
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn parsed_var<T>(name: &str) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    optional_var(name).map(|raw| {
        raw.parse()
            .unwrap_or_else(|e| panic!("{name} has an invalid value `{raw}`: {e}"))
    })
}
