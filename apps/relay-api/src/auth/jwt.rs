//! Bearer-token issuance and identity resolution (HS256 JWT).

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AdmissionError, ApiError};
use crate::models::user::UserId;

/// Token lifetime (24 hours).
pub const TOKEN_TTL_HOURS: i64 = 24;

/// Claims embedded in a relay access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: UserId,
    pub iat: i64,
    pub exp: i64,
}

/// Resolves caller-supplied credentials to user ids and issues new ones.
pub trait Authenticator: Send + Sync {
    fn resolve_identity(&self, credential: &str) -> Result<UserId, AdmissionError>;

    fn issue_token(&self, user_id: UserId) -> Result<String, ApiError>;
}

pub struct JwtAuthenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl JwtAuthenticator {
    pub fn new(secret: &[u8]) -> Self {
        Self::with_ttl(secret, Duration::hours(TOKEN_TTL_HOURS))
    }

    pub fn with_ttl(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }
}

impl Authenticator for JwtAuthenticator {
    fn resolve_identity(&self, credential: &str) -> Result<UserId, AdmissionError> {
        let token = credential.strip_prefix("Bearer ").unwrap_or(credential).trim();
        if token.is_empty() {
            return Err(AdmissionError::MissingCredential);
        }

        jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims.user_id)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AdmissionError::Expired,
                _ => {
                    tracing::debug!(?e, "token validation failed");
                    AdmissionError::InvalidCredential
                }
            })
    }

    fn issue_token(&self, user_id: UserId) -> Result<String, ApiError> {
        let now = Utc::now();
        let claims = Claims {
            user_id,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            tracing::error!(?e, "token signing failed");
            ApiError::internal("Failed to issue token")
        })
    }
}
