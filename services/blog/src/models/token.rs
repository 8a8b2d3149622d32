//! Token model: one authenticated session of a user

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Token entity
///
/// Only SHA-256 digests of the access and refresh secrets are stored.
#[derive(Debug, Clone, FromRow, PartialEq)]
pub struct Token {
    pub id: i64,
    pub user_id: i64,
    pub access_token_hash: String,
    pub access_expiration: DateTime<Utc>,
    pub refresh_token_hash: String,
    pub refresh_expiration: DateTime<Utc>,
}

/// New token row
#[derive(Debug, Clone)]
pub struct NewToken {
    pub user_id: i64,
    pub access_token_hash: String,
    pub access_expiration: DateTime<Utc>,
    pub refresh_token_hash: String,
    pub refresh_expiration: DateTime<Utc>,
}

/// A freshly issued token together with the secrets handed to the client
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: Token,
    /// Signed envelope carrying the access secret
    pub access_token: String,
    /// Plaintext refresh secret
    pub refresh_token: String,
}

/// Token response body
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Refresh request body; the refresh secret may come from the cookie instead
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Password reset request body
#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub email: String,
}

/// Password reset confirmation body
#[derive(Debug, Deserialize)]
pub struct ResetConfirm {
    pub token: String,
    pub new_password: String,
}
