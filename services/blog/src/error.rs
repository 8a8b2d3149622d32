//! Error types for the blog service
//!
//! [`AuthError`] is the core taxonomy returned by the credential store, the
//! token manager and the verifier. [`ApiError`] is its HTTP rendering: every
//! response carries a numeric code, a short label and an optional
//! description, and never says which part of a credential was wrong.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::WWW_AUTHENTICATE},
    response::{IntoResponse, Response},
};
use common::DatabaseError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Core authentication and persistence errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// Missing, malformed or unknown credential
    #[error("Unauthenticated")]
    Unauthenticated,

    /// The credential was valid once but is past its expiry
    #[error("Credential expired")]
    Expired,

    /// Authenticated, but not allowed
    #[error("Forbidden")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Uniqueness violation on username or email
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Authentication scheme announced in a 401 challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Challenge {
    Basic,
    Bearer,
}

impl Challenge {
    fn header_value(self) -> HeaderValue {
        match self {
            // Non-standard scheme: browsers must not open their login prompt.
            Challenge::Basic => HeaderValue::from_static("Form"),
            Challenge::Bearer => HeaderValue::from_static("Bearer realm=\"Authentication Required\""),
        }
    }
}

/// Error body shared by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// HTTP-facing error
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthenticated(Challenge),

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found: {0}")]
    NotFound(String),

    /// Detail is only present in debug configurations
    #[error("Conflict")]
    Conflict(Option<String>),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Too many requests")]
    TooManyRequests,

    #[error("Internal server error")]
    InternalServerError,
}

impl ApiError {
    /// Translate a core error, attaching storage detail only when `debug`.
    pub fn from_auth(err: AuthError, challenge: Challenge, debug: bool) -> Self {
        match err {
            AuthError::Unauthenticated | AuthError::Expired => ApiError::Unauthenticated(challenge),
            AuthError::Forbidden => ApiError::Forbidden,
            AuthError::NotFound(what) => ApiError::NotFound(what.to_string()),
            AuthError::Conflict(detail) => ApiError::Conflict(debug.then_some(detail)),
            AuthError::Validation(msg) => ApiError::BadRequest(msg),
            AuthError::Database(e) => {
                error!("Database error: {}", e);
                ApiError::InternalServerError
            }
            AuthError::Internal(msg) => {
                error!("Internal error: {}", msg);
                ApiError::InternalServerError
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn description(&self) -> Option<String> {
        match self {
            ApiError::Unauthenticated(_) => Some(
                "The server could not verify that you are authorized to access the URL requested."
                    .to_string(),
            ),
            ApiError::Forbidden => {
                Some("You don't have the permission to access the requested resource.".to_string())
            }
            ApiError::NotFound(what) => Some(format!("{} not found", what)),
            ApiError::Conflict(detail) => Some(
                detail
                    .clone()
                    .unwrap_or_else(|| "The resource already exists.".to_string()),
            ),
            ApiError::BadRequest(msg) => Some(msg.clone()),
            ApiError::TooManyRequests => {
                Some("Too many failed attempts, try again later.".to_string())
            }
            ApiError::InternalServerError => None,
        }
    }
}

/// Core errors default to a bearer challenge and no debug detail.
impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::from_auth(err, Challenge::Bearer, false)
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        ApiError::from(AuthError::Database(err))
    }
}

impl From<search::SearchError> for ApiError {
    fn from(err: search::SearchError) -> Self {
        error!("Search error: {}", err);
        ApiError::InternalServerError
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            code: status.as_u16(),
            message: status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string(),
            description: self.description(),
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::Unauthenticated(challenge) = self {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, challenge.header_value());
        }
        response
    }
}

/// Type alias for handler results
pub type ApiResult<T> = Result<T, ApiError>;
