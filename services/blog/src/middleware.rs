//! Authentication middleware
//!
//! Both layers resolve the caller through the [`AuthVerifier`] and insert
//! the resulting [`Principal`] into the request extensions.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{
    Authorization, HeaderMapExt,
    authorization::{Basic, Bearer},
};
use tracing::debug;

use crate::{
    AppState,
    error::{ApiError, AuthError, Challenge},
    verifier::Principal,
};

/// Require HTTP Basic credentials (username or email, and password).
///
/// Failed attempts are counted per identifier; a banned identifier gets
/// 429 before its password is checked.
pub async fn require_basic(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let credentials = req
        .headers()
        .typed_get::<Authorization<Basic>>()
        .ok_or(ApiError::Unauthenticated(Challenge::Basic))?;

    let key = credentials.username().to_lowercase();
    if !state.login_throttle.check(&key).await {
        return Err(ApiError::TooManyRequests);
    }

    match state
        .verifier
        .basic(credentials.username(), credentials.password())
        .await
    {
        Ok(user) => {
            state.login_throttle.reset(&key).await;
            req.extensions_mut().insert(Principal { user, token: None });
        }
        Err(AuthError::Unauthenticated) => {
            debug!("Recording failed login");
            state.login_throttle.record_failure(&key).await;
            return Err(ApiError::Unauthenticated(Challenge::Basic));
        }
        Err(e) => return Err(ApiError::from_auth(e, Challenge::Basic, state.settings.debug)),
    }

    Ok(next.run(req).await)
}

/// Require a bearer access envelope, unless auth is disabled for development.
pub async fn require_bearer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = req.headers().typed_get::<Authorization<Bearer>>();
    let envelope = header.as_ref().map(|h| h.token());

    let principal = state
        .verifier
        .bearer(envelope)
        .await
        .map_err(|e| ApiError::from_auth(e, Challenge::Bearer, state.settings.debug))?;

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}
