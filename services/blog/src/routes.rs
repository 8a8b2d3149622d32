//! HTTP routes for the blog service

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde_json::json;
use tracing::{error, info, warn};

use crate::{
    AppState,
    config::Settings,
    error::{ApiError, ApiResult, AuthError, Challenge},
    mailer::reset_link,
    middleware::{require_basic, require_bearer},
    models::{
        IssuedToken, NewPost, Post, RefreshRequest, RegisterRequest, ResetConfirm, ResetRequest,
        SearchQuery, TokenResponse,
    },
    repositories::UnitOfWork,
    validation,
    verifier::Principal,
};

pub const REFRESH_COOKIE: &str = "refresh_token";
const REFRESH_COOKIE_PATH: &str = "/api/tokens";
const MAX_PER_PAGE: u32 = 100;

/// Create the router for the blog service
pub fn create_router(state: AppState) -> Router {
    let basic = from_fn_with_state(state.clone(), require_basic);
    let bearer = from_fn_with_state(state.clone(), require_bearer);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/users", post(register))
        .route(
            "/api/tokens",
            post(new_token)
                .route_layer(basic)
                .merge(delete(revoke_token).route_layer(bearer.clone()))
                .merge(put(refresh_token)),
        )
        .route(
            "/api/tokens/reset",
            post(request_password_reset).put(confirm_password_reset),
        )
        .route("/api/me", get(me).route_layer(bearer.clone()))
        .route("/api/posts", post(create_post).route_layer(bearer.clone()))
        .route(
            "/api/posts/search",
            get(search_posts).route_layer(bearer.clone()),
        )
        .route("/api/posts/:id", delete(delete_post).route_layer(bearer))
        .with_state(state)
}

fn api_error(state: &AppState, err: AuthError) -> ApiError {
    ApiError::from_auth(err, Challenge::Bearer, state.settings.debug)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = common::database::health_check(&state.db_pool)
        .await
        .unwrap_or(false);
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if database { "ok" } else { "degraded" },
            "service": "blog",
            "database": database,
            "search": {
                "backend": state.search.backend(),
                "degraded": state.search.is_degraded(),
                "failed_mutations": state.search.failed_mutations(),
            },
        })),
    )
}

/// Register a new user
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .credentials
        .register(&payload.username, &payload.email, &payload.password)
        .await
        .map_err(|e| api_error(&state, e))?;

    Ok((StatusCode::CREATED, Json(user)))
}

fn refresh_cookie(settings: &Settings, refresh_token: String) -> Cookie<'static> {
    let same_site = match (settings.use_cors, settings.debug) {
        (false, _) => SameSite::Strict,
        (true, false) => SameSite::None,
        (true, true) => SameSite::Lax,
    };

    Cookie::build((REFRESH_COOKIE, refresh_token))
        .path(REFRESH_COOKIE_PATH)
        .http_only(true)
        .secure(!settings.debug)
        .same_site(same_site)
        .build()
}

/// Hand out an issued token according to the refresh delivery settings.
fn token_response(
    settings: &Settings,
    jar: CookieJar,
    issued: IssuedToken,
) -> (CookieJar, Json<TokenResponse>) {
    let jar = if settings.refresh_token_in_cookie {
        jar.add(refresh_cookie(settings, issued.refresh_token.clone()))
    } else {
        jar
    };

    let body = TokenResponse {
        access_token: issued.access_token,
        refresh_token: settings
            .refresh_token_in_body
            .then_some(issued.refresh_token),
    };
    (jar, Json(body))
}

/// Exchange basic credentials for a new token
pub async fn new_token(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    jar: CookieJar,
) -> ApiResult<impl IntoResponse> {
    let issued = state
        .tokens
        .issue(&principal.user)
        .await
        .map_err(|e| api_error(&state, e))?;

    if let Err(e) = state.tokens.cleanup().await {
        error!("Token cleanup failed: {}", e);
    }

    info!("User {} logged in", principal.user.id);
    Ok(token_response(&state.settings, jar, issued))
}

/// Rotate a token pair using the refresh secret
pub async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<impl IntoResponse> {
    let refresh_secret = payload
        .refresh_token
        .or_else(|| jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()))
        .ok_or(ApiError::Unauthenticated(Challenge::Bearer))?;

    let issued = state
        .tokens
        .refresh(&refresh_secret, &payload.access_token)
        .await
        .map_err(|e| api_error(&state, e))?;

    Ok(token_response(&state.settings, jar, issued))
}

/// Revoke the token that authenticated this request
pub async fn revoke_token(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<StatusCode> {
    match principal.token {
        Some(token) => state
            .tokens
            .revoke(&token)
            .await
            .map_err(|e| api_error(&state, e))?,
        None => warn!("Token revocation requested with authentication disabled"),
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Send a password reset link; the response never reveals whether the email exists
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<ResetRequest>,
) -> ApiResult<StatusCode> {
    let user = state
        .credentials
        .find_by_email(&payload.email)
        .await
        .map_err(|e| api_error(&state, e))?;

    if let Some(user) = user {
        let envelope = state
            .tokens
            .reset_envelope(&user.email)
            .map_err(|e| api_error(&state, e))?;
        let link = reset_link(&state.settings.password_reset_url, &envelope);
        if let Err(e) = state.mailer.send_password_reset(&user.email, &link).await {
            error!("Failed to send password reset email: {}", e);
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Set a new password from a reset envelope and revoke every session
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<ResetConfirm>,
) -> ApiResult<StatusCode> {
    let invalid = || ApiError::BadRequest("Invalid or expired reset token".to_string());

    let email = state.tokens.verify_reset(&payload.token).map_err(|e| match e {
        AuthError::Unauthenticated | AuthError::Expired => invalid(),
        other => api_error(&state, other),
    })?;

    let mut user = state
        .credentials
        .find_by_email(&email)
        .await
        .map_err(|e| api_error(&state, e))?
        .ok_or_else(invalid)?;

    state
        .credentials
        .set_password(&mut user, &payload.new_password)
        .await
        .map_err(|e| api_error(&state, e))?;
    state
        .tokens
        .revoke_all(user.id)
        .await
        .map_err(|e| api_error(&state, e))?;

    info!("Password reset for user {}", user.id);
    Ok(StatusCode::NO_CONTENT)
}

/// The authenticated user
pub async fn me(Extension(principal): Extension<Principal>) -> impl IntoResponse {
    Json(principal.user)
}

/// Publish a post
pub async fn create_post(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<NewPost>,
) -> ApiResult<impl IntoResponse> {
    validation::validate_post_body(&payload.body)
        .and_then(|_| validation::validate_language(payload.language.as_deref()))
        .map_err(|e| api_error(&state, e))?;

    let mut uow = UnitOfWork::begin(&state.db_pool, state.search.clone()).await?;
    let post = state
        .posts
        .create(&mut uow, principal.user.id, &payload)
        .await
        .map_err(|e| api_error(&state, e))?;
    uow.commit().await?;

    Ok((StatusCode::CREATED, Json(post)))
}

/// Delete one of the caller's posts
pub async fn delete_post(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let post = state
        .posts
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Post".to_string()))?;

    if post.user_id != principal.user.id {
        return Err(ApiError::Forbidden);
    }

    let mut uow = UnitOfWork::begin(&state.db_pool, state.search.clone()).await?;
    state
        .posts
        .delete(&mut uow, &post)
        .await
        .map_err(|e| api_error(&state, e))?;
    uow.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Relevance-ordered full-text search over posts
pub async fn search_posts(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<impl IntoResponse> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query
        .per_page
        .unwrap_or(state.settings.posts_per_page)
        .clamp(1, MAX_PER_PAGE);

    let results = state
        .search
        .search::<Post, _>(&state.posts, &query.q, page, per_page)
        .await?;

    Ok(Json(results))
}
