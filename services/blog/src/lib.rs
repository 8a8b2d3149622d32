//! Blog backend service
//!
//! Users, posts and the token-based session lifecycle, served over axum.
//! [`AppState`] wires the credential store, token manager and verifier to
//! their storage; `main` builds it from [`config::Settings`].

pub mod clock;
pub mod config;
pub mod credentials;
pub mod envelope;
pub mod error;
pub mod mailer;
pub mod middleware;
pub mod models;
pub mod password;
pub mod throttle;
pub mod repositories;
pub mod routes;
pub mod tokens;
pub mod validation;
pub mod verifier;

use search::{SearchIndex, SearchRegistry, SearchSync};
use sqlx::PgPool;
use std::sync::Arc;

use crate::{
    clock::{Clock, SystemClock},
    config::Settings,
    credentials::CredentialStore,
    envelope::EnvelopeCodec,
    error::AuthError,
    mailer::{LogMailer, Mailer},
    models::Post,
    throttle::LoginThrottle,
    repositories::{PostRepository, TokenRepository, TokenStore, UserRepository, UserStore},
    tokens::TokenManager,
    verifier::AuthVerifier,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub db_pool: PgPool,
    pub credentials: CredentialStore,
    pub tokens: TokenManager,
    pub verifier: AuthVerifier,
    pub posts: PostRepository,
    pub search: SearchSync,
    pub login_throttle: LoginThrottle,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// Wire the service around explicit user and token stores.
    pub fn new(
        settings: Settings,
        db_pool: PgPool,
        users: Arc<dyn UserStore>,
        token_store: Arc<dyn TokenStore>,
        index: Arc<dyn SearchIndex>,
        clock: Arc<dyn Clock>,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, AuthError> {
        let codec = EnvelopeCodec::new(&settings.secret_key)?;
        let credentials = CredentialStore::new(users.clone(), clock.clone());
        let tokens = TokenManager::new(token_store, users, codec, clock, settings.token_policy());
        let verifier = AuthVerifier::new(credentials.clone(), tokens.clone(), settings.auth_mode());

        let mut registry = SearchRegistry::new();
        registry.register_entity::<Post>();

        Ok(Self {
            login_throttle: LoginThrottle::new(settings.throttle_config()),
            posts: PostRepository::new(db_pool.clone()),
            search: SearchSync::new(index, registry),
            settings: Arc::new(settings),
            db_pool,
            credentials,
            tokens,
            verifier,
            mailer,
        })
    }
}

/// Production wiring: PostgreSQL stores, wall clock, logging mailer.
pub fn build_state(
    settings: Settings,
    db_pool: PgPool,
    index: Arc<dyn SearchIndex>,
) -> Result<AppState, AuthError> {
    AppState::new(
        settings,
        db_pool.clone(),
        Arc::new(UserRepository::new(db_pool.clone())),
        Arc::new(TokenRepository::new(db_pool)),
        index,
        Arc::new(SystemClock),
        Arc::new(LogMailer),
    )
}
