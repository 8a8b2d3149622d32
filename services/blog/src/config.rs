//! Service settings
//!
//! Loaded from an optional `blog.toml` in the working directory, then
//! overridden by `BLOG_`-prefixed environment variables
//! (`BLOG_SECRET_KEY`, `BLOG_ACCESS_TOKEN_EXPIRE_MINS`, ...).

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::time::Duration as StdDuration;
use tracing::warn;

use crate::{throttle::ThrottleConfig, tokens::TokenPolicy, verifier::AuthMode};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Symmetric key signing access and reset envelopes
    pub secret_key: String,
    pub bind_address: String,
    pub access_token_expire_mins: i64,
    pub refresh_token_expire_days: i64,
    pub reset_token_mins: i64,
    pub refresh_token_in_cookie: bool,
    pub refresh_token_in_body: bool,
    pub use_cors: bool,
    pub debug: bool,
    /// Test mode: revocation takes effect without a grace period
    pub testing: bool,
    /// Development only, and only together with `debug`
    pub disable_auth: bool,
    pub dev_user_id: i64,
    pub password_reset_url: String,
    pub posts_per_page: u32,
    pub max_login_attempts: u32,
    pub login_window_secs: u64,
    pub login_ban_secs: u64,
}

impl Settings {
    /// Load from `blog.toml` (if present) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::build(
            Config::builder()
                .add_source(File::with_name("blog").required(false))
                .add_source(Environment::with_prefix("BLOG").try_parsing(true)),
        )
    }

    /// Load from a TOML document, without consulting the environment.
    pub fn from_toml(document: &str) -> Result<Self, ConfigError> {
        Self::build(Config::builder().add_source(File::from_str(document, FileFormat::Toml)))
    }

    fn build(
        sources: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let settings: Settings = with_defaults(sources)?.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.secret_key.trim().is_empty() {
            return Err(ConfigError::Message("secret_key must not be empty".into()));
        }
        if self.disable_auth && !self.debug {
            return Err(ConfigError::Message(
                "disable_auth is only allowed together with debug".into(),
            ));
        }
        if self.access_token_expire_mins <= 0
            || self.refresh_token_expire_days <= 0
            || self.reset_token_mins <= 0
        {
            return Err(ConfigError::Message("token lifetimes must be positive".into()));
        }
        if self.posts_per_page == 0 {
            return Err(ConfigError::Message("posts_per_page must be positive".into()));
        }
        Ok(())
    }

    pub fn grace_period(&self) -> chrono::Duration {
        if self.testing {
            chrono::Duration::zero()
        } else {
            chrono::Duration::seconds(5)
        }
    }

    pub fn token_policy(&self) -> TokenPolicy {
        TokenPolicy {
            access_ttl: chrono::Duration::minutes(self.access_token_expire_mins),
            refresh_ttl: chrono::Duration::days(self.refresh_token_expire_days),
            reset_ttl: chrono::Duration::minutes(self.reset_token_mins),
            grace_period: self.grace_period(),
            ..TokenPolicy::default()
        }
    }

    pub fn auth_mode(&self) -> AuthMode {
        if self.disable_auth && self.debug {
            warn!("BLOG_DISABLE_AUTH is set: authentication is bypassed for development");
            AuthMode::Disabled {
                dev_user_id: self.dev_user_id,
            }
        } else {
            AuthMode::Enforced
        }
    }

    pub fn throttle_config(&self) -> ThrottleConfig {
        ThrottleConfig {
            max_attempts: self.max_login_attempts,
            window: StdDuration::from_secs(self.login_window_secs),
            ban_duration: StdDuration::from_secs(self.login_ban_secs),
        }
    }
}

fn with_defaults(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    builder
        .set_default("bind_address", "0.0.0.0:3000")?
        .set_default("access_token_expire_mins", 15_i64)?
        .set_default("refresh_token_expire_days", 7_i64)?
        .set_default("reset_token_mins", 15_i64)?
        .set_default("refresh_token_in_cookie", true)?
        .set_default("refresh_token_in_body", false)?
        .set_default("use_cors", false)?
        .set_default("debug", false)?
        .set_default("testing", false)?
        .set_default("disable_auth", false)?
        .set_default("dev_user_id", 1_i64)?
        .set_default("password_reset_url", "http://localhost:3000/reset")?
        .set_default("posts_per_page", 25_i64)?
        .set_default("max_login_attempts", 5_i64)?
        .set_default("login_window_secs", 300_i64)?
        .set_default("login_ban_secs", 3600_i64)
}
