//! Token manager: issuance, verification, rotation, revocation and cleanup
//!
//! A token row moves through `ACTIVE -> EXPIRING -> DELETED`. Revocation
//! pulls both expiries down to `now + grace_period` instead of deleting the
//! row, so requests already in flight with the old access token still
//! complete. [`TokenManager::cleanup`] later deletes rows whose refresh
//! expiry is more than `cleanup_after` in the past.
//!
//! Secrets are 32 random bytes, URL-safe base64 encoded. Only their SHA-256
//! digests are persisted.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    clock::Clock,
    envelope::EnvelopeCodec,
    error::AuthError,
    models::{IssuedToken, NewToken, Token, User},
    repositories::{TokenStore, UserStore},
};

const SECRET_BYTES: usize = 32;

/// Lifetimes applied by the token manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub reset_ttl: Duration,
    pub grace_period: Duration,
    pub cleanup_after: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
            reset_ttl: Duration::minutes(15),
            grace_period: Duration::seconds(5),
            cleanup_after: Duration::days(1),
        }
    }
}

/// Create, verify, rotate and revoke access/refresh token pairs
#[derive(Clone)]
pub struct TokenManager {
    tokens: Arc<dyn TokenStore>,
    users: Arc<dyn UserStore>,
    codec: EnvelopeCodec,
    clock: Arc<dyn Clock>,
    policy: TokenPolicy,
}

impl TokenManager {
    pub fn new(
        tokens: Arc<dyn TokenStore>,
        users: Arc<dyn UserStore>,
        codec: EnvelopeCodec,
        clock: Arc<dyn Clock>,
        policy: TokenPolicy,
    ) -> Self {
        Self {
            tokens,
            users,
            codec,
            clock,
            policy,
        }
    }

    /// Generate and persist a fresh token pair for `user`.
    pub async fn issue(&self, user: &User) -> Result<IssuedToken, AuthError> {
        let now = self.clock.now();
        let access_secret = generate_secret();
        let refresh_secret = generate_secret();

        let token = self
            .tokens
            .insert(&NewToken {
                user_id: user.id,
                access_token_hash: digest(&access_secret),
                access_expiration: now + self.policy.access_ttl,
                refresh_token_hash: digest(&refresh_secret),
                refresh_expiration: now + self.policy.refresh_ttl,
            })
            .await?;

        info!("Issued token {} for user {}", token.id, user.id);
        Ok(IssuedToken {
            access_token: self.codec.seal_access(&access_secret)?,
            refresh_token: refresh_secret,
            token,
        })
    }

    /// Resolve an access envelope to its user and token row.
    ///
    /// Touches the user's last-seen timestamp on success.
    pub async fn verify_access(&self, access_envelope: &str) -> Result<(User, Token), AuthError> {
        let token = self.find_by_envelope(access_envelope).await?;

        let now = self.clock.now();
        if now > token.access_expiration {
            debug!("Access token {} expired", token.id);
            return Err(AuthError::Expired);
        }

        let mut user = self
            .users
            .find_by_id(token.user_id)
            .await?
            .ok_or(AuthError::Unauthenticated)?;
        self.users.touch_last_seen(user.id, now).await?;
        user.last_seen = now;

        Ok((user, token))
    }

    /// Check a refresh secret against the token its access envelope names.
    ///
    /// A refresh past its expiry revokes every token of the user.
    pub async fn verify_refresh(
        &self,
        refresh_secret: &str,
        access_envelope: &str,
    ) -> Result<Token, AuthError> {
        let token = self.find_by_envelope(access_envelope).await?;

        if !constant_time_eq(
            digest(refresh_secret).as_bytes(),
            token.refresh_token_hash.as_bytes(),
        ) {
            debug!("Refresh secret mismatch for token {}", token.id);
            return Err(AuthError::Unauthenticated);
        }

        if self.clock.now() > token.refresh_expiration {
            warn!(
                "Expired refresh token {} presented, revoking all tokens of user {}",
                token.id, token.user_id
            );
            self.revoke_all(token.user_id).await?;
            return Err(AuthError::Expired);
        }

        Ok(token)
    }

    /// Verify a refresh and rotate: consume the old pair, issue a new one.
    ///
    /// The old refresh secret is claimed atomically, so a replayed or
    /// concurrent duplicate refresh never mints a second pair. The old
    /// access token keeps working for the grace period.
    pub async fn refresh(
        &self,
        refresh_secret: &str,
        access_envelope: &str,
    ) -> Result<IssuedToken, AuthError> {
        let old = self.verify_refresh(refresh_secret, access_envelope).await?;

        let now = self.clock.now();
        let claimed = self
            .tokens
            .claim_refresh(
                old.id,
                &old.refresh_token_hash,
                now,
                now + self.policy.grace_period,
            )
            .await?
            .ok_or_else(|| {
                warn!("Refresh of token {} lost the claim, rejecting", old.id);
                AuthError::Unauthenticated
            })?;

        let user = self
            .users
            .find_by_id(claimed.user_id)
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        let issued = self.issue(&user).await?;
        info!("Rotated token {} into {}", claimed.id, issued.token.id);
        Ok(issued)
    }

    /// Expire `token` once the grace period has passed.
    pub async fn revoke(&self, token: &Token) -> Result<(), AuthError> {
        let at = self.clock.now() + self.policy.grace_period;
        self.tokens.expire(token.id, at).await?;
        info!("Revoked token {}", token.id);
        Ok(())
    }

    /// Revoke every token of a user.
    pub async fn revoke_all(&self, user_id: i64) -> Result<u64, AuthError> {
        let at = self.clock.now() + self.policy.grace_period;
        let revoked = self.tokens.expire_all_for_user(user_id, at).await?;
        info!("Revoked {} tokens of user {}", revoked, user_id);
        Ok(revoked)
    }

    /// Delete tokens whose refresh expiry is older than `cleanup_after`.
    pub async fn cleanup(&self) -> Result<u64, AuthError> {
        let cutoff = self.clock.now() - self.policy.cleanup_after;
        Ok(self.tokens.delete_refresh_expired_before(cutoff).await?)
    }

    /// Sign a password-reset envelope for `email`.
    pub fn reset_envelope(&self, email: &str) -> Result<String, AuthError> {
        let expires_at = self.clock.now() + self.policy.reset_ttl;
        self.codec.seal_reset(email, expires_at)
    }

    /// Verify a password-reset envelope and return its email.
    pub fn verify_reset(&self, envelope: &str) -> Result<String, AuthError> {
        self.codec.open_reset(envelope, self.clock.now())
    }

    async fn find_by_envelope(&self, access_envelope: &str) -> Result<Token, AuthError> {
        let secret = self.codec.open_access(access_envelope)?;
        self.tokens
            .find_by_access_hash(&digest(&secret))
            .await?
            .ok_or(AuthError::Unauthenticated)
    }
}

fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn digest(secret: &str) -> String {
    format!("{:x}", Sha256::digest(secret.as_bytes()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
