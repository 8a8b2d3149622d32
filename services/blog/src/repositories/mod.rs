//! Persistence for users, tokens and posts
//!
//! The token lifecycle only talks to storage through [`UserStore`] and
//! [`TokenStore`]. Every token state transition is a single statement, so a
//! concurrent revoke and cleanup on the same row cannot interleave between a
//! read and a write.

#[cfg(test)]
pub mod memory;
pub mod post;
pub mod token;
pub mod unit_of_work;
pub mod user;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::DatabaseResult;

use crate::models::{NewToken, NewUser, Token, User};

pub use post::PostRepository;
pub use token::TokenRepository;
pub use unit_of_work::UnitOfWork;
pub use user::UserRepository;

/// User identity storage
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user. Duplicate usernames or emails fail with a unique violation.
    async fn create(&self, new_user: &NewUser) -> DatabaseResult<User>;

    async fn find_by_id(&self, id: i64) -> DatabaseResult<Option<User>>;

    async fn find_by_username(&self, username: &str) -> DatabaseResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<User>>;

    /// Overwrite the stored password hash.
    async fn update_password_hash(&self, id: i64, password_hash: &str) -> DatabaseResult<()>;

    async fn touch_last_seen(&self, id: i64, at: DateTime<Utc>) -> DatabaseResult<()>;
}

/// Token row storage
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert(&self, new_token: &NewToken) -> DatabaseResult<Token>;

    async fn find_by_access_hash(&self, access_token_hash: &str) -> DatabaseResult<Option<Token>>;

    /// Consume the refresh secret of token `id` in a single statement.
    ///
    /// Succeeds only while `refresh_token_hash` matches and the refresh
    /// expiry is still after `now`. The refresh expiry drops to `now` and
    /// the access expiry to `access_until`. `None` when nothing was claimed.
    async fn claim_refresh(
        &self,
        id: i64,
        refresh_token_hash: &str,
        now: DateTime<Utc>,
        access_until: DateTime<Utc>,
    ) -> DatabaseResult<Option<Token>>;

    /// Pull both expiries of one token down to `at`. Never extends them.
    async fn expire(&self, id: i64, at: DateTime<Utc>) -> DatabaseResult<()>;

    /// Pull both expiries of every token of `user_id` down to `at`.
    async fn expire_all_for_user(&self, user_id: i64, at: DateTime<Utc>) -> DatabaseResult<u64>;

    /// Delete tokens whose refresh expiry is strictly before `cutoff`.
    async fn delete_refresh_expired_before(&self, cutoff: DateTime<Utc>) -> DatabaseResult<u64>;
}
