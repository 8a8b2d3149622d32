//! In-memory stores for unit tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{DatabaseError, DatabaseResult};
use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};

use super::{TokenStore, UserStore};
use crate::models::{NewToken, NewUser, Token, User};

fn unique_violation(constraint: &str) -> DatabaseError {
    DatabaseError::UniqueViolation {
        constraint: Some(constraint.to_string()),
        source: sqlx::Error::Protocol(format!(
            "duplicate key value violates unique constraint \"{}\"",
            constraint
        )),
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<BTreeMap<i64, User>>,
}

impl MemoryUserStore {
    fn users(&self) -> MutexGuard<'_, BTreeMap<i64, User>> {
        self.users.lock().unwrap()
    }

    pub fn get(&self, id: i64) -> Option<User> {
        self.users().get(&id).cloned()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, new_user: &NewUser) -> DatabaseResult<User> {
        let mut users = self.users();
        if users.values().any(|u| u.username == new_user.username) {
            return Err(unique_violation("users_username_key"));
        }
        if users.values().any(|u| u.email == new_user.email) {
            return Err(unique_violation("users_email_key"));
        }

        let id = users.keys().next_back().copied().unwrap_or(0) + 1;
        let now = Utc::now();
        let user = User {
            id,
            username: new_user.username.clone(),
            email: new_user.email.clone(),
            password_hash: new_user.password_hash.clone(),
            about_me: None,
            last_seen: now,
            created_at: now,
        };
        users.insert(id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> DatabaseResult<Option<User>> {
        Ok(self.get(id))
    }

    async fn find_by_username(&self, username: &str) -> DatabaseResult<Option<User>> {
        Ok(self.users().values().find(|u| u.username == username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<User>> {
        Ok(self.users().values().find(|u| u.email == email).cloned())
    }

    async fn update_password_hash(&self, id: i64, password_hash: &str) -> DatabaseResult<()> {
        if let Some(user) = self.users().get_mut(&id) {
            user.password_hash = password_hash.to_string();
        }
        Ok(())
    }

    async fn touch_last_seen(&self, id: i64, at: DateTime<Utc>) -> DatabaseResult<()> {
        if let Some(user) = self.users().get_mut(&id) {
            user.last_seen = at;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<BTreeMap<i64, Token>>,
}

impl MemoryTokenStore {
    fn tokens(&self) -> MutexGuard<'_, BTreeMap<i64, Token>> {
        self.tokens.lock().unwrap()
    }

    pub fn get(&self, id: i64) -> Option<Token> {
        self.tokens().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.tokens().len()
    }

    /// Overwrite a row, for arranging expiry scenarios.
    pub fn put(&self, token: Token) {
        self.tokens().insert(token.id, token);
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn insert(&self, new_token: &NewToken) -> DatabaseResult<Token> {
        let mut tokens = self.tokens();
        let id = tokens.keys().next_back().copied().unwrap_or(0) + 1;
        let token = Token {
            id,
            user_id: new_token.user_id,
            access_token_hash: new_token.access_token_hash.clone(),
            access_expiration: new_token.access_expiration,
            refresh_token_hash: new_token.refresh_token_hash.clone(),
            refresh_expiration: new_token.refresh_expiration,
        };
        tokens.insert(id, token.clone());
        Ok(token)
    }

    async fn find_by_access_hash(&self, access_token_hash: &str) -> DatabaseResult<Option<Token>> {
        Ok(self
            .tokens()
            .values()
            .find(|t| t.access_token_hash == access_token_hash)
            .cloned())
    }

    async fn claim_refresh(
        &self,
        id: i64,
        refresh_token_hash: &str,
        now: DateTime<Utc>,
        access_until: DateTime<Utc>,
    ) -> DatabaseResult<Option<Token>> {
        let mut tokens = self.tokens();
        let claimable = tokens
            .get_mut(&id)
            .filter(|t| t.refresh_token_hash == refresh_token_hash && t.refresh_expiration > now);

        Ok(claimable.map(|token| {
            token.access_expiration = token.access_expiration.min(access_until);
            token.refresh_expiration = token.refresh_expiration.min(now);
            token.clone()
        }))
    }

    async fn expire(&self, id: i64, at: DateTime<Utc>) -> DatabaseResult<()> {
        if let Some(token) = self.tokens().get_mut(&id) {
            token.access_expiration = token.access_expiration.min(at);
            token.refresh_expiration = token.refresh_expiration.min(at);
        }
        Ok(())
    }

    async fn expire_all_for_user(&self, user_id: i64, at: DateTime<Utc>) -> DatabaseResult<u64> {
        let mut expired = 0;
        for token in self.tokens().values_mut().filter(|t| t.user_id == user_id) {
            token.access_expiration = token.access_expiration.min(at);
            token.refresh_expiration = token.refresh_expiration.min(at);
            expired += 1;
        }
        Ok(expired)
    }

    async fn delete_refresh_expired_before(&self, cutoff: DateTime<Utc>) -> DatabaseResult<u64> {
        let mut tokens = self.tokens();
        let before = tokens.len();
        tokens.retain(|_, t| t.refresh_expiration >= cutoff);
        Ok((before - tokens.len()) as u64)
    }
}
