//! Credential store: user identity and password hashes

use common::DatabaseError;
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    clock::Clock,
    error::AuthError,
    models::{NewUser, User},
    password,
    repositories::UserStore,
    validation,
};

/// Registers users and checks their passwords
#[derive(Clone)]
pub struct CredentialStore {
    users: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
}

impl CredentialStore {
    pub fn new(users: Arc<dyn UserStore>, clock: Arc<dyn Clock>) -> Self {
        Self { users, clock }
    }

    /// Validate, hash and persist a new user.
    ///
    /// A taken username or email is a `Conflict` carrying the storage
    /// message, which the HTTP layer only shows in debug.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        validation::validate_username(username)?;
        validation::validate_email(email)?;
        validation::validate_password(password)?;

        let new_user = NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password::hash_password(password)?,
        };

        match self.users.create(&new_user).await {
            Ok(user) => {
                info!("Registered user {} ({})", user.username, user.id);
                Ok(user)
            }
            Err(e @ DatabaseError::UniqueViolation { .. }) => Err(AuthError::Conflict(e.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the user's password hash with one for `plaintext`.
    pub async fn set_password(&self, user: &mut User, plaintext: &str) -> Result<(), AuthError> {
        validation::validate_password(plaintext)?;

        let hash = password::hash_password(plaintext)?;
        self.users.update_password_hash(user.id, &hash).await?;
        user.password_hash = hash;
        Ok(())
    }

    pub fn check_password(&self, user: &User, plaintext: &str) -> bool {
        password::verify_password(plaintext, &user.password_hash)
    }

    /// Exact username match first, then exact email match.
    pub async fn find_by_username_or_email(&self, identifier: &str) -> Result<Option<User>, AuthError> {
        if let Some(user) = self.users.find_by_username(identifier).await? {
            return Ok(Some(user));
        }
        debug!("No username match, trying email");
        Ok(self.users.find_by_email(identifier).await?)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>, AuthError> {
        Ok(self.users.find_by_id(id).await?)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        Ok(self.users.find_by_email(email).await?)
    }

    pub async fn touch_last_seen(&self, user: &mut User) -> Result<(), AuthError> {
        let now = self.clock.now();
        self.users.touch_last_seen(user.id, now).await?;
        user.last_seen = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::SystemClock, repositories::memory::MemoryUserStore};

    fn store() -> CredentialStore {
        CredentialStore::new(Arc::new(MemoryUserStore::default()), Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn lookup_by_username_or_email() {
        let store = store();
        let alice = store
            .register("alice", "bob@example.com", "correct horse")
            .await
            .unwrap();

        let by_name = store.find_by_username_or_email("alice").await.unwrap();
        let by_email = store.find_by_username_or_email("bob@example.com").await.unwrap();
        assert_eq!(by_name.map(|u| u.id), Some(alice.id));
        assert_eq!(by_email.map(|u| u.id), Some(alice.id));
        assert!(store.find_by_username_or_email("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn username_wins_over_email() {
        let store = store();
        let first = store
            .register("carol", "dave@example.com", "password-one")
            .await
            .unwrap();
        // A username that looks like someone else's email.
        let second = store
            .users
            .create(&NewUser {
                username: "dave@example.com".into(),
                email: "other@example.com".into(),
                password_hash: password::hash_password("password-two").unwrap(),
            })
            .await
            .unwrap();

        let found = store
            .find_by_username_or_email("dave@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, second.id);
        assert_ne!(found.id, first.id);
    }

    #[tokio::test]
    async fn passwords_are_hashed_and_checked() {
        let store = store();
        let mut user = store
            .register("erin", "erin@example.com", "first password")
            .await
            .unwrap();

        assert_ne!(user.password_hash, "first password");
        assert!(store.check_password(&user, "first password"));
        assert!(!store.check_password(&user, "second password"));

        store.set_password(&mut user, "second password").await.unwrap();
        assert!(store.check_password(&user, "second password"));
        assert!(!store.check_password(&user, "first password"));

        let reloaded = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(store.check_password(&reloaded, "second password"));
    }

    #[tokio::test]
    async fn duplicates_are_conflicts() {
        let store = store();
        store
            .register("frank", "frank@example.com", "password123")
            .await
            .unwrap();

        let same_name = store.register("frank", "other@example.com", "password123").await;
        assert!(matches!(same_name, Err(AuthError::Conflict(msg)) if msg.contains("users_username_key")));

        let same_email = store.register("frankie", "frank@example.com", "password123").await;
        assert!(matches!(same_email, Err(AuthError::Conflict(_))));
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_storage() {
        let store = store();
        assert!(matches!(
            store.register("x", "x@example.com", "password123").await,
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            store.register("grace", "not-an-email", "password123").await,
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            store.register("grace", "grace@example.com", "short").await,
            Err(AuthError::Validation(_))
        ));
        assert!(store.find_by_username_or_email("grace").await.unwrap().is_none());
    }
}
