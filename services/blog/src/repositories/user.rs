//! PostgreSQL user repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{DatabaseError, DatabaseResult};
use sqlx::PgPool;
use tracing::{debug, info};

use super::UserStore;
use crate::models::{NewUser, User};

const USER_COLUMNS: &str = "id, username, email, password_hash, about_me, last_seen, created_at";

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: &str, value: &str) -> DatabaseResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE {} = $1", USER_COLUMNS, column);
        sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_query)
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn create(&self, new_user: &NewUser) -> DatabaseResult<User> {
        info!("Creating new user: {}", new_user.username);

        let sql = format!(
            "INSERT INTO users (username, email, password_hash) VALUES ($1, $2, $3) RETURNING {}",
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&new_user.username)
            .bind(&new_user.email)
            .bind(&new_user.password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_query)
    }

    async fn find_by_id(&self, id: i64) -> DatabaseResult<Option<User>> {
        debug!("Finding user by ID: {}", id);

        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_query)
    }

    async fn find_by_username(&self, username: &str) -> DatabaseResult<Option<User>> {
        self.find_one("username", username).await
    }

    async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<User>> {
        self.find_one("email", email).await
    }

    async fn update_password_hash(&self, id: i64, password_hash: &str) -> DatabaseResult<()> {
        info!("Updating password for user {}", id);

        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_query)?;
        Ok(())
    }

    async fn touch_last_seen(&self, id: i64, at: DateTime<Utc>) -> DatabaseResult<()> {
        sqlx::query("UPDATE users SET last_seen = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_query)?;
        Ok(())
    }
}
