//! PostgreSQL token repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{DatabaseError, DatabaseResult};
use sqlx::PgPool;
use tracing::{debug, info};

use super::TokenStore;
use crate::models::{NewToken, Token};

/// Token repository
#[derive(Clone)]
pub struct TokenRepository {
    pool: PgPool,
}

impl TokenRepository {
    /// Create a new token repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for TokenRepository {
    async fn insert(&self, new_token: &NewToken) -> DatabaseResult<Token> {
        debug!("Persisting token for user {}", new_token.user_id);

        sqlx::query_as::<_, Token>(
            r#"
            INSERT INTO tokens (user_id, access_token_hash, access_expiration, refresh_token_hash, refresh_expiration)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, access_token_hash, access_expiration, refresh_token_hash, refresh_expiration
            "#,
        )
        .bind(new_token.user_id)
        .bind(&new_token.access_token_hash)
        .bind(new_token.access_expiration)
        .bind(&new_token.refresh_token_hash)
        .bind(new_token.refresh_expiration)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_query)
    }

    async fn find_by_access_hash(&self, access_token_hash: &str) -> DatabaseResult<Option<Token>> {
        sqlx::query_as::<_, Token>(
            r#"
            SELECT id, user_id, access_token_hash, access_expiration, refresh_token_hash, refresh_expiration
            FROM tokens
            WHERE access_token_hash = $1
            "#,
        )
        .bind(access_token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_query)
    }

    async fn claim_refresh(
        &self,
        id: i64,
        refresh_token_hash: &str,
        now: DateTime<Utc>,
        access_until: DateTime<Utc>,
    ) -> DatabaseResult<Option<Token>> {
        sqlx::query_as::<_, Token>(
            r#"
            UPDATE tokens
            SET access_expiration = LEAST(access_expiration, $4),
                refresh_expiration = LEAST(refresh_expiration, $3)
            WHERE id = $1 AND refresh_token_hash = $2 AND refresh_expiration > $3
            RETURNING id, user_id, access_token_hash, access_expiration, refresh_token_hash, refresh_expiration
            "#,
        )
        .bind(id)
        .bind(refresh_token_hash)
        .bind(now)
        .bind(access_until)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_query)
    }

    async fn expire(&self, id: i64, at: DateTime<Utc>) -> DatabaseResult<()> {
        sqlx::query(
            r#"
            UPDATE tokens
            SET access_expiration = LEAST(access_expiration, $2),
                refresh_expiration = LEAST(refresh_expiration, $2)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_query)?;
        Ok(())
    }

    async fn expire_all_for_user(&self, user_id: i64, at: DateTime<Utc>) -> DatabaseResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE tokens
            SET access_expiration = LEAST(access_expiration, $2),
                refresh_expiration = LEAST(refresh_expiration, $2)
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_query)?;

        Ok(result.rows_affected())
    }

    async fn delete_refresh_expired_before(&self, cutoff: DateTime<Utc>) -> DatabaseResult<u64> {
        let result = sqlx::query("DELETE FROM tokens WHERE refresh_expiration < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_query)?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            info!("Cleaned up {} expired tokens", deleted);
        }
        Ok(deleted)
    }
}
