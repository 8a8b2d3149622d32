//! PostgreSQL post repository

use async_trait::async_trait;
use common::{DatabaseError, DatabaseResult};
use search::{SearchError, SearchResult, SearchableStore};
use sqlx::PgPool;
use tracing::info;

use super::UnitOfWork;
use crate::error::AuthError;
use crate::models::{NewPost, Post};

/// Post repository
///
/// Writes go through a [`UnitOfWork`] so the index follows the commit.
/// Reads use the pool directly.
#[derive(Clone)]
pub struct PostRepository {
    pool: PgPool,
}

impl PostRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        uow: &mut UnitOfWork,
        author_id: i64,
        new_post: &NewPost,
    ) -> Result<Post, AuthError> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (user_id, body, language)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, body, language, timestamp
            "#,
        )
        .bind(author_id)
        .bind(&new_post.body)
        .bind(&new_post.language)
        .fetch_one(uow.connection())
        .await
        .map_err(DatabaseError::from_query)?;

        uow.changes().added(&post).map_err(tracking_error)?;
        info!("User {} created post {}", author_id, post.id);
        Ok(post)
    }

    pub async fn delete(&self, uow: &mut UnitOfWork, post: &Post) -> Result<(), AuthError> {
        sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(post.id)
            .execute(uow.connection())
            .await
            .map_err(DatabaseError::from_query)?;

        uow.changes().deleted(post).map_err(tracking_error)?;
        info!("Deleted post {}", post.id);
        Ok(())
    }

    pub async fn find_by_id(&self, id: i64) -> DatabaseResult<Option<Post>> {
        sqlx::query_as::<_, Post>(
            "SELECT id, user_id, body, language, timestamp FROM posts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_query)
    }
}

fn tracking_error(err: SearchError) -> AuthError {
    AuthError::Internal(format!("Failed to track searchable change: {}", err))
}

#[async_trait]
impl SearchableStore<Post> for PostRepository {
    async fn fetch_by_ids(&self, ids: &[i64]) -> SearchResult<Vec<Post>> {
        sqlx::query_as::<_, Post>(
            "SELECT id, user_id, body, language, timestamp FROM posts WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(SearchError::store)
    }

    async fn fetch_all(&self) -> SearchResult<Vec<Post>> {
        sqlx::query_as::<_, Post>("SELECT id, user_id, body, language, timestamp FROM posts ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(SearchError::store)
    }
}
