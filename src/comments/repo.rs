use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

use crate::auth::repo::map_missing_ref;
use crate::error::StoreError;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64, // owner
    pub comment: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: i64,
    pub user_id: i64,
    pub comment: String,
}

/// Keeps `posts.comment_count` in step with inserts and deletes.
#[async_trait]
pub trait CommentStore: Send + Sync + 'static {
    /// Oldest first.
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<Comment>, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<Comment>, StoreError>;

    /// `NotFound` when the post or the commenting user does not exist.
    async fn create(&self, comment: NewComment) -> Result<Comment, StoreError>;

    async fn delete(&self, id: i64) -> Result<(), StoreError>;
}

pub struct PgCommentStore {
    db: PgPool,
}

impl PgCommentStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CommentStore for PgCommentStore {
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<Comment>, StoreError> {
        let rows = sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, post_id, user_id, comment, created_at
              FROM comments
             WHERE post_id = $1
             ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn get(&self, id: i64) -> Result<Option<Comment>, StoreError> {
        let row = sqlx::query_as::<_, Comment>(
            "SELECT id, post_id, user_id, comment, created_at FROM comments WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn create(&self, comment: NewComment) -> Result<Comment, StoreError> {
        let mut tx = self.db.begin().await?;

        let bumped = sqlx::query("UPDATE posts SET comment_count = comment_count + 1 WHERE id = $1")
            .bind(comment.post_id)
            .execute(&mut *tx)
            .await?;
        if bumped.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        let row = sqlx::query_as::<_, Comment>(
            r#"
            INSERT INTO comments (post_id, user_id, comment)
            VALUES ($1, $2, $3)
            RETURNING id, post_id, user_id, comment, created_at
            "#,
        )
        .bind(comment.post_id)
        .bind(comment.user_id)
        .bind(&comment.comment)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_missing_ref)?;

        tx.commit().await?;
        Ok(row)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let mut tx = self.db.begin().await?;

        let removed: Option<(i64,)> =
            sqlx::query_as("DELETE FROM comments WHERE id = $1 RETURNING post_id")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((post_id,)) = removed else {
            return Err(StoreError::NotFound);
        };

        sqlx::query(
            "UPDATE posts SET comment_count = GREATEST(comment_count - 1, 0) WHERE id = $1",
        )
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
