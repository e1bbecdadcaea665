use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

use crate::auth::dto::PublicUser;
use crate::auth::repo::map_missing_ref;
use crate::error::StoreError;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub content: String,
    pub author_id: i64, // owner
    #[serde(rename = "comment_count")]
    pub comment_count: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostWithAuthor {
    #[serde(flatten)]
    pub post: Post,
    pub author: PublicUser,
}

#[derive(Debug, FromRow)]
struct PostAuthorRow {
    id: i64,
    title: String,
    description: String,
    content: String,
    author_id: i64,
    comment_count: i32,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    author_name: String,
    author_email: String,
}

impl From<PostAuthorRow> for PostWithAuthor {
    fn from(r: PostAuthorRow) -> Self {
        Self {
            author: PublicUser {
                id: r.author_id,
                name: r.author_name,
                email: r.author_email,
            },
            post: Post {
                id: r.id,
                title: r.title,
                description: r.description,
                content: r.content,
                author_id: r.author_id,
                comment_count: r.comment_count,
                created_at: r.created_at,
                updated_at: r.updated_at,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub description: String,
    pub content: String,
    pub author_id: i64,
}

#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
}

#[async_trait]
pub trait PostStore: Send + Sync + 'static {
    /// Newest first.
    async fn list_page(&self, limit: i64, offset: i64) -> Result<Vec<PostWithAuthor>, StoreError>;

    async fn count(&self) -> Result<i64, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<Post>, StoreError>;

    async fn create(&self, post: NewPost) -> Result<Post, StoreError>;

    async fn update(&self, id: i64, changes: PostChanges) -> Result<Post, StoreError>;

    async fn delete(&self, id: i64) -> Result<(), StoreError>;
}

pub struct PgPostStore {
    db: PgPool,
}

impl PgPostStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn list_page(&self, limit: i64, offset: i64) -> Result<Vec<PostWithAuthor>, StoreError> {
        let rows = sqlx::query_as::<_, PostAuthorRow>(
            r#"
            SELECT p.id, p.title, p.description, p.content, p.author_id, p.comment_count,
                   p.created_at, p.updated_at,
                   u.name AS author_name, u.email AS author_email
              FROM posts p
              JOIN users u ON u.id = p.author_id
             ORDER BY p.created_at DESC, p.id DESC
             LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(PostWithAuthor::from).collect())
    }

    async fn count(&self) -> Result<i64, StoreError> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.db)
            .await?;
        Ok(n)
    }

    async fn get(&self, id: i64) -> Result<Option<Post>, StoreError> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, title, description, content, author_id, comment_count, created_at, updated_at
              FROM posts
             WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(post)
    }

    async fn create(&self, post: NewPost) -> Result<Post, StoreError> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (title, description, content, author_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, title, description, content, author_id, comment_count, created_at, updated_at
            "#,
        )
        .bind(&post.title)
        .bind(&post.description)
        .bind(&post.content)
        .bind(post.author_id)
        .fetch_one(&self.db)
        .await
        .map_err(map_missing_ref)?;
        Ok(post)
    }

    async fn update(&self, id: i64, changes: PostChanges) -> Result<Post, StoreError> {
        sqlx::query_as::<_, Post>(
            r#"
            UPDATE posts
               SET title = COALESCE($2, title),
                   description = COALESCE($3, description),
                   content = COALESCE($4, content),
                   updated_at = now()
             WHERE id = $1
            RETURNING id, title, description, content, author_id, comment_count, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(changes.title)
        .bind(changes.description)
        .bind(changes.content)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let res = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
