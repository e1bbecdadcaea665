use async_trait::async_trait;
use sqlx::PgPool;

use crate::auth::repo_types::{NewUser, User, UserChanges};
use crate::error::StoreError;

/// Credential store: the only persistence the auth flow needs.
#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;

    async fn list(&self) -> Result<Vec<User>, StoreError>;

    /// `Conflict` when the email is already registered.
    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;

    /// `NotFound` for an unknown id, `Conflict` when the new email is taken.
    async fn update(&self, id: i64, changes: UserChanges) -> Result<User, StoreError>;

    /// Removes the user together with their posts and comments.
    async fn delete(&self, id: i64) -> Result<(), StoreError>;
}

pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

pub(crate) fn map_unique(e: sqlx::Error) -> StoreError {
    match e.as_database_error() {
        Some(db_err) if db_err.is_unique_violation() => StoreError::Conflict,
        _ => StoreError::Database(e),
    }
}

/// A row pointing at a user or post that is already gone.
pub(crate) fn map_missing_ref(e: sqlx::Error) -> StoreError {
    match e.as_database_error() {
        Some(db_err) if db_err.is_foreign_key_violation() => StoreError::NotFound,
        _ => StoreError::Database(e),
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, created_at
            FROM users
            ORDER BY id
            "#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, name, email, password_hash, created_at
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(map_unique)
    }

    async fn update(&self, id: i64, changes: UserChanges) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
               SET name = COALESCE($2, name),
                   email = COALESCE($3, email),
                   password_hash = COALESCE($4, password_hash)
             WHERE id = $1
            RETURNING id, name, email, password_hash, created_at
            "#,
        )
        .bind(id)
        .bind(changes.name)
        .bind(changes.email)
        .bind(changes.password_hash)
        .fetch_optional(&self.db)
        .await
        .map_err(map_unique)?
        .ok_or(StoreError::NotFound)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let mut tx = self.db.begin().await?;

        // their comments on other people's posts disappear with them
        sqlx::query(
            r#"
            UPDATE posts p
               SET comment_count = GREATEST(p.comment_count - c.n, 0)
              FROM (SELECT post_id, COUNT(*)::int AS n
                      FROM comments
                     WHERE user_id = $1
                     GROUP BY post_id) c
             WHERE p.id = c.post_id
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        // posts and comments go with the user via ON DELETE CASCADE
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        tx.commit().await?;
        Ok(())
    }
}
