//! In-memory implementation of every store trait, used by the test suite.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::dto::PublicUser;
use crate::auth::repo::UserStore;
use crate::auth::repo_types::{NewUser, User, UserChanges};
use crate::auth::revocation::RevocationStore;
use crate::comments::repo::{Comment, CommentStore, NewComment};
use crate::error::StoreError;
use crate::posts::repo::{NewPost, Post, PostChanges, PostStore, PostWithAuthor};

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<i64, User>,
    posts: BTreeMap<i64, Post>,
    comments: BTreeMap<i64, Comment>,
    revoked: HashMap<Uuid, OffsetDateTime>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    fn with<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        let mut t = self.tables.lock().expect("memory store poisoned");
        f(&mut t)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.with(|t| t.users.values().find(|u| u.email == email).cloned()))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.with(|t| t.users.get(&id).cloned()))
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.with(|t| t.users.values().cloned().collect()))
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        self.with(|t| {
            if t.email_taken(&user.email, None) {
                return Err(StoreError::Conflict);
            }
            let row = User {
                id: t.next_id(),
                name: user.name,
                email: user.email,
                password_hash: user.password_hash,
                created_at: OffsetDateTime::now_utc(),
            };
            t.users.insert(row.id, row.clone());
            Ok(row)
        })
    }

    async fn update(&self, id: i64, changes: UserChanges) -> Result<User, StoreError> {
        self.with(|t| {
            if let Some(email) = &changes.email {
                if t.email_taken(email, Some(id)) {
                    return Err(StoreError::Conflict);
                }
            }
            let user = t.users.get_mut(&id).ok_or(StoreError::NotFound)?;
            if let Some(name) = changes.name {
                user.name = name;
            }
            if let Some(email) = changes.email {
                user.email = email;
            }
            if let Some(hash) = changes.password_hash {
                user.password_hash = hash;
            }
            Ok(user.clone())
        })
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.with(|t| {
            t.users.remove(&id).ok_or(StoreError::NotFound)?;
            t.posts.retain(|_, p| p.author_id != id);
            let posts = &t.posts;
            t.comments
                .retain(|_, c| c.user_id != id && posts.contains_key(&c.post_id));
            for post in t.posts.values_mut() {
                post.comment_count =
                    t.comments.values().filter(|c| c.post_id == post.id).count() as i32;
            }
            Ok(())
        })
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn list_page(&self, limit: i64, offset: i64) -> Result<Vec<PostWithAuthor>, StoreError> {
        Ok(self.with(|t| {
            t.posts
                .values()
                .rev()
                .skip(offset.max(0) as usize)
                .take(limit.max(0) as usize)
                .filter_map(|p| {
                    let author = t.users.get(&p.author_id)?;
                    Some(PostWithAuthor {
                        post: p.clone(),
                        author: PublicUser::from(author.clone()),
                    })
                })
                .collect()
        }))
    }

    async fn count(&self) -> Result<i64, StoreError> {
        Ok(self.with(|t| t.posts.len() as i64))
    }

    async fn get(&self, id: i64) -> Result<Option<Post>, StoreError> {
        Ok(self.with(|t| t.posts.get(&id).cloned()))
    }

    async fn create(&self, post: NewPost) -> Result<Post, StoreError> {
        self.with(|t| {
            if !t.users.contains_key(&post.author_id) {
                return Err(StoreError::NotFound);
            }
            let now = OffsetDateTime::now_utc();
            let row = Post {
                id: t.next_id(),
                title: post.title,
                description: post.description,
                content: post.content,
                author_id: post.author_id,
                comment_count: 0,
                created_at: now,
                updated_at: now,
            };
            t.posts.insert(row.id, row.clone());
            Ok(row)
        })
    }

    async fn update(&self, id: i64, changes: PostChanges) -> Result<Post, StoreError> {
        self.with(|t| {
            let post = t.posts.get_mut(&id).ok_or(StoreError::NotFound)?;
            if let Some(title) = changes.title {
                post.title = title;
            }
            if let Some(description) = changes.description {
                post.description = description;
            }
            if let Some(content) = changes.content {
                post.content = content;
            }
            post.updated_at = OffsetDateTime::now_utc();
            Ok(post.clone())
        })
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.with(|t| {
            t.posts.remove(&id).ok_or(StoreError::NotFound)?;
            t.comments.retain(|_, c| c.post_id != id);
            Ok(())
        })
    }
}

#[async_trait]
impl CommentStore for MemoryStore {
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<Comment>, StoreError> {
        Ok(self.with(|t| {
            t.comments
                .values()
                .filter(|c| c.post_id == post_id)
                .cloned()
                .collect()
        }))
    }

    async fn get(&self, id: i64) -> Result<Option<Comment>, StoreError> {
        Ok(self.with(|t| t.comments.get(&id).cloned()))
    }

    async fn create(&self, comment: NewComment) -> Result<Comment, StoreError> {
        self.with(|t| {
            if !t.posts.contains_key(&comment.post_id) || !t.users.contains_key(&comment.user_id) {
                return Err(StoreError::NotFound);
            }
            let row = Comment {
                id: t.next_id(),
                post_id: comment.post_id,
                user_id: comment.user_id,
                comment: comment.comment,
                created_at: OffsetDateTime::now_utc(),
            };
            if let Some(post) = t.posts.get_mut(&row.post_id) {
                post.comment_count += 1;
            }
            t.comments.insert(row.id, row.clone());
            Ok(row)
        })
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.with(|t| {
            let removed = t.comments.remove(&id).ok_or(StoreError::NotFound)?;
            if let Some(post) = t.posts.get_mut(&removed.post_id) {
                post.comment_count = (post.comment_count - 1).max(0);
            }
            Ok(())
        })
    }
}

#[async_trait]
impl RevocationStore for MemoryStore {
    async fn revoke(&self, jti: Uuid, expires_at: OffsetDateTime) -> Result<(), StoreError> {
        self.with(|t| {
            let now = OffsetDateTime::now_utc();
            t.revoked.retain(|_, exp| *exp > now);
            t.revoked.insert(jti, expires_at);
        });
        Ok(())
    }

    async fn is_revoked(&self, jti: Uuid) -> Result<bool, StoreError> {
        Ok(self.with(|t| t.revoked.contains_key(&jti)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed_user(store: &MemoryStore, email: &str) -> User {
        UserStore::insert(
            store,
            NewUser {
                name: "Someone".into(),
                email: email.into(),
                password_hash: "hash".into(),
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn comment_by_unknown_user_is_not_found() {
        let store = MemoryStore::default();
        let author = seed_user(&store, "author@example.com").await;
        let post = PostStore::create(
            &store,
            NewPost {
                title: "t".into(),
                description: String::new(),
                content: "c".into(),
                author_id: author.id,
            },
        )
        .await
        .unwrap();

        let res = CommentStore::create(
            &store,
            NewComment {
                post_id: post.id,
                user_id: 999,
                comment: "ghost".into(),
            },
        )
        .await;
        assert!(matches!(res, Err(StoreError::NotFound)));
        let post = PostStore::get(&store, post.id).await.unwrap().unwrap();
        assert_eq!(post.comment_count, 0);
    }
}
