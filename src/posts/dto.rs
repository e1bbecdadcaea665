use serde::{Deserialize, Serialize};

use super::repo::{Post, PostWithAuthor};

pub const PAGE_SIZE: i64 = 10;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

impl PageQuery {
    /// Anything that is not a positive integer falls back to page 1.
    pub fn page(&self) -> i64 {
        self.page
            .as_deref()
            .and_then(|p| p.trim().parse::<i64>().ok())
            .filter(|p| *p >= 1)
            .unwrap_or(1)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPage {
    pub data: Vec<PostWithAuthor>,
    pub total_pages: i64,
    pub current_page: i64,
}

pub fn total_pages(total: i64) -> i64 {
    (total + PAGE_SIZE - 1) / PAGE_SIZE
}

#[derive(Debug, Serialize)]
pub struct PostDetails {
    #[serde(flatten)]
    pub post: Post,
    /// True when the caller owns the post and may edit or delete it.
    pub editable: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
}
