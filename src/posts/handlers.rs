use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{info, instrument};

use super::{
    dto::{
        total_pages, CreatePostRequest, PageQuery, PostDetails, PostPage, UpdatePostRequest,
        PAGE_SIZE,
    },
    repo::{NewPost, Post, PostChanges},
};
use crate::{
    auth::{
        dto::MessageResponse,
        extractors::{require_session, AuthUser, MaybeAuthUser},
        guard::{authorize, ensure_owner, Access},
    },
    error::{ApiError, ApiResult, StoreError},
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts))
        .route("/posts/:id", get(get_post))
}

pub fn write_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/posts", post(create_post))
        .route("/posts/:id", put(update_post).delete(delete_post))
        .route_layer(middleware::from_fn_with_state(state, require_session))
}

fn required_text(raw: &str, what: &'static str) -> ApiResult<String> {
    let v = raw.trim();
    if v.is_empty() {
        return Err(ApiError::BadRequest(what));
    }
    Ok(v.to_string())
}

async fn load_post(state: &AppState, id: i64) -> ApiResult<Post> {
    state
        .posts
        .get(id)
        .await?
        .ok_or(ApiError::NotFound("Post not found"))
}

#[instrument(skip(state))]
pub async fn list_posts(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> ApiResult<Json<PostPage>> {
    let page = q.page();
    let total = state.posts.count().await?;
    let data = state
        .posts
        .list_page(PAGE_SIZE, (page - 1).saturating_mul(PAGE_SIZE))
        .await?;
    Ok(Json(PostPage {
        data,
        total_pages: total_pages(total),
        current_page: page,
    }))
}

#[instrument(skip(state, viewer))]
pub async fn get_post(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<PostDetails>> {
    let post = load_post(&state, id).await?;
    let editable = viewer
        .map(|s| authorize(s.identity.user_id, post.author_id) == Access::Allow)
        .unwrap_or(false);
    Ok(Json(PostDetails { post, editable }))
}

/// The author is always the caller; a client cannot post on someone else's behalf.
#[instrument(skip(state, session, payload))]
pub async fn create_post(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Json(payload): Json<CreatePostRequest>,
) -> ApiResult<(StatusCode, Json<Post>)> {
    let new = NewPost {
        title: required_text(&payload.title, "Title is required")?,
        description: payload.description.trim().to_string(),
        content: required_text(&payload.content, "Content is required")?,
        author_id: session.identity.user_id,
    };
    let post = state.posts.create(new).await?;
    info!(post_id = post.id, author_id = post.author_id, "post created");
    Ok((StatusCode::CREATED, Json(post)))
}

#[instrument(skip(state, session, payload))]
pub async fn update_post(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdatePostRequest>,
) -> ApiResult<Json<Post>> {
    let existing = load_post(&state, id).await?;
    ensure_owner(&session.identity, existing.author_id)?;

    let changes = PostChanges {
        title: payload
            .title
            .as_deref()
            .map(|t| required_text(t, "Title is required"))
            .transpose()?,
        description: payload.description.map(|d| d.trim().to_string()),
        content: payload
            .content
            .as_deref()
            .map(|c| required_text(c, "Content is required"))
            .transpose()?,
    };
    let post = state.posts.update(id, changes).await.map_err(|e| match e {
        StoreError::NotFound => ApiError::NotFound("Post not found"),
        other => other.into(),
    })?;
    info!(post_id = post.id, "post updated");
    Ok(Json(post))
}

#[instrument(skip(state, session))]
pub async fn delete_post(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    let existing = load_post(&state, id).await?;
    ensure_owner(&session.identity, existing.author_id)?;

    state.posts.delete(id).await.map_err(|e| match e {
        StoreError::NotFound => ApiError::NotFound("Post not found"),
        other => other.into(),
    })?;
    info!(post_id = id, "post deleted");
    Ok(Json(MessageResponse {
        message: "Post deleted successfully",
    }))
}
