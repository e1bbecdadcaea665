use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::{info, instrument};

use super::repo::{Comment, NewComment};
use crate::{
    auth::{
        dto::MessageResponse,
        extractors::{require_session, AuthUser},
        guard::ensure_owner,
    },
    error::{ApiError, ApiResult, StoreError},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub comment: String,
}

pub fn read_routes() -> Router<AppState> {
    Router::new().route("/posts/:id/comments", get(list_comments))
}

pub fn write_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/posts/:id/comments", post(create_comment))
        .route("/comments/:id", delete(delete_comment))
        .route_layer(middleware::from_fn_with_state(state, require_session))
}

#[instrument(skip(state))]
pub async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> ApiResult<Json<Vec<Comment>>> {
    if state.posts.get(post_id).await?.is_none() {
        return Err(ApiError::NotFound("Post not found"));
    }
    Ok(Json(state.comments.list_for_post(post_id).await?))
}

#[instrument(skip(state, session, payload))]
pub async fn create_comment(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Path(post_id): Path<i64>,
    Json(payload): Json<CreateCommentRequest>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    let text = payload.comment.trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("Comment is required"));
    }
    let comment = state
        .comments
        .create(NewComment {
            post_id,
            user_id: session.identity.user_id,
            comment: text.to_string(),
        })
        .await
        .map_err(|e| match e {
            StoreError::NotFound => ApiError::NotFound("Post not found"),
            other => other.into(),
        })?;
    info!(comment_id = comment.id, post_id, "comment created");
    Ok((StatusCode::CREATED, Json(comment)))
}

#[instrument(skip(state, session))]
pub async fn delete_comment(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    let existing = state
        .comments
        .get(id)
        .await?
        .ok_or(ApiError::NotFound("Comment not found"))?;
    ensure_owner(&session.identity, existing.user_id)?;

    state.comments.delete(id).await.map_err(|e| match e {
        StoreError::NotFound => ApiError::NotFound("Comment not found"),
        other => other.into(),
    })?;
    info!(comment_id = id, "comment deleted");
    Ok(Json(MessageResponse {
        message: "Comment deleted successfully",
    }))
}
