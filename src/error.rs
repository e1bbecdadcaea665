use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Failure of a persistence call, independent of the backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Every way a request can fail, mapped onto a status code and a client-safe message.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("not authenticated")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("conflict: {0}")]
    Conflict(&'static str),
    #[error("not found: {0}")]
    NotFound(&'static str),
    #[error("bad request: {0}")]
    BadRequest(&'static str),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidCredentials | ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn client_message(&self) -> &'static str {
        match self {
            ApiError::InvalidCredentials => "Invalid credentials",
            ApiError::Unauthorized => "Not authenticated",
            ApiError::Forbidden => "Forbidden",
            ApiError::Conflict(msg) | ApiError::NotFound(msg) | ApiError::BadRequest(msg) => *msg,
            ApiError::Internal(_) => "Something went wrong!",
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict => ApiError::Conflict("Resource already exists"),
            StoreError::NotFound => ApiError::NotFound("Not found"),
            StoreError::Database(e) => ApiError::Internal(anyhow::Error::new(e)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(e) = &self {
            error!(error = ?e, "request failed");
        }
        let status = self.status();
        (status, Json(json!({ "message": self.client_message() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
