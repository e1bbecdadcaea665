use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;

use super::{claims::Session, cookie::session_token, services::validate_token};
use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

/// No cookie is "not authenticated" (`Ok(None)`); a cookie that fails validation is an error.
pub async fn resolve_session(state: &AppState, jar: &CookieJar) -> ApiResult<Option<Session>> {
    match session_token(jar, &state.config.cookie) {
        None => Ok(None),
        Some(token) => validate_token(state, token).await.map(Some),
    }
}

/// Middleware for protected routers: resolves the session once and stores it
/// in request extensions for the handlers behind it.
pub async fn require_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let session = resolve_session(&state, &jar)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}

/// Authenticated caller. Reads the session left by `require_session`, or
/// validates the cookie itself when mounted on an unprotected route.
pub struct AuthUser(pub Session);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<Session>() {
            return Ok(AuthUser(session.clone()));
        }
        let jar = CookieJar::from_headers(&parts.headers);
        resolve_session(state, &jar)
            .await?
            .map(AuthUser)
            .ok_or(ApiError::Unauthorized)
    }
}

/// Caller who may or may not be signed in. For public reads a stale or
/// revoked cookie counts as signed out.
pub struct MaybeAuthUser(pub Option<Session>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<Session>() {
            return Ok(MaybeAuthUser(Some(session.clone())));
        }
        let jar = CookieJar::from_headers(&parts.headers);
        match resolve_session(state, &jar).await {
            Ok(session) => Ok(MaybeAuthUser(session)),
            Err(ApiError::Unauthorized) => Ok(MaybeAuthUser(None)),
            Err(e) => Err(e),
        }
    }
}
