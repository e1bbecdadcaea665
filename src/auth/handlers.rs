use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::instrument;

use crate::{
    auth::{
        cookie::{clear_session, session_cookie, session_token},
        dto::{LoginRequest, MessageResponse, PublicUser, RegisterRequest, UpdateUserRequest},
        extractors::{require_session, AuthUser},
        jwt::IssuedToken,
        services,
    },
    error::ApiResult,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/user/register", post(register))
        .route("/user/login", post(login))
        .route("/user/logout", post(logout))
}

pub fn user_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/user", get(get_me))
        .route("/user/all", get(list_users))
        .route("/user/:id", put(update_user).delete(delete_user))
        .route_layer(middleware::from_fn_with_state(state, require_session))
}

fn with_session(state: &AppState, jar: CookieJar, issued: IssuedToken) -> CookieJar {
    jar.add(session_cookie(&state.config.cookie, issued.token, state.keys.ttl()))
}

#[instrument(skip(state, jar, payload))]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, CookieJar, Json<PublicUser>)> {
    let (user, issued) = services::register(&state, payload).await?;
    let jar = with_session(&state, jar, issued);
    Ok((StatusCode::CREATED, jar, Json(user.into())))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<(CookieJar, Json<PublicUser>)> {
    let (user, issued) = services::login(&state, payload).await?;
    let jar = with_session(&state, jar, issued);
    Ok((jar, Json(user.into())))
}

#[instrument(skip(state, jar))]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> ApiResult<(CookieJar, Json<MessageResponse>)> {
    services::logout(&state, session_token(&jar, &state.config.cookie)).await?;
    let jar = clear_session(jar, &state.config.cookie);
    Ok((
        jar,
        Json(MessageResponse {
            message: "Logged out successfully",
        }),
    ))
}

#[instrument(skip(state, session))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
) -> ApiResult<Json<PublicUser>> {
    let user = services::current_user(&state, &session.identity).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, _session))]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(_session): AuthUser,
) -> ApiResult<Json<Vec<PublicUser>>> {
    let users = services::list_users(&state).await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state, session, jar, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Path(id): Path<i64>,
    jar: CookieJar,
    Json(payload): Json<UpdateUserRequest>,
) -> ApiResult<(CookieJar, Json<PublicUser>)> {
    let (user, issued) = services::update_profile(&state, &session, id, payload).await?;
    let jar = with_session(&state, jar, issued);
    Ok((jar, Json(user.into())))
}

#[instrument(skip(state, session, jar))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Path(id): Path<i64>,
    jar: CookieJar,
) -> ApiResult<(CookieJar, Json<MessageResponse>)> {
    services::delete_account(&state, &session, id).await?;
    let jar = clear_session(jar, &state.config.cookie);
    Ok((
        jar,
        Json(MessageResponse {
            message: "User deleted successfully",
        }),
    ))
}
