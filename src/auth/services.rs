use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    auth::{
        claims::{Identity, Session},
        dto::{LoginRequest, RegisterRequest, UpdateUserRequest},
        guard::ensure_owner,
        jwt::IssuedToken,
        password::{hash_password, verify_password},
        repo_types::{NewUser, User, UserChanges},
    },
    error::{ApiError, ApiResult, StoreError},
    state::AppState,
};

const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn validated_name(raw: &str) -> ApiResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Name is required"));
    }
    Ok(name.to_string())
}

fn validated_email(raw: &str) -> ApiResult<String> {
    let email = normalize_email(raw);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::BadRequest("Invalid email"));
    }
    Ok(email)
}

fn validated_password(raw: &str) -> ApiResult<&str> {
    if raw.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest("Password too short"));
    }
    Ok(raw)
}

fn email_taken(e: StoreError) -> ApiError {
    match e {
        StoreError::Conflict => ApiError::Conflict("Email already registered"),
        other => other.into(),
    }
}

fn issue_for(state: &AppState, user: &User) -> ApiResult<IssuedToken> {
    let identity = Identity {
        user_id: user.id,
        email: user.email.clone(),
    };
    state
        .keys
        .issue(&identity)
        .context("sign session token")
        .map_err(ApiError::Internal)
}

pub async fn register(state: &AppState, req: RegisterRequest) -> ApiResult<(User, IssuedToken)> {
    let name = validated_name(&req.name)?;
    let email = validated_email(&req.email)?;
    let password = validated_password(&req.password)?;

    let password_hash = hash_password(password)?;
    let user = state
        .users
        .insert(NewUser {
            name,
            email,
            password_hash,
        })
        .await
        .map_err(|e| {
            if matches!(e, StoreError::Conflict) {
                warn!("email already registered");
            }
            email_taken(e)
        })?;

    let issued = issue_for(state, &user)?;
    info!(user_id = user.id, "user registered");
    Ok((user, issued))
}

/// Unknown email and wrong password both end in the same `InvalidCredentials`.
pub async fn login(state: &AppState, req: LoginRequest) -> ApiResult<(User, IssuedToken)> {
    let email = normalize_email(&req.email);

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!("login for unknown email");
        return Err(ApiError::InvalidCredentials);
    };

    if !verify_password(&req.password, &user.password_hash) {
        warn!(user_id = user.id, "login with invalid password");
        return Err(ApiError::InvalidCredentials);
    }

    let issued = issue_for(state, &user)?;
    info!(user_id = user.id, "user logged in");
    Ok((user, issued))
}

/// Verifies a presented token, checks it against the denylist and that its user still exists.
pub async fn validate_token(state: &AppState, token: &str) -> ApiResult<Session> {
    let claims = state.keys.verify(token).map_err(|e| {
        warn!(error = %e, "session token rejected");
        ApiError::Unauthorized
    })?;
    let Some(session) = Session::from_claims(&claims) else {
        warn!(sub = %claims.sub, "session token carries a non-numeric subject");
        return Err(ApiError::Unauthorized);
    };
    if state.revocations.is_revoked(session.jti).await? {
        warn!(jti = %session.jti, user_id = session.identity.user_id, "revoked session token presented");
        return Err(ApiError::Unauthorized);
    }
    if state.users.find_by_id(session.identity.user_id).await?.is_none() {
        warn!(user_id = session.identity.user_id, "session token for a deleted user");
        return Err(ApiError::Unauthorized);
    }
    Ok(session)
}

pub async fn revoke(state: &AppState, session: &Session) -> ApiResult<()> {
    let expires_at = OffsetDateTime::from_unix_timestamp(session.expires_at)
        .context("session expiry out of range")?;
    state.revocations.revoke(session.jti, expires_at).await?;
    info!(user_id = session.identity.user_id, jti = %session.jti, "session revoked");
    Ok(())
}

/// Best effort: an absent or already-invalid token needs no revocation.
pub async fn logout(state: &AppState, token: Option<&str>) -> ApiResult<()> {
    let Some(token) = token else {
        return Ok(());
    };
    match validate_token(state, token).await {
        Ok(session) => revoke(state, &session).await,
        Err(ApiError::Unauthorized) => Ok(()),
        Err(e) => Err(e),
    }
}

pub async fn current_user(state: &AppState, identity: &Identity) -> ApiResult<User> {
    state
        .users
        .find_by_id(identity.user_id)
        .await?
        .ok_or(ApiError::NotFound("User not found"))
}

pub async fn list_users(state: &AppState) -> ApiResult<Vec<User>> {
    Ok(state.users.list().await?)
}

/// Owner-only; the old session is revoked before the write and a token carrying the new email is issued.
pub async fn update_profile(
    state: &AppState,
    session: &Session,
    target_id: i64,
    req: UpdateUserRequest,
) -> ApiResult<(User, IssuedToken)> {
    ensure_owner(&session.identity, target_id)?;

    let mut changes = UserChanges::default();
    if let Some(name) = req.name.as_deref() {
        changes.name = Some(validated_name(name)?);
    }
    if let Some(email) = req.email.as_deref() {
        changes.email = Some(validated_email(email)?);
    }
    if let Some(password) = req.password.as_deref() {
        changes.password_hash = Some(hash_password(validated_password(password)?)?);
    }
    if changes.name.is_none() && changes.email.is_none() && changes.password_hash.is_none() {
        return Err(ApiError::BadRequest("Nothing to update"));
    }

    if let Some(email) = changes.email.as_deref() {
        if let Some(owner) = state.users.find_by_email(email).await? {
            if owner.id != target_id {
                return Err(ApiError::Conflict("Email already registered"));
            }
        }
    }

    revoke(state, session).await?;
    let user = state.users.update(target_id, changes).await.map_err(|e| match e {
        StoreError::NotFound => ApiError::NotFound("User not found"),
        other => email_taken(other),
    })?;
    let issued = issue_for(state, &user)?;
    info!(user_id = user.id, "user updated");
    Ok((user, issued))
}

pub async fn delete_account(state: &AppState, session: &Session, target_id: i64) -> ApiResult<()> {
    ensure_owner(&session.identity, target_id)?;
    revoke(state, session).await?;
    state.users.delete(target_id).await.map_err(|e| match e {
        StoreError::NotFound => ApiError::NotFound("User not found"),
        other => other.into(),
    })?;
    info!(user_id = target_id, "user deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_req(name: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            name: name.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    fn login_req(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.into(),
            password: password.into(),
        }
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("two@@b.com"));
        assert!(!is_valid_email("spa ce@b.com"));
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }

    #[tokio::test]
    async fn register_then_login_then_validate_yields_registered_id() {
        let state = AppState::fake();
        let (user, _) = register(&state, register_req("Alice", "alice@example.com", "password123"))
            .await
            .expect("register");

        let (logged_in, issued) = login(&state, login_req("alice@example.com", "password123"))
            .await
            .expect("login");
        assert_eq!(logged_in.id, user.id);

        let session = validate_token(&state, &issued.token).await.expect("validate");
        assert_eq!(session.identity.user_id, user.id);
        assert_eq!(session.identity.email, "alice@example.com");
    }

    #[tokio::test]
    async fn duplicate_email_conflicts_and_keeps_first_user() {
        let state = AppState::fake();
        let (first, _) = register(&state, register_req("First", "dup@example.com", "password123"))
            .await
            .unwrap();

        let err = register(&state, register_req("Second", "DUP@example.com ", "otherpass99"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));

        let stored = state.users.find_by_email("dup@example.com").await.unwrap().unwrap();
        assert_eq!(stored.id, first.id);
        assert_eq!(stored.name, "First");
        assert!(verify_password("password123", &stored.password_hash));
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_are_indistinguishable() {
        let state = AppState::fake();
        register(&state, register_req("Bob", "bob@example.com", "password123"))
            .await
            .unwrap();

        let wrong_pw = login(&state, login_req("bob@example.com", "not-the-password"))
            .await
            .unwrap_err();
        let unknown = login(&state, login_req("nobody@example.com", "password123"))
            .await
            .unwrap_err();

        assert!(matches!(wrong_pw, ApiError::InvalidCredentials));
        assert!(matches!(unknown, ApiError::InvalidCredentials));
        assert_eq!(wrong_pw.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn register_rejects_bad_input() {
        let state = AppState::fake();
        let cases = [
            register_req("", "a@example.com", "password123"),
            register_req("A", "not-an-email", "password123"),
            register_req("A", "a@example.com", "short"),
        ];
        for req in cases {
            assert!(matches!(register(&state, req).await, Err(ApiError::BadRequest(_))));
        }
    }

    #[tokio::test]
    async fn logout_revokes_token() {
        let state = AppState::fake();
        let (_, issued) = register(&state, register_req("Carol", "carol@example.com", "password123"))
            .await
            .unwrap();
        assert!(validate_token(&state, &issued.token).await.is_ok());

        logout(&state, Some(&issued.token)).await.unwrap();
        assert!(matches!(
            validate_token(&state, &issued.token).await,
            Err(ApiError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn logout_without_or_with_garbage_token_is_ok() {
        let state = AppState::fake();
        assert!(logout(&state, None).await.is_ok());
        assert!(logout(&state, Some("garbage")).await.is_ok());
    }

    #[tokio::test]
    async fn update_profile_is_owner_only_and_rehashes_password() {
        let state = AppState::fake();
        let (alice, a_tok) = register(&state, register_req("Alice", "alice@example.com", "password123"))
            .await
            .unwrap();
        let (bob, _) = register(&state, register_req("Bob", "bob@example.com", "password123"))
            .await
            .unwrap();
        let a_session = validate_token(&state, &a_tok.token).await.unwrap();

        let denied = update_profile(
            &state,
            &a_session,
            bob.id,
            UpdateUserRequest {
                name: Some("Mallory".into()),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(denied, Err(ApiError::Forbidden)));

        let (updated, new_tok) = update_profile(
            &state,
            &a_session,
            alice.id,
            UpdateUserRequest {
                password: Some("new-password-1".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_ne!(updated.password_hash, alice.password_hash);
        assert!(verify_password("new-password-1", &updated.password_hash));

        // old token revoked, new one valid
        assert!(validate_token(&state, &a_tok.token).await.is_err());
        assert!(validate_token(&state, &new_tok.token).await.is_ok());
    }

    #[tokio::test]
    async fn update_profile_to_taken_email_conflicts() {
        let state = AppState::fake();
        let (alice, a_tok) = register(&state, register_req("Alice", "alice@example.com", "password123"))
            .await
            .unwrap();
        register(&state, register_req("Bob", "bob@example.com", "password123"))
            .await
            .unwrap();
        let session = validate_token(&state, &a_tok.token).await.unwrap();

        let res = update_profile(
            &state,
            &session,
            alice.id,
            UpdateUserRequest {
                email: Some("bob@example.com".into()),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(res, Err(ApiError::Conflict(_))));
        // a rejected update leaves the caller signed in
        assert!(validate_token(&state, &a_tok.token).await.is_ok());
    }

    #[tokio::test]
    async fn delete_account_removes_user_and_revokes_session() {
        let state = AppState::fake();
        let (alice, tok) = register(&state, register_req("Alice", "alice@example.com", "password123"))
            .await
            .unwrap();
        let session = validate_token(&state, &tok.token).await.unwrap();

        delete_account(&state, &session, alice.id).await.unwrap();
        assert!(state.users.find_by_id(alice.id).await.unwrap().is_none());
        assert!(validate_token(&state, &tok.token).await.is_err());
    }

    #[tokio::test]
    async fn tokens_of_a_deleted_user_stop_validating() {
        let state = AppState::fake();
        let (alice, first) = register(&state, register_req("Alice", "alice@example.com", "password123"))
            .await
            .unwrap();
        let (_, second) = login(&state, login_req("alice@example.com", "password123"))
            .await
            .unwrap();
        let session = validate_token(&state, &first.token).await.unwrap();

        delete_account(&state, &session, alice.id).await.unwrap();
        assert!(!state.revocations.is_revoked(second.claims.jti).await.unwrap());
        assert!(matches!(
            validate_token(&state, &second.token).await,
            Err(ApiError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn expired_revocations_are_purged_on_the_next_revoke() {
        let state = AppState::fake();
        let stale = uuid::Uuid::new_v4();
        let live = uuid::Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        state
            .revocations
            .revoke(stale, now - time::Duration::hours(1))
            .await
            .unwrap();
        assert!(state.revocations.is_revoked(stale).await.unwrap());

        state
            .revocations
            .revoke(live, now + time::Duration::hours(1))
            .await
            .unwrap();
        assert!(!state.revocations.is_revoked(stale).await.unwrap());
        assert!(state.revocations.is_revoked(live).await.unwrap());
    }
}
