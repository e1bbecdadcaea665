use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{
    auth::claims::{Claims, Identity},
    config::JwtConfig,
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not verify")]
    BadSignature,
    #[error("token is expired")]
    Expired,
    #[error("failed to sign token: {0}")]
    Encoding(String),
}

/// A freshly signed token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

/// Holds JWT signing and verification keys with config data.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl SessionKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::hours(cfg.ttl_hours),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, identity: &Identity) -> Result<IssuedToken, TokenError> {
        self.issue_at(identity, OffsetDateTime::now_utc())
    }

    /// Expiry is fixed here, at `issued_at + ttl`.
    pub fn issue_at(
        &self,
        identity: &Identity,
        issued_at: OffsetDateTime,
    ) -> Result<IssuedToken, TokenError> {
        let exp = issued_at
            .checked_add(self.ttl)
            .ok_or_else(|| TokenError::Encoding("expiry out of range".into()))?;
        let claims = Claims {
            sub: identity.user_id.to_string(),
            email: identity.email.clone(),
            iat: issued_at.unix_timestamp(),
            exp: exp.unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: Uuid::new_v4(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Encoding(e.to_string()))?;
        debug!(user_id = identity.user_id, jti = %claims.jti, "session token signed");
        Ok(IssuedToken { token, claims })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, OffsetDateTime::now_utc())
    }

    /// Rejects bad signatures, foreign issuer/audience, unparsable input and any `now >= exp`.
    pub fn verify_at(&self, token: &str, now: OffsetDateTime) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        // expiry is compared below against the caller's clock, with no leeway
        validation.validate_exp = false;
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => TokenError::BadSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            }
        })?;

        if now.unix_timestamp() >= data.claims.exp {
            return Err(TokenError::Expired);
        }
        debug!(sub = %data.claims.sub, jti = %data.claims.jti, "session token verified");
        Ok(data.claims)
    }
}
