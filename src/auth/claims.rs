use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT payload carried by the session cookie.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String, // user ID
    pub email: String,
    pub iat: i64, // issued at (unix timestamp)
    pub exp: i64, // expires at (unix timestamp)
    pub iss: String,
    pub aud: String,
    pub jti: Uuid, // denylist key
}

/// The user a validated session belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub email: String,
}

impl Claims {
    /// `None` when `sub` is not a user id, which only a forged or foreign token produces.
    pub fn identity(&self) -> Option<Identity> {
        let user_id = self.sub.parse::<i64>().ok()?;
        Some(Identity {
            user_id,
            email: self.email.clone(),
        })
    }
}

/// A validated session: who it belongs to and what is needed to revoke it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub identity: Identity,
    pub jti: Uuid,
    pub expires_at: i64,
}

impl Session {
    pub fn from_claims(claims: &Claims) -> Option<Self> {
        Some(Self {
            identity: claims.identity()?,
            jti: claims.jti,
            expires_at: claims.exp,
        })
    }
}
