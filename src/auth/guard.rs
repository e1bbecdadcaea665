use tracing::warn;

use crate::{auth::claims::Identity, error::ApiError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny,
}

/// Owner-only rule: no roles, no delegation.
pub fn authorize(acting: i64, owner: i64) -> Access {
    if acting == owner {
        Access::Allow
    } else {
        Access::Deny
    }
}

pub fn ensure_owner(identity: &Identity, owner: i64) -> Result<(), ApiError> {
    match authorize(identity.user_id, owner) {
        Access::Allow => Ok(()),
        Access::Deny => {
            warn!(acting = identity.user_id, owner, "mutation denied for non-owner");
            Err(ApiError::Forbidden)
        }
    }
}
