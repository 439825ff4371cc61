//! Caller identity taken from trusted headers.
//!
//! The upstream authentication layer verifies the session and forwards
//! the caller as `x-actor-id`, `x-actor-role` and `x-actor-email`. This
//! service does no verification of its own.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::domain::{Actor, Role, UserId};
use crate::error::LedgerError;

/// Header carrying the caller's user id (UUID).
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
/// Header carrying the caller's role.
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
/// Header carrying the caller's email.
pub const ACTOR_EMAIL_HEADER: &str = "x-actor-email";

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = LedgerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(parts, ACTOR_ID_HEADER)?;
        let id = uuid::Uuid::parse_str(id)
            .map(UserId::from_uuid)
            .map_err(|_| LedgerError::Unauthorized(format!("malformed {ACTOR_ID_HEADER}")))?;
        let role: Role = header(parts, ACTOR_ROLE_HEADER)?
            .parse()
            .map_err(|_| LedgerError::Unauthorized(format!("malformed {ACTOR_ROLE_HEADER}")))?;
        let email = parts
            .headers
            .get(ACTOR_EMAIL_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        Ok(Self::new(id, email, role))
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, LedgerError> {
    parts
        .headers
        .get(name)
        .ok_or_else(|| LedgerError::Unauthorized(format!("missing {name} header")))?
        .to_str()
        .map_err(|_| LedgerError::Unauthorized(format!("malformed {name} header")))
}

/// Lets a user read their own records; admins read anyone's.
///
/// # Errors
///
/// Returns [`LedgerError::Unauthorized`] for any other caller.
pub fn ensure_self_or_admin(actor: &Actor, user_id: UserId) -> Result<(), LedgerError> {
    if actor.id == user_id || actor.is_admin() {
        Ok(())
    } else {
        Err(LedgerError::Unauthorized(
            "callers may only access their own records".to_string(),
        ))
    }
}
