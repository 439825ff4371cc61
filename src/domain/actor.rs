//! Verified caller identity handed in by the authentication layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::UserId;
use crate::error::LedgerError;

/// Capability level of an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular community member.
    User,
    /// Store owner who publishes deals and redeems tickets.
    Partner,
    /// Moderator with balance adjustment rights.
    Admin,
}

impl Role {
    /// Returns the role as a static string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Partner => "partner",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "partner" => Ok(Self::Partner),
            "admin" => Ok(Self::Admin),
            other => Err(LedgerError::Validation(format!("unknown role: {other}"))),
        }
    }
}

/// An authenticated caller.
///
/// The core trusts this value: signature checks and session handling
/// happen before it is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// Caller's user id.
    pub id: UserId,
    /// Caller's email, recorded on admin adjustments.
    pub email: String,
    /// Caller's capability level.
    pub role: Role,
}

impl Actor {
    /// Creates a new actor.
    #[must_use]
    pub fn new(id: UserId, email: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            email: email.into(),
            role,
        }
    }

    /// Returns `true` if the caller holds admin capability.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Fails with [`LedgerError::Unauthorized`] unless the caller is an admin.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthorized`] for non-admin callers.
    pub fn require_admin(&self) -> Result<(), LedgerError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized(format!(
                "{} capability required, caller is {}",
                Role::Admin,
                self.role
            )))
        }
    }

    /// Fails with [`LedgerError::Unauthorized`] unless the caller is a
    /// partner. Admins may act on behalf of partners.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthorized`] for plain users.
    pub fn require_partner(&self) -> Result<(), LedgerError> {
        match self.role {
            Role::Partner | Role::Admin => Ok(()),
            Role::User => Err(LedgerError::Unauthorized(format!(
                "{} capability required, caller is {}",
                Role::Partner,
                self.role
            ))),
        }
    }
}
