//! Ledger error types with HTTP status code mapping.
//!
//! [`LedgerError`] is the central error type of the crate. Every variant
//! has a stable machine-readable kind, a numeric code, and an HTTP status,
//! and renders as a structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::persistence::StoreError;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 4001,
///     "kind": "insufficient_balance",
///     "message": "insufficient balance: usable 30, change -50"
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code, stable kind, and message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see code ranges on [`LedgerError`]).
    pub code: u32,
    /// Stable snake_case error kind.
    pub kind: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// Error enum shared by the core and the HTTP surface.
///
/// # Error Code Ranges
///
/// | Range     | Category            | HTTP Status                   |
/// |-----------|---------------------|-------------------------------|
/// | 1000–1999 | Validation          | 400 Bad Request               |
/// | 2000–2999 | Not found           | 404 Not Found                 |
/// | 3000–3999 | Server              | 500 Internal Server Error     |
/// | 4000–4999 | Business rule       | 409 Conflict / 422            |
/// | 5000–5999 | Authorization       | 403 Forbidden                 |
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Malformed or missing input, rejected before touching the store.
    #[error("invalid request: {0}")]
    Validation(String),

    /// A referenced ledger, profile, quest, review, ticket or record does
    /// not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The deal to purchase does not exist.
    #[error("deal not found: {0}")]
    DealNotFound(String),

    /// The operation is not legal from the entity's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The mutation would leave the usable balance negative.
    #[error("insufficient balance: usable {usable}, change {requested}")]
    InsufficientBalance {
        /// Usable balance at the time of the check.
        usable: i64,
        /// Signed change that was requested.
        requested: i64,
    },

    /// The buyer cannot afford the deal.
    #[error("insufficient points: usable {usable}, price {price}")]
    InsufficientPoints {
        /// Buyer's usable balance.
        usable: i64,
        /// Deal price.
        price: i64,
    },

    /// The ticket was already redeemed.
    #[error("ticket already redeemed")]
    AlreadyRedeemed,

    /// The user already has a participation record for the quest.
    #[error("quest already accepted")]
    AlreadyAccepted,

    /// The user already holds a ticket for the deal.
    #[error("deal already purchased")]
    AlreadyPurchased,

    /// The record is no longer waiting for a moderation decision.
    #[error("record is not awaiting approval")]
    NotAwaitingApproval,

    /// The quest is not accepting participants.
    #[error("quest is closed")]
    QuestClosed,

    /// The caller lacks the required capability.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The caller does not own the targeted resource.
    #[error("not owner of this resource")]
    NotOwner,

    /// Concurrent writers kept winning until the retry budget ran out.
    #[error("concurrent modification, gave up after {attempts} attempts")]
    Conflict {
        /// Number of attempts made.
        attempts: u32,
    },

    /// Storage backend failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Internal invariant failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Returns the stable snake_case kind of this error.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::DealNotFound(_) => "deal_not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::InsufficientPoints { .. } => "insufficient_points",
            Self::AlreadyRedeemed => "already_redeemed",
            Self::AlreadyAccepted => "already_accepted",
            Self::AlreadyPurchased => "already_purchased",
            Self::NotAwaitingApproval => "not_awaiting_approval",
            Self::QuestClosed => "quest_closed",
            Self::Unauthorized(_) => "unauthorized",
            Self::NotOwner => "not_owner",
            Self::Conflict { .. } => "conflict",
            Self::Persistence(_) => "persistence_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Validation(_) => 1001,
            Self::NotFound(_) => 2001,
            Self::DealNotFound(_) => 2002,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
            Self::InsufficientBalance { .. } => 4001,
            Self::InsufficientPoints { .. } => 4002,
            Self::InvalidState(_) => 4003,
            Self::AlreadyRedeemed => 4004,
            Self::AlreadyAccepted => 4005,
            Self::AlreadyPurchased => 4006,
            Self::NotAwaitingApproval => 4007,
            Self::QuestClosed => 4008,
            Self::Conflict { .. } => 4009,
            Self::Unauthorized(_) => 5001,
            Self::NotOwner => 5002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) | Self::DealNotFound(_) => StatusCode::NOT_FOUND,
            Self::InsufficientBalance { .. } | Self::InsufficientPoints { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::InvalidState(_)
            | Self::AlreadyRedeemed
            | Self::AlreadyAccepted
            | Self::AlreadyPurchased
            | Self::NotAwaitingApproval
            | Self::QuestClosed
            | Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Unauthorized(_) | Self::NotOwner => StatusCode::FORBIDDEN,
            Self::Persistence(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` if the caller may resubmit the same request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Message safe to show to callers: server-side details are replaced
    /// with a generic text.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Persistence(_) | Self::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(_) => Self::Conflict { attempts: 1 },
            StoreError::Codec(msg) => Self::Internal(msg),
            StoreError::Backend(msg) => Self::Persistence(msg),
        }
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                kind: self.kind(),
                message: self.public_message(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_errors_map_to_client_statuses() {
        assert_eq!(
            LedgerError::InsufficientBalance {
                usable: 30,
                requested: -50
            }
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            LedgerError::AlreadyRedeemed.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            LedgerError::NotOwner.status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn conflict_is_the_only_retryable_error() {
        assert!(LedgerError::Conflict { attempts: 5 }.is_retryable());
        assert!(!LedgerError::AlreadyAccepted.is_retryable());
        assert!(!LedgerError::Persistence("down".to_string()).is_retryable());
    }

    #[test]
    fn server_errors_do_not_leak_details() {
        let err = LedgerError::Persistence("password authentication failed".to_string());
        assert_eq!(err.public_message(), "internal server error");
        let err = LedgerError::NotFound("ledger abc".to_string());
        assert_eq!(err.public_message(), "not found: ledger abc");
    }

    #[test]
    fn store_errors_convert() {
        let backend: LedgerError = StoreError::Backend("timeout".to_string()).into();
        assert_eq!(backend.kind(), "persistence_error");
        let codec: LedgerError = StoreError::Codec("bad json".to_string()).into();
        assert_eq!(codec.kind(), "internal_error");
    }

    #[test]
    fn codes_fall_in_their_ranges() {
        assert_eq!(LedgerError::Validation(String::new()).error_code() / 1000, 1);
        assert_eq!(LedgerError::DealNotFound(String::new()).error_code() / 1000, 2);
        assert_eq!(LedgerError::QuestClosed.error_code() / 1000, 4);
        assert_eq!(LedgerError::Unauthorized(String::new()).error_code() / 1000, 5);
    }
}
