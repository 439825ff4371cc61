//! Registration, ledger and adjustment DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::PaginationMeta;
use crate::domain::{CustomerId, TransactionEntry, UserId};

/// Request body for `POST /users`. The user id and email come from the
/// caller's identity headers.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RegisterRequest {
    /// Referring user.
    #[serde(default)]
    pub referrer_id: Option<UserId>,
    /// Payment-provider customer id, if already known.
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
}

/// Request body for `PUT /users/{id}/customer`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LinkCustomerRequest {
    /// Payment-provider customer id.
    pub customer_id: CustomerId,
}

/// Request body for `POST /users/{id}/adjustments`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AdjustmentRequest {
    /// Signed point change.
    pub amount: i64,
    /// Why the balance is adjusted.
    pub reason: String,
}

/// Paginated transaction log.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionListResponse {
    /// Entries on this page, newest first.
    pub data: Vec<TransactionEntry>,
    /// Page metadata.
    pub pagination: PaginationMeta,
}
