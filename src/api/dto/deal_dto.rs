//! Deal and payout DTOs.

use serde::Deserialize;
use utoipa::ToSchema;

/// Request body for `POST /deals`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitDealRequest {
    /// Display title.
    pub title: String,
    /// Price in points.
    pub price: i64,
}

/// Request body for `POST /partners/{id}/payouts/settle`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SettlePayoutRequest {
    /// Amount to pay out of the pending balance.
    pub amount: i64,
}
