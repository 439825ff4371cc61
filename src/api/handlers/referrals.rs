//! Payment webhook and referral reward endpoints.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::auth::ensure_self_or_admin;
use crate::app_state::AppState;
use crate::domain::{Actor, PaymentEvent, PaymentEventId, ReferralOutcome, ReferralReward, UserId};
use crate::error::{ErrorResponse, LedgerError};

/// `POST /webhooks/payments` — Process a payment-succeeded event.
///
/// The upstream layer verifies the provider signature before the body
/// reaches this handler.
///
/// # Errors
///
/// Returns [`LedgerError::Validation`] for malformed events.
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/payments",
    tag = "Referrals",
    summary = "Payment webhook",
    description = "Records the referral commission for a renewal payment. Replays of the same event id return the stored record.",
    request_body = PaymentEvent,
    responses(
        (status = 200, description = "Outcome", body = ReferralOutcome),
        (status = 400, description = "Malformed event", body = ErrorResponse),
    )
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    Json(event): Json<PaymentEvent>,
) -> Result<Json<ReferralOutcome>, LedgerError> {
    Ok(Json(state.ledger.process_payment(event).await?))
}

/// `GET /users/{id}/referral-rewards` — Rewards earned as a referrer.
///
/// # Errors
///
/// Returns [`LedgerError`] on storage failure.
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}/referral-rewards",
    tag = "Referrals",
    summary = "List referral rewards",
    params(("id" = uuid::Uuid, Path, description = "Referrer UUID")),
    responses(
        (status = 200, description = "Rewards, newest first", body = Vec<ReferralReward>),
    )
)]
pub async fn list_rewards(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<UserId>,
) -> Result<Json<Vec<ReferralReward>>, LedgerError> {
    ensure_self_or_admin(&actor, id)?;
    Ok(Json(state.ledger.referral_rewards(id).await?))
}

/// `POST /referral-rewards/{event_id}/paid` — Mark a reward paid.
///
/// # Errors
///
/// Returns [`LedgerError`] for non-admins, unknown or already paid
/// rewards.
#[utoipa::path(
    post,
    path = "/api/v1/referral-rewards/{event_id}/paid",
    tag = "Referrals",
    summary = "Mark reward paid",
    params(("event_id" = String, Path, description = "Payment event id")),
    responses(
        (status = 200, description = "Paid reward", body = ReferralReward),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
        (status = 404, description = "Reward not found", body = ErrorResponse),
        (status = 409, description = "Already paid", body = ErrorResponse),
    )
)]
pub async fn mark_paid(
    State(state): State<AppState>,
    actor: Actor,
    Path(event_id): Path<PaymentEventId>,
) -> Result<Json<ReferralReward>, LedgerError> {
    Ok(Json(state.ledger.mark_referral_paid(&actor, event_id).await?))
}

/// Referral routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/webhooks/payments", post(payment_webhook))
        .route("/users/{id}/referral-rewards", get(list_rewards))
        .route("/referral-rewards/{event_id}/paid", post(mark_paid))
}
