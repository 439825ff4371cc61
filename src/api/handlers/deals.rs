//! Deal, ticket and partner payout endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::auth::ensure_self_or_admin;
use crate::api::dto::{SettlePayoutRequest, SubmitDealRequest};
use crate::app_state::AppState;
use crate::domain::{Actor, Deal, DealId, PartnerPayouts, Ticket, UserId};
use crate::error::{ErrorResponse, LedgerError};
use crate::service::{Purchase, Redemption};

/// `POST /deals` — Offer a deal.
///
/// # Errors
///
/// Returns [`LedgerError`] for plain users or invalid deals.
#[utoipa::path(
    post,
    path = "/api/v1/deals",
    tag = "Deals",
    summary = "Submit a deal",
    request_body = SubmitDealRequest,
    responses(
        (status = 201, description = "Pending deal", body = Deal),
        (status = 400, description = "Invalid deal", body = ErrorResponse),
        (status = 403, description = "Caller is not a partner", body = ErrorResponse),
    )
)]
pub async fn submit_deal(
    State(state): State<AppState>,
    actor: Actor,
    Json(req): Json<SubmitDealRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let deal = state.ledger.submit_deal(&actor, req.title, req.price).await?;
    Ok((StatusCode::CREATED, Json(deal)))
}

/// `GET /deals/{id}` — Get a deal.
///
/// # Errors
///
/// Returns [`LedgerError::DealNotFound`] for unknown deals.
#[utoipa::path(
    get,
    path = "/api/v1/deals/{id}",
    tag = "Deals",
    summary = "Get a deal",
    params(("id" = uuid::Uuid, Path, description = "Deal UUID")),
    responses(
        (status = 200, description = "Deal", body = Deal),
        (status = 404, description = "Deal not found", body = ErrorResponse),
    )
)]
pub async fn get_deal(
    State(state): State<AppState>,
    Path(id): Path<DealId>,
) -> Result<Json<Deal>, LedgerError> {
    Ok(Json(state.ledger.deal(id).await?))
}

/// `POST /deals/{id}/approve` — Activate a pending deal.
///
/// # Errors
///
/// Returns [`LedgerError::NotAwaitingApproval`] unless pending.
#[utoipa::path(
    post,
    path = "/api/v1/deals/{id}/approve",
    tag = "Deals",
    summary = "Approve a deal",
    params(("id" = uuid::Uuid, Path, description = "Deal UUID")),
    responses(
        (status = 200, description = "Active deal", body = Deal),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
        (status = 409, description = "Not awaiting approval", body = ErrorResponse),
    )
)]
pub async fn approve_deal(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<DealId>,
) -> Result<Json<Deal>, LedgerError> {
    Ok(Json(state.ledger.approve_deal(&actor, id).await?))
}

/// `POST /deals/{id}/reject` — Reject a pending deal.
///
/// # Errors
///
/// Returns [`LedgerError::NotAwaitingApproval`] unless pending.
#[utoipa::path(
    post,
    path = "/api/v1/deals/{id}/reject",
    tag = "Deals",
    summary = "Reject a deal",
    params(("id" = uuid::Uuid, Path, description = "Deal UUID")),
    responses(
        (status = 200, description = "Rejected deal", body = Deal),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
        (status = 409, description = "Not awaiting approval", body = ErrorResponse),
    )
)]
pub async fn reject_deal(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<DealId>,
) -> Result<Json<Deal>, LedgerError> {
    Ok(Json(state.ledger.reject_deal(&actor, id).await?))
}

/// `POST /deals/{id}/deactivate` — Withdraw an active deal.
///
/// # Errors
///
/// Returns [`LedgerError::NotOwner`] for foreign partners.
#[utoipa::path(
    post,
    path = "/api/v1/deals/{id}/deactivate",
    tag = "Deals",
    summary = "Deactivate a deal",
    params(("id" = uuid::Uuid, Path, description = "Deal UUID")),
    responses(
        (status = 200, description = "Inactive deal", body = Deal),
        (status = 403, description = "Not the deal owner", body = ErrorResponse),
        (status = 409, description = "Deal not active", body = ErrorResponse),
    )
)]
pub async fn deactivate_deal(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<DealId>,
) -> Result<Json<Deal>, LedgerError> {
    Ok(Json(state.ledger.deactivate_deal(&actor, id).await?))
}

/// `POST /deals/{id}/purchase` — Buy a deal with points.
///
/// # Errors
///
/// Returns [`LedgerError`] if the deal is unknown or inactive, already
/// bought, or unaffordable.
#[utoipa::path(
    post,
    path = "/api/v1/deals/{id}/purchase",
    tag = "Deals",
    summary = "Purchase a deal",
    description = "Debits the deal price and issues a ticket in one commit.",
    params(("id" = uuid::Uuid, Path, description = "Deal UUID")),
    responses(
        (status = 201, description = "Purchase", body = Purchase),
        (status = 404, description = "Deal not found", body = ErrorResponse),
        (status = 409, description = "Deal inactive or already purchased", body = ErrorResponse),
        (status = 422, description = "Insufficient points", body = ErrorResponse),
    )
)]
pub async fn purchase_deal(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<DealId>,
) -> Result<impl IntoResponse, LedgerError> {
    let purchase = state.ledger.purchase_deal(&actor, id).await?;
    Ok((StatusCode::CREATED, Json(purchase)))
}

/// `GET /deals/{id}/tickets/{user_id}` — Get a ticket.
///
/// # Errors
///
/// Returns [`LedgerError::NotFound`] if there is none.
#[utoipa::path(
    get,
    path = "/api/v1/deals/{id}/tickets/{user_id}",
    tag = "Deals",
    summary = "Get a ticket",
    params(
        ("id" = uuid::Uuid, Path, description = "Deal UUID"),
        ("user_id" = uuid::Uuid, Path, description = "Buyer UUID"),
    ),
    responses(
        (status = 200, description = "Ticket", body = Ticket),
        (status = 404, description = "Ticket not found", body = ErrorResponse),
    )
)]
pub async fn get_ticket(
    State(state): State<AppState>,
    actor: Actor,
    Path((id, user_id)): Path<(DealId, UserId)>,
) -> Result<Json<Ticket>, LedgerError> {
    let ticket = state.ledger.ticket(user_id, id).await?;
    if actor.id != ticket.partner_id {
        ensure_self_or_admin(&actor, user_id)?;
    }
    Ok(Json(ticket))
}

/// `POST /deals/{id}/tickets/{user_id}/redeem` — Redeem a ticket.
///
/// # Errors
///
/// Returns [`LedgerError::AlreadyRedeemed`] or
/// [`LedgerError::NotOwner`].
#[utoipa::path(
    post,
    path = "/api/v1/deals/{id}/tickets/{user_id}/redeem",
    tag = "Deals",
    summary = "Redeem a ticket",
    description = "Marks the ticket used and credits the partner's pending payout. Duplicate scans succeed at most once.",
    params(
        ("id" = uuid::Uuid, Path, description = "Deal UUID"),
        ("user_id" = uuid::Uuid, Path, description = "Buyer UUID"),
    ),
    responses(
        (status = 200, description = "Redemption", body = Redemption),
        (status = 403, description = "Ticket belongs to another partner", body = ErrorResponse),
        (status = 404, description = "Ticket not found", body = ErrorResponse),
        (status = 409, description = "Already redeemed", body = ErrorResponse),
    )
)]
pub async fn redeem_ticket(
    State(state): State<AppState>,
    actor: Actor,
    Path((id, user_id)): Path<(DealId, UserId)>,
) -> Result<Json<Redemption>, LedgerError> {
    Ok(Json(state.ledger.redeem_ticket(&actor, user_id, id).await?))
}

/// `GET /users/{id}/tickets` — Tickets bought by a user.
///
/// # Errors
///
/// Returns [`LedgerError`] on storage failure.
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}/tickets",
    tag = "Deals",
    summary = "List a user's tickets",
    params(("id" = uuid::Uuid, Path, description = "User UUID")),
    responses(
        (status = 200, description = "Tickets, newest first", body = Vec<Ticket>),
    )
)]
pub async fn list_tickets(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<UserId>,
) -> Result<Json<Vec<Ticket>>, LedgerError> {
    ensure_self_or_admin(&actor, id)?;
    Ok(Json(state.ledger.tickets(id).await?))
}

/// `GET /partners/{id}/payouts` — Partner payout balances.
///
/// # Errors
///
/// Returns [`LedgerError`] on storage failure.
#[utoipa::path(
    get,
    path = "/api/v1/partners/{id}/payouts",
    tag = "Payouts",
    summary = "Get partner payouts",
    params(("id" = uuid::Uuid, Path, description = "Partner UUID")),
    responses(
        (status = 200, description = "Payout balances", body = PartnerPayouts),
    )
)]
pub async fn get_payouts(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<UserId>,
) -> Result<Json<PartnerPayouts>, LedgerError> {
    ensure_self_or_admin(&actor, id)?;
    Ok(Json(state.ledger.payouts(id).await?))
}

/// `POST /partners/{id}/payouts/settle` — Pay out pending balance.
///
/// # Errors
///
/// Returns [`LedgerError`] for non-admins or amounts above the pending
/// balance.
#[utoipa::path(
    post,
    path = "/api/v1/partners/{id}/payouts/settle",
    tag = "Payouts",
    summary = "Settle a payout",
    params(("id" = uuid::Uuid, Path, description = "Partner UUID")),
    request_body = SettlePayoutRequest,
    responses(
        (status = 200, description = "Payout balances", body = PartnerPayouts),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
        (status = 422, description = "Amount exceeds pending balance", body = ErrorResponse),
    )
)]
pub async fn settle_payout(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<UserId>,
    Json(req): Json<SettlePayoutRequest>,
) -> Result<Json<PartnerPayouts>, LedgerError> {
    Ok(Json(state.ledger.settle_payout(&actor, id, req.amount).await?))
}

/// Deal, ticket and payout routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/deals", post(submit_deal))
        .route("/deals/{id}", get(get_deal))
        .route("/deals/{id}/approve", post(approve_deal))
        .route("/deals/{id}/reject", post(reject_deal))
        .route("/deals/{id}/deactivate", post(deactivate_deal))
        .route("/deals/{id}/purchase", post(purchase_deal))
        .route("/deals/{id}/tickets/{user_id}", get(get_ticket))
        .route("/deals/{id}/tickets/{user_id}/redeem", post(redeem_ticket))
        .route("/users/{id}/tickets", get(list_tickets))
        .route("/partners/{id}/payouts", get(get_payouts))
        .route("/partners/{id}/payouts/settle", post(settle_payout))
}
