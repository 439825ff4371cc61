//! Registration, ledger reads and admin adjustments.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};

use crate::api::auth::ensure_self_or_admin;
use crate::api::dto::{
    AdjustmentRequest, LinkCustomerRequest, PaginationParams, RegisterRequest,
    TransactionListResponse,
};
use crate::app_state::AppState;
use crate::domain::{Actor, LedgerRecord, UserId, UserProfile};
use crate::error::{ErrorResponse, LedgerError};
use crate::service::{NewUser, Posting};

/// `POST /users` — Register the caller.
///
/// # Errors
///
/// Returns [`LedgerError`] on invalid referral data.
#[utoipa::path(
    post,
    path = "/api/v1/users",
    tag = "Users",
    summary = "Register the caller",
    description = "Creates the caller's profile and a zeroed ledger. Repeating the call returns the existing profile.",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Profile", body = UserProfile),
        (status = 400, description = "Self-referral or blank email", body = ErrorResponse),
        (status = 404, description = "Unknown referrer", body = ErrorResponse),
    )
)]
pub async fn register(
    State(state): State<AppState>,
    actor: Actor,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let profile = state
        .ledger
        .register_user(NewUser {
            user_id: actor.id,
            email: actor.email,
            referrer_id: req.referrer_id,
            customer_id: req.customer_id,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

/// `GET /users/{id}` — Get a profile.
///
/// # Errors
///
/// Returns [`LedgerError::NotFound`] for unknown users.
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    tag = "Users",
    summary = "Get profile",
    params(("id" = uuid::Uuid, Path, description = "User UUID")),
    responses(
        (status = 200, description = "Profile", body = UserProfile),
        (status = 404, description = "User not found", body = ErrorResponse),
    )
)]
pub async fn get_profile(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<UserId>,
) -> Result<Json<UserProfile>, LedgerError> {
    ensure_self_or_admin(&actor, id)?;
    Ok(Json(state.ledger.profile(id).await?))
}

/// `PUT /users/{id}/customer` — Link a payment-provider customer.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidState`] if the customer is linked
/// elsewhere.
#[utoipa::path(
    put,
    path = "/api/v1/users/{id}/customer",
    tag = "Users",
    summary = "Link payment customer",
    params(("id" = uuid::Uuid, Path, description = "User UUID")),
    request_body = LinkCustomerRequest,
    responses(
        (status = 200, description = "Updated profile", body = UserProfile),
        (status = 403, description = "Not the caller's profile", body = ErrorResponse),
        (status = 409, description = "Customer already linked", body = ErrorResponse),
    )
)]
pub async fn link_customer(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<UserId>,
    Json(req): Json<LinkCustomerRequest>,
) -> Result<Json<UserProfile>, LedgerError> {
    if actor.id != id {
        return Err(LedgerError::Unauthorized(
            "customers can only be linked to the caller".to_string(),
        ));
    }
    Ok(Json(state.ledger.link_customer(&actor, req.customer_id).await?))
}

/// `GET /users/{id}/ledger` — Get balances.
///
/// # Errors
///
/// Returns [`LedgerError::NotFound`] for unknown users.
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}/ledger",
    tag = "Ledger",
    summary = "Get ledger",
    params(("id" = uuid::Uuid, Path, description = "User UUID")),
    responses(
        (status = 200, description = "Ledger record", body = LedgerRecord),
        (status = 404, description = "User not found", body = ErrorResponse),
    )
)]
pub async fn get_ledger(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<UserId>,
) -> Result<Json<LedgerRecord>, LedgerError> {
    ensure_self_or_admin(&actor, id)?;
    Ok(Json(state.ledger.ledger(id).await?))
}

/// `GET /users/{id}/transactions` — Paginated transaction log.
///
/// # Errors
///
/// Returns [`LedgerError`] on storage failure.
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}/transactions",
    tag = "Ledger",
    summary = "List transactions",
    description = "Returns the user's transaction log, newest first.",
    params(("id" = uuid::Uuid, Path, description = "User UUID"), PaginationParams),
    responses(
        (status = 200, description = "Transaction page", body = TransactionListResponse),
    )
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<UserId>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<TransactionListResponse>, LedgerError> {
    ensure_self_or_admin(&actor, id)?;
    let entries = state.ledger.transactions(id).await?;
    let (data, pagination) = params.paginate(entries);
    Ok(Json(TransactionListResponse { data, pagination }))
}

/// `POST /users/{id}/adjustments` — Admin balance adjustment.
///
/// # Errors
///
/// Returns [`LedgerError`] on authorization, validation or balance
/// failures.
#[utoipa::path(
    post,
    path = "/api/v1/users/{id}/adjustments",
    tag = "Ledger",
    summary = "Adjust balance",
    description = "Credits or debits points on behalf of an admin. The only endpoint that accepts a free-form amount.",
    params(("id" = uuid::Uuid, Path, description = "User UUID")),
    request_body = AdjustmentRequest,
    responses(
        (status = 201, description = "Committed posting", body = Posting),
        (status = 400, description = "Zero amount or blank reason", body = ErrorResponse),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
        (status = 422, description = "Debit would overdraw", body = ErrorResponse),
    )
)]
pub async fn adjust_balance(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<UserId>,
    Json(req): Json<AdjustmentRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let posting = state
        .ledger
        .adjust_balance(&actor, id, req.amount, &req.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(posting)))
}

/// User and ledger routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(register))
        .route("/users/{id}", get(get_profile))
        .route("/users/{id}/customer", put(link_customer))
        .route("/users/{id}/ledger", get(get_ledger))
        .route("/users/{id}/transactions", get(list_transactions))
        .route("/users/{id}/adjustments", post(adjust_balance))
}
