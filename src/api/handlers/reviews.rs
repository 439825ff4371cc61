//! Review endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::auth::ensure_self_or_admin;
use crate::api::dto::SubmitReviewRequest;
use crate::app_state::AppState;
use crate::domain::{Actor, Review, ReviewId};
use crate::error::{ErrorResponse, LedgerError};
use crate::service::ReviewApproval;

/// `POST /reviews` — Submit a review.
///
/// # Errors
///
/// Returns [`LedgerError::Validation`] for blank text.
#[utoipa::path(
    post,
    path = "/api/v1/reviews",
    tag = "Reviews",
    summary = "Submit a review",
    request_body = SubmitReviewRequest,
    responses(
        (status = 201, description = "Pending review", body = Review),
        (status = 400, description = "Blank text", body = ErrorResponse),
    )
)]
pub async fn submit_review(
    State(state): State<AppState>,
    actor: Actor,
    Json(req): Json<SubmitReviewRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let review = state
        .ledger
        .submit_review(&actor, req.text, req.image_url)
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

/// `GET /reviews/{id}` — Get a review.
///
/// # Errors
///
/// Returns [`LedgerError::NotFound`] for unknown reviews.
#[utoipa::path(
    get,
    path = "/api/v1/reviews/{id}",
    tag = "Reviews",
    summary = "Get a review",
    params(("id" = uuid::Uuid, Path, description = "Review UUID")),
    responses(
        (status = 200, description = "Review", body = Review),
        (status = 404, description = "Review not found", body = ErrorResponse),
    )
)]
pub async fn get_review(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<ReviewId>,
) -> Result<Json<Review>, LedgerError> {
    let review = state.ledger.review(id).await?;
    ensure_self_or_admin(&actor, review.user_id)?;
    Ok(Json(review))
}

/// `POST /reviews/{id}/approve` — Approve and reward.
///
/// # Errors
///
/// Returns [`LedgerError::NotAwaitingApproval`] unless pending.
#[utoipa::path(
    post,
    path = "/api/v1/reviews/{id}/approve",
    tag = "Reviews",
    summary = "Approve a review",
    description = "Approves the review and credits the fixed review reward in one commit.",
    params(("id" = uuid::Uuid, Path, description = "Review UUID")),
    responses(
        (status = 200, description = "Approval", body = ReviewApproval),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
        (status = 409, description = "Not awaiting approval", body = ErrorResponse),
    )
)]
pub async fn approve_review(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<ReviewId>,
) -> Result<Json<ReviewApproval>, LedgerError> {
    Ok(Json(state.ledger.approve_review(&actor, id).await?))
}

/// `POST /reviews/{id}/reject` — Reject.
///
/// # Errors
///
/// Returns [`LedgerError::NotAwaitingApproval`] unless pending.
#[utoipa::path(
    post,
    path = "/api/v1/reviews/{id}/reject",
    tag = "Reviews",
    summary = "Reject a review",
    params(("id" = uuid::Uuid, Path, description = "Review UUID")),
    responses(
        (status = 200, description = "Rejected review", body = Review),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
        (status = 409, description = "Not awaiting approval", body = ErrorResponse),
    )
)]
pub async fn reject_review(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<ReviewId>,
) -> Result<Json<Review>, LedgerError> {
    Ok(Json(state.ledger.reject_review(&actor, id).await?))
}

/// Review routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/reviews", post(submit_review))
        .route("/reviews/{id}", get(get_review))
        .route("/reviews/{id}/approve", post(approve_review))
        .route("/reviews/{id}/reject", post(reject_review))
}
