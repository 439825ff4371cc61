//! Quest endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::auth::ensure_self_or_admin;
use crate::api::dto::{CreateQuestRequest, SubmitQuestRequest};
use crate::app_state::AppState;
use crate::domain::{Actor, Quest, QuestId, QuestParticipation, UserId};
use crate::error::{ErrorResponse, LedgerError};
use crate::service::{NewQuest, QuestApproval};

/// `POST /quests` — Create a quest.
///
/// # Errors
///
/// Returns [`LedgerError`] for non-admins or invalid definitions.
#[utoipa::path(
    post,
    path = "/api/v1/quests",
    tag = "Quests",
    summary = "Create a quest",
    request_body = CreateQuestRequest,
    responses(
        (status = 201, description = "Quest created", body = Quest),
        (status = 400, description = "Invalid definition", body = ErrorResponse),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
    )
)]
pub async fn create_quest(
    State(state): State<AppState>,
    actor: Actor,
    Json(req): Json<CreateQuestRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let quest = state
        .ledger
        .create_quest(
            &actor,
            NewQuest {
                title: req.title,
                reward: req.reward,
                max_participants: req.max_participants,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(quest)))
}

/// `GET /quests/{id}` — Get a quest.
///
/// # Errors
///
/// Returns [`LedgerError::NotFound`] for unknown quests.
#[utoipa::path(
    get,
    path = "/api/v1/quests/{id}",
    tag = "Quests",
    summary = "Get a quest",
    params(("id" = uuid::Uuid, Path, description = "Quest UUID")),
    responses(
        (status = 200, description = "Quest", body = Quest),
        (status = 404, description = "Quest not found", body = ErrorResponse),
    )
)]
pub async fn get_quest(
    State(state): State<AppState>,
    Path(id): Path<QuestId>,
) -> Result<Json<Quest>, LedgerError> {
    Ok(Json(state.ledger.quest(id).await?))
}

/// `POST /quests/{id}/close` — Stop taking participants.
///
/// # Errors
///
/// Returns [`LedgerError`] for non-admins or unknown quests.
#[utoipa::path(
    post,
    path = "/api/v1/quests/{id}/close",
    tag = "Quests",
    summary = "Close a quest",
    params(("id" = uuid::Uuid, Path, description = "Quest UUID")),
    responses(
        (status = 200, description = "Closed quest", body = Quest),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
        (status = 404, description = "Quest not found", body = ErrorResponse),
    )
)]
pub async fn close_quest(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<QuestId>,
) -> Result<Json<Quest>, LedgerError> {
    Ok(Json(state.ledger.close_quest(&actor, id).await?))
}

/// `POST /quests/{id}/accept` — Accept a quest.
///
/// # Errors
///
/// Returns [`LedgerError`] if the quest is closed, full, unknown, or
/// already accepted.
#[utoipa::path(
    post,
    path = "/api/v1/quests/{id}/accept",
    tag = "Quests",
    summary = "Accept a quest",
    params(("id" = uuid::Uuid, Path, description = "Quest UUID")),
    responses(
        (status = 201, description = "Participation", body = QuestParticipation),
        (status = 404, description = "Quest not found", body = ErrorResponse),
        (status = 409, description = "Already accepted or quest closed", body = ErrorResponse),
    )
)]
pub async fn accept_quest(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<QuestId>,
) -> Result<impl IntoResponse, LedgerError> {
    let participation = state.ledger.accept_quest(&actor, id).await?;
    Ok((StatusCode::CREATED, Json(participation)))
}

/// `POST /quests/{id}/submit` — Submit a report.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidState`] unless the quest is accepted.
#[utoipa::path(
    post,
    path = "/api/v1/quests/{id}/submit",
    tag = "Quests",
    summary = "Submit a quest report",
    params(("id" = uuid::Uuid, Path, description = "Quest UUID")),
    request_body = SubmitQuestRequest,
    responses(
        (status = 200, description = "Participation", body = QuestParticipation),
        (status = 404, description = "No participation", body = ErrorResponse),
        (status = 409, description = "Not in accepted state", body = ErrorResponse),
    )
)]
pub async fn submit_quest(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<QuestId>,
    Json(req): Json<SubmitQuestRequest>,
) -> Result<Json<QuestParticipation>, LedgerError> {
    Ok(Json(
        state.ledger.submit_quest(&actor, id, req.report_text).await?,
    ))
}

/// `GET /quests/{id}/participants/{user_id}` — Get a participation.
///
/// # Errors
///
/// Returns [`LedgerError::NotFound`] if there is none.
#[utoipa::path(
    get,
    path = "/api/v1/quests/{id}/participants/{user_id}",
    tag = "Quests",
    summary = "Get a participation",
    params(
        ("id" = uuid::Uuid, Path, description = "Quest UUID"),
        ("user_id" = uuid::Uuid, Path, description = "Participant UUID"),
    ),
    responses(
        (status = 200, description = "Participation", body = QuestParticipation),
        (status = 404, description = "No participation", body = ErrorResponse),
    )
)]
pub async fn get_participation(
    State(state): State<AppState>,
    actor: Actor,
    Path((id, user_id)): Path<(QuestId, UserId)>,
) -> Result<Json<QuestParticipation>, LedgerError> {
    ensure_self_or_admin(&actor, user_id)?;
    Ok(Json(state.ledger.participation(user_id, id).await?))
}

/// `POST /quests/{id}/participants/{user_id}/approve` — Approve and reward.
///
/// # Errors
///
/// Returns [`LedgerError::NotAwaitingApproval`] unless submitted.
#[utoipa::path(
    post,
    path = "/api/v1/quests/{id}/participants/{user_id}/approve",
    tag = "Quests",
    summary = "Approve a submission",
    description = "Completes the participation and credits the quest reward in one commit.",
    params(
        ("id" = uuid::Uuid, Path, description = "Quest UUID"),
        ("user_id" = uuid::Uuid, Path, description = "Participant UUID"),
    ),
    responses(
        (status = 200, description = "Approval", body = QuestApproval),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
        (status = 409, description = "Not awaiting approval", body = ErrorResponse),
    )
)]
pub async fn approve_quest(
    State(state): State<AppState>,
    actor: Actor,
    Path((id, user_id)): Path<(QuestId, UserId)>,
) -> Result<Json<QuestApproval>, LedgerError> {
    Ok(Json(state.ledger.approve_quest(&actor, user_id, id).await?))
}

/// `POST /quests/{id}/participants/{user_id}/reject` — Reject.
///
/// # Errors
///
/// Returns [`LedgerError::NotAwaitingApproval`] unless submitted.
#[utoipa::path(
    post,
    path = "/api/v1/quests/{id}/participants/{user_id}/reject",
    tag = "Quests",
    summary = "Reject a submission",
    params(
        ("id" = uuid::Uuid, Path, description = "Quest UUID"),
        ("user_id" = uuid::Uuid, Path, description = "Participant UUID"),
    ),
    responses(
        (status = 200, description = "Rejected participation", body = QuestParticipation),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
        (status = 409, description = "Not awaiting approval", body = ErrorResponse),
    )
)]
pub async fn reject_quest(
    State(state): State<AppState>,
    actor: Actor,
    Path((id, user_id)): Path<(QuestId, UserId)>,
) -> Result<Json<QuestParticipation>, LedgerError> {
    Ok(Json(state.ledger.reject_quest(&actor, user_id, id).await?))
}

/// Quest routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/quests", post(create_quest))
        .route("/quests/{id}", get(get_quest))
        .route("/quests/{id}/close", post(close_quest))
        .route("/quests/{id}/accept", post(accept_quest))
        .route("/quests/{id}/submit", post(submit_quest))
        .route("/quests/{id}/participants/{user_id}", get(get_participation))
        .route(
            "/quests/{id}/participants/{user_id}/approve",
            post(approve_quest),
        )
        .route(
            "/quests/{id}/participants/{user_id}/reject",
            post(reject_quest),
        )
}
