//! Quest DTOs.

use serde::Deserialize;
use utoipa::ToSchema;

/// Request body for `POST /quests`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateQuestRequest {
    /// Display title.
    pub title: String,
    /// Points credited on approval.
    pub reward: i64,
    /// Optional capacity.
    #[serde(default)]
    pub max_participants: Option<u32>,
}

/// Request body for `POST /quests/{id}/submit`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitQuestRequest {
    /// Participant's report.
    pub report_text: String,
}
