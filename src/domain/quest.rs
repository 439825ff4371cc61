//! Quests and per-user quest participation.
//!
//! A participation moves `accepted → submitted → completed | rejected`.
//! Every transition method checks the current status itself so callers
//! can run it inside the transaction that persists the result; the
//! "still submitted?" check and the reward write then commit together.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{QuestId, UserId};
use crate::error::LedgerError;
use crate::persistence::{DocKey, Document};

/// Whether a quest takes new participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    /// Accepting participants.
    Open,
    /// No longer accepting participants.
    Closed,
}

/// A quest definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Quest {
    /// Quest id.
    pub id: QuestId,
    /// Display title.
    pub title: String,
    /// Points credited on approval.
    pub reward: i64,
    /// Open or closed.
    pub status: QuestStatus,
    /// Number of users who accepted the quest.
    pub participant_count: u32,
    /// Capacity; once reached, new acceptances fail.
    pub max_participants: Option<u32>,
    /// Admin who created the quest.
    pub created_by: UserId,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Document for Quest {
    const COLLECTION: &'static str = "quests";
}

impl Quest {
    /// Storage key of the quest.
    #[must_use]
    pub fn key(id: QuestId) -> DocKey {
        DocKey::of::<Self>(id)
    }

    /// Returns `true` if a new participant may join.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.status == QuestStatus::Open
            && self
                .max_participants
                .is_none_or(|max| self.participant_count < max)
    }

    /// Counts one more participant.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::QuestClosed`] if the quest is closed or full.
    pub fn admit(&mut self) -> Result<(), LedgerError> {
        if !self.is_accepting() {
            return Err(LedgerError::QuestClosed);
        }
        self.participant_count = self.participant_count.saturating_add(1);
        Ok(())
    }
}

/// Status of a user's participation in a quest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ParticipationStatus {
    /// Quest accepted, report not yet submitted.
    Accepted,
    /// Report submitted, awaiting review.
    Submitted,
    /// Approved and rewarded. Terminal.
    Completed,
    /// Rejected. Terminal.
    Rejected,
}

impl ParticipationStatus {
    /// Returns `true` for `completed` and `rejected`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }
}

impl fmt::Display for ParticipationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Accepted => "accepted",
            Self::Submitted => "submitted",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// A user's participation in one quest, keyed by (user, quest).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QuestParticipation {
    /// Participant.
    pub user_id: UserId,
    /// Quest.
    pub quest_id: QuestId,
    /// Current status.
    pub status: ParticipationStatus,
    /// Reward fixed at acceptance time.
    pub reward: i64,
    /// Report submitted by the participant.
    pub report_text: Option<String>,
    /// Acceptance timestamp.
    pub accepted_at: DateTime<Utc>,
    /// Submission timestamp.
    pub submitted_at: Option<DateTime<Utc>>,
    /// Review timestamp.
    pub reviewed_at: Option<DateTime<Utc>>,
    /// Admin who reviewed the submission.
    pub reviewed_by: Option<UserId>,
}

impl Document for QuestParticipation {
    const COLLECTION: &'static str = "quest_participations";
}

impl QuestParticipation {
    /// Storage key of the participation of `user_id` in `quest_id`.
    #[must_use]
    pub fn key(user_id: UserId, quest_id: QuestId) -> DocKey {
        DocKey::of::<Self>(format!("{user_id}:{quest_id}"))
    }

    /// Starts a participation, snapshotting the quest's current reward.
    #[must_use]
    pub fn accept(user_id: UserId, quest: &Quest, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            quest_id: quest.id,
            status: ParticipationStatus::Accepted,
            reward: quest.reward,
            report_text: None,
            accepted_at: now,
            submitted_at: None,
            reviewed_at: None,
            reviewed_by: None,
        }
    }

    /// Records the participant's report.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidState`] unless the status is
    /// `accepted`.
    pub fn submit(&mut self, report: String, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.status != ParticipationStatus::Accepted {
            return Err(LedgerError::InvalidState(format!(
                "cannot submit a quest in status {}",
                self.status
            )));
        }
        self.status = ParticipationStatus::Submitted;
        self.report_text = Some(report);
        self.submitted_at = Some(now);
        Ok(())
    }

    /// Moves a submitted participation to `completed` or `rejected`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotAwaitingApproval`] unless the status is
    /// `submitted`.
    pub fn review(
        &mut self,
        approve: bool,
        reviewer: UserId,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if self.status != ParticipationStatus::Submitted {
            return Err(LedgerError::NotAwaitingApproval);
        }
        self.status = if approve {
            ParticipationStatus::Completed
        } else {
            ParticipationStatus::Rejected
        };
        self.reviewed_at = Some(now);
        self.reviewed_by = Some(reviewer);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn quest(max: Option<u32>) -> Quest {
        Quest {
            id: QuestId::new(),
            title: "Visit the farmers market".to_string(),
            reward: 20,
            status: QuestStatus::Open,
            participant_count: 0,
            max_participants: max,
            created_by: UserId::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn admit_counts_until_full() {
        let mut q = quest(Some(1));
        assert!(q.admit().is_ok());
        assert_eq!(q.participant_count, 1);
        assert!(matches!(q.admit(), Err(LedgerError::QuestClosed)));
    }

    #[test]
    fn closed_quest_rejects_participants() {
        let mut q = quest(None);
        q.status = QuestStatus::Closed;
        assert!(matches!(q.admit(), Err(LedgerError::QuestClosed)));
    }

    #[test]
    fn happy_path_reaches_completed() {
        let q = quest(None);
        let reviewer = UserId::new();
        let mut p = QuestParticipation::accept(UserId::new(), &q, Utc::now());
        assert_eq!(p.reward, 20);
        assert!(p.submit("done".to_string(), Utc::now()).is_ok());
        assert!(p.review(true, reviewer, Utc::now()).is_ok());
        assert_eq!(p.status, ParticipationStatus::Completed);
        assert_eq!(p.reviewed_by, Some(reviewer));
        assert!(p.status.is_terminal());
    }

    #[test]
    fn review_requires_submitted() {
        let mut p = QuestParticipation::accept(UserId::new(), &quest(None), Utc::now());
        assert!(matches!(
            p.review(true, UserId::new(), Utc::now()),
            Err(LedgerError::NotAwaitingApproval)
        ));
    }

    #[test]
    fn second_review_is_refused() {
        let mut p = QuestParticipation::accept(UserId::new(), &quest(None), Utc::now());
        let _ = p.submit("done".to_string(), Utc::now());
        assert!(p.review(false, UserId::new(), Utc::now()).is_ok());
        assert!(matches!(
            p.review(true, UserId::new(), Utc::now()),
            Err(LedgerError::NotAwaitingApproval)
        ));
        assert_eq!(p.status, ParticipationStatus::Rejected);
    }

    #[test]
    fn submit_twice_is_invalid_state() {
        let mut p = QuestParticipation::accept(UserId::new(), &quest(None), Utc::now());
        let _ = p.submit("one".to_string(), Utc::now());
        assert!(matches!(
            p.submit("two".to_string(), Utc::now()),
            Err(LedgerError::InvalidState(_))
        ));
    }
}
