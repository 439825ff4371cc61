//! User-submitted reviews awaiting moderation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{ReviewId, UserId};
use crate::error::LedgerError;
use crate::persistence::{DocKey, Document};

/// Moderation status of a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    /// Waiting for an admin decision.
    Pending,
    /// Approved and rewarded. Terminal.
    Approved,
    /// Rejected. Terminal.
    Rejected,
}

/// A review submitted by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Review {
    /// Review id.
    pub id: ReviewId,
    /// Author.
    pub user_id: UserId,
    /// Uploaded image location.
    pub image_url: Option<String>,
    /// Review body.
    pub text: String,
    /// Moderation status.
    pub status: ReviewStatus,
    /// Points credited on approval.
    pub reward: Option<i64>,
    /// Admin who decided.
    pub moderated_by: Option<UserId>,
    /// Submission timestamp.
    pub created_at: DateTime<Utc>,
    /// Decision timestamp.
    pub moderated_at: Option<DateTime<Utc>>,
}

impl Document for Review {
    const COLLECTION: &'static str = "reviews";
}

impl Review {
    /// Storage key of the review.
    #[must_use]
    pub fn key(id: ReviewId) -> DocKey {
        DocKey::of::<Self>(id)
    }

    /// Creates a pending review.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if the text is blank.
    pub fn submit(
        user_id: UserId,
        text: String,
        image_url: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        if text.trim().is_empty() {
            return Err(LedgerError::Validation("review text is empty".to_string()));
        }
        Ok(Self {
            id: ReviewId::new(),
            user_id,
            image_url: image_url.filter(|u| !u.trim().is_empty()),
            text,
            status: ReviewStatus::Pending,
            reward: None,
            moderated_by: None,
            created_at: now,
            moderated_at: None,
        })
    }

    /// Records the moderation decision. `reward` is stored only on
    /// approval.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotAwaitingApproval`] unless the review is
    /// pending.
    pub fn moderate(
        &mut self,
        approve: bool,
        reward: i64,
        moderator: UserId,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if self.status != ReviewStatus::Pending {
            return Err(LedgerError::NotAwaitingApproval);
        }
        if approve {
            self.status = ReviewStatus::Approved;
            self.reward = Some(reward);
        } else {
            self.status = ReviewStatus::Rejected;
        }
        self.moderated_by = Some(moderator);
        self.moderated_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_is_rejected() {
        let result = Review::submit(UserId::new(), "   ".to_string(), None, Utc::now());
        assert!(matches!(result, Err(LedgerError::Validation(_))));
    }

    #[test]
    fn approval_is_one_shot() {
        let Ok(mut review) = Review::submit(
            UserId::new(),
            "Great bakery".to_string(),
            Some("https://img.example/1.jpg".to_string()),
            Utc::now(),
        ) else {
            panic!("valid review rejected");
        };
        assert!(review.moderate(true, 10, UserId::new(), Utc::now()).is_ok());
        assert_eq!(review.reward, Some(10));
        assert!(matches!(
            review.moderate(false, 10, UserId::new(), Utc::now()),
            Err(LedgerError::NotAwaitingApproval)
        ));
        assert_eq!(review.status, ReviewStatus::Approved);
    }

    #[test]
    fn rejection_stores_no_reward() {
        let Ok(mut review) = Review::submit(UserId::new(), "meh".to_string(), None, Utc::now())
        else {
            panic!("valid review rejected");
        };
        assert!(review.moderate(false, 10, UserId::new(), Utc::now()).is_ok());
        assert_eq!(review.status, ReviewStatus::Rejected);
        assert_eq!(review.reward, None);
    }
}
