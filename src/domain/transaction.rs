//! Append-only transaction log entries.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{TransactionId, UserId};
use crate::persistence::{DocKey, Document};

/// Business reason behind a ledger mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Reward for an approved quest.
    QuestReward,
    /// Reward for an approved review.
    ReviewReward,
    /// Points spent on a deal ticket.
    DealPurchase,
    /// Manual correction by an admin.
    AdminAdjustment,
    /// Referral commission credited to the ledger.
    ReferralReward,
}

impl TransactionKind {
    /// Returns the kind as a static string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::QuestReward => "quest_reward",
            Self::ReviewReward => "review_reward",
            Self::DealPurchase => "deal_purchase",
            Self::AdminAdjustment => "admin_adjustment",
            Self::ReferralReward => "referral_reward",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one ledger mutation.
///
/// Written in the same commit as the ledger change it describes, never
/// updated or deleted afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TransactionEntry {
    /// Entry id.
    pub id: TransactionId,
    /// Ledger the entry belongs to.
    pub user_id: UserId,
    /// Signed change to the usable balance.
    pub amount: i64,
    /// Business reason.
    pub kind: TransactionKind,
    /// Human-readable description.
    pub description: String,
    /// Usable balance before the mutation.
    pub before_balance: i64,
    /// Usable balance after the mutation.
    pub after_balance: i64,
    /// User or admin who caused the mutation.
    pub actor_id: UserId,
    /// Acting admin's email, for adjustments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_email: Option<String>,
    /// Id of the quest, review, deal or payment event behind the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Document for TransactionEntry {
    const COLLECTION: &'static str = "transactions";
}

impl TransactionEntry {
    /// Storage key of the entry.
    #[must_use]
    pub fn key(&self) -> DocKey {
        DocKey::of::<Self>(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&TransactionKind::DealPurchase).ok();
        assert_eq!(json.as_deref(), Some("\"deal_purchase\""));
        assert_eq!(TransactionKind::AdminAdjustment.to_string(), "admin_adjustment");
    }

    #[test]
    fn optional_fields_are_omitted() {
        let entry = TransactionEntry {
            id: TransactionId::new(),
            user_id: UserId::new(),
            amount: 20,
            kind: TransactionKind::QuestReward,
            description: "quest reward".to_string(),
            before_balance: 0,
            after_balance: 20,
            actor_id: UserId::new(),
            admin_email: None,
            reference: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&entry).unwrap_or_default();
        assert!(json.get("admin_email").is_none());
        assert_eq!(
            json.get("user_id").and_then(|v| v.as_str()),
            Some(entry.user_id.to_string().as_str())
        );
    }
}
