//! Referral commissions derived from subscription payment events.
//!
//! The rate a referrer earns is decided once, on the first qualifying
//! payment, by [`ReferralPolicy::resolve_rate`]: a pure function of the
//! event time and the rate already persisted on the referrer's profile.
//! Re-running it on any later event returns the persisted rate unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{CustomerId, PaymentEventId, UserId};
use crate::error::LedgerError;
use crate::persistence::{DocKey, Document};

/// One basis point is 1/10 000.
pub const BPS_DENOMINATOR: i64 = 10_000;

/// Why the payment provider charged the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BillingReason {
    /// First invoice of a new subscription.
    SubscriptionCreate,
    /// Recurring renewal invoice.
    SubscriptionCycle,
    /// Invoice caused by a plan change.
    SubscriptionUpdate,
    /// One-off invoice.
    Manual,
}

/// A verified, deduplicated payment-succeeded event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PaymentEvent {
    /// Provider event id; the idempotency key.
    pub event_id: PaymentEventId,
    /// Paying customer.
    pub customer_id: CustomerId,
    /// Amount paid, in minor currency units.
    pub amount: i64,
    /// Why the invoice was issued.
    pub billing_reason: BillingReason,
    /// When the payment succeeded.
    pub occurred_at: DateTime<Utc>,
}

impl PaymentEvent {
    /// Checks the event payload before any lookup.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] for blank ids or a negative
    /// amount.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.event_id.as_str().trim().is_empty() {
            return Err(LedgerError::Validation("event_id is empty".to_string()));
        }
        if self.customer_id.as_str().trim().is_empty() {
            return Err(LedgerError::Validation("customer_id is empty".to_string()));
        }
        if self.amount < 0 {
            return Err(LedgerError::Validation(format!(
                "payment amount must not be negative, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

/// Campaign rates applied to referrers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferralPolicy {
    /// Events before this instant earn `rate_before_bps`.
    pub cutoff: DateTime<Utc>,
    /// Launch campaign rate.
    pub rate_before_bps: u32,
    /// Standard rate.
    pub rate_after_bps: u32,
}

impl ReferralPolicy {
    /// Returns the referrer's rate and whether it must be persisted now.
    #[must_use]
    pub fn resolve_rate(&self, persisted: Option<u32>, occurred_at: DateTime<Utc>) -> (u32, bool) {
        match persisted {
            Some(rate) => (rate, false),
            None if occurred_at < self.cutoff => (self.rate_before_bps, true),
            None => (self.rate_after_bps, true),
        }
    }
}

/// `floor(amount × rate_bps / 10 000)`, zero for non-positive amounts.
#[must_use]
pub fn reward_amount(amount: i64, rate_bps: u32) -> i64 {
    if amount <= 0 {
        return 0;
    }
    let scaled = i128::from(amount) * i128::from(rate_bps) / i128::from(BPS_DENOMINATOR);
    i64::try_from(scaled).unwrap_or(i64::MAX)
}

/// Payout state of a referral reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RewardStatus {
    /// Earned, not paid yet.
    Pending,
    /// Paid out to the referrer.
    Paid,
}

/// Commission earned by a referrer from one payment event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReferralReward {
    /// Source payment event (record key).
    pub event_id: PaymentEventId,
    /// Referrer who earns the commission.
    pub referrer_id: UserId,
    /// Paying user.
    pub referred_id: UserId,
    /// Amount paid by the referred user.
    pub payment_amount: i64,
    /// Rate applied.
    pub reward_rate_bps: u32,
    /// Commission amount.
    pub reward_amount: i64,
    /// Payout state.
    pub reward_status: RewardStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Payout timestamp.
    pub paid_at: Option<DateTime<Utc>>,
}

impl Document for ReferralReward {
    const COLLECTION: &'static str = "referral_rewards";
}

impl ReferralReward {
    /// Storage key of the reward created for `event_id`.
    #[must_use]
    pub fn key(event_id: &PaymentEventId) -> DocKey {
        DocKey::of::<Self>(event_id)
    }

    /// Flips the reward to paid.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidState`] if it was already paid.
    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.reward_status == RewardStatus::Paid {
            return Err(LedgerError::InvalidState(
                "referral reward already paid".to_string(),
            ));
        }
        self.reward_status = RewardStatus::Paid;
        self.paid_at = Some(now);
        Ok(())
    }
}

/// Why a payment event produced no reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// First invoice of a subscription; only renewals earn commission.
    InitialSubscription,
    /// No profile is linked to the customer.
    UnknownCustomer,
    /// The paying user was not referred.
    NoReferrer,
    /// The computed commission rounds down to zero.
    ZeroReward,
}

/// Result of processing a payment event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ReferralOutcome {
    /// A new reward record was created.
    Rewarded(ReferralReward),
    /// The event was already processed; the existing record is returned.
    Duplicate(ReferralReward),
    /// No reward applies.
    Skipped(SkipReason),
}
