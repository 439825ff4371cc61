//! Domain layer: ledger entities and their state machines.
//!
//! Types here are plain data plus pure transition methods. They know
//! nothing about storage beyond their collection name and key; the
//! service layer loads them into a transaction, calls the transition,
//! and writes the result back.

pub mod actor;
pub mod deal;
pub mod ids;
pub mod ledger;
pub mod profile;
pub mod quest;
pub mod referral;
pub mod review;
pub mod transaction;

pub use actor::{Actor, Role};
pub use deal::{Deal, DealStatus, PartnerPayouts, Ticket};
pub use ids::{CustomerId, DealId, PaymentEventId, QuestId, ReviewId, TransactionId, UserId};
pub use ledger::{BalanceDelta, LedgerMutation, LedgerRecord, Precondition};
pub use profile::{CustomerLink, UserProfile};
pub use quest::{ParticipationStatus, Quest, QuestParticipation, QuestStatus};
pub use referral::{
    BPS_DENOMINATOR, BillingReason, PaymentEvent, ReferralOutcome, ReferralPolicy,
    ReferralReward, RewardStatus, SkipReason, reward_amount,
};
pub use review::{Review, ReviewStatus};
pub use transaction::{TransactionEntry, TransactionKind};
