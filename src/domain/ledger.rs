//! Per-user point balance record and the mutation applied to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::UserId;
use super::transaction::TransactionKind;
use crate::error::LedgerError;
use crate::persistence::{DocKey, Document};

/// Point balances of one user.
///
/// Created zeroed at registration, never deleted. Only the atomic-update
/// primitive writes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LedgerRecord {
    /// Owner of the ledger.
    pub user_id: UserId,
    /// Total points ever credited minus debited.
    pub balance: i64,
    /// Points spendable now. Never negative.
    pub usable_balance: i64,
    /// Points credited but not yet usable.
    pub pending_balance: i64,
    /// Points that expired (informational).
    pub expired_amount: i64,
    /// Timestamp of the last mutation.
    pub last_transaction_at: Option<DateTime<Utc>>,
}

impl Document for LedgerRecord {
    const COLLECTION: &'static str = "ledgers";
}

impl LedgerRecord {
    /// Creates a zeroed ledger for `user_id`.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            balance: 0,
            usable_balance: 0,
            pending_balance: 0,
            expired_amount: 0,
            last_transaction_at: None,
        }
    }

    /// Storage key of the ledger owned by `user_id`.
    #[must_use]
    pub fn key(user_id: UserId) -> DocKey {
        DocKey::of::<Self>(user_id)
    }

    /// Computes the record that results from applying `delta`, checking
    /// every precondition against the current values.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientBalance`] when a precondition
    /// fails and [`LedgerError::Validation`] on arithmetic overflow.
    pub fn apply(
        &self,
        delta: &BalanceDelta,
        preconditions: &[Precondition],
        now: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        let overflow = || LedgerError::Validation("balance overflow".to_string());
        let next = Self {
            user_id: self.user_id,
            balance: self.balance.checked_add(delta.balance).ok_or_else(overflow)?,
            usable_balance: self
                .usable_balance
                .checked_add(delta.usable)
                .ok_or_else(overflow)?,
            pending_balance: self
                .pending_balance
                .checked_add(delta.pending)
                .ok_or_else(overflow)?,
            expired_amount: self.expired_amount,
            last_transaction_at: Some(now),
        };

        for precondition in preconditions {
            precondition.check(self, &next, delta)?;
        }
        Ok(next)
    }
}

/// Signed changes to the balance fields of a [`LedgerRecord`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceDelta {
    /// Change to `usable_balance`.
    pub usable: i64,
    /// Change to `balance`.
    pub balance: i64,
    /// Change to `pending_balance`.
    pub pending: i64,
}

impl BalanceDelta {
    /// A change that moves `usable_balance` and `balance` together, which
    /// is what every reward, purchase and adjustment does.
    #[must_use]
    pub const fn spendable(amount: i64) -> Self {
        Self {
            usable: amount,
            balance: amount,
            pending: 0,
        }
    }

    /// Returns `true` if the delta changes nothing.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.usable == 0 && self.balance == 0 && self.pending == 0
    }
}

/// A condition the post-mutation record must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Resulting `usable_balance` must be `>= 0`.
    NonNegativeUsable,
    /// Resulting `pending_balance` must be `>= 0`.
    NonNegativePending,
}

impl Precondition {
    fn check(
        self,
        before: &LedgerRecord,
        after: &LedgerRecord,
        delta: &BalanceDelta,
    ) -> Result<(), LedgerError> {
        match self {
            Self::NonNegativeUsable if after.usable_balance < 0 => {
                Err(LedgerError::InsufficientBalance {
                    usable: before.usable_balance,
                    requested: delta.usable,
                })
            }
            Self::NonNegativePending if after.pending_balance < 0 => {
                Err(LedgerError::InsufficientBalance {
                    usable: before.pending_balance,
                    requested: delta.pending,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Everything the atomic-update primitive needs to post one change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerMutation {
    /// Balance changes.
    pub delta: BalanceDelta,
    /// Checks evaluated against the resulting record.
    pub preconditions: Vec<Precondition>,
    /// Log entry type.
    pub kind: TransactionKind,
    /// Log entry description.
    pub description: String,
    /// User or admin causing the change.
    pub actor_id: UserId,
    /// Id of the quest, review, deal or payment event behind the change.
    pub reference: Option<String>,
    /// Acting admin's email (adjustments only).
    pub admin_email: Option<String>,
}

impl LedgerMutation {
    /// A spendable-balance change guarded by the non-negative invariant.
    #[must_use]
    pub fn spendable(
        amount: i64,
        kind: TransactionKind,
        description: impl Into<String>,
        actor_id: UserId,
    ) -> Self {
        Self {
            delta: BalanceDelta::spendable(amount),
            preconditions: vec![Precondition::NonNegativeUsable],
            kind,
            description: description.into(),
            actor_id,
            reference: None,
            admin_email: None,
        }
    }

    /// Attaches the id of the entity behind the change.
    #[must_use]
    pub fn with_reference(mut self, reference: impl ToString) -> Self {
        self.reference = Some(reference.to_string());
        self
    }
}
