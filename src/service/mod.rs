//! Service layer: business operations over the document store.
//!
//! [`LedgerService`] is a stateless coordinator. Every mutating method
//! follows the same pattern: validate input → declare the documents it
//! touches → run a closure inside [`crate::persistence::transaction::run`]
//! that reads them, checks the state machine, and buffers the new state
//! plus exactly one log entry per ledger change → log the outcome.
//!
//! The operations are split by area across the submodules; they all
//! extend the same type.

mod adjustments;
mod deals;
mod ledger;
mod moderation;
mod quests;
mod referrals;

pub use deals::{Purchase, Redemption};
pub use ledger::{NewUser, Posting};
pub use quests::{NewQuest, QuestApproval};
pub use moderation::ReviewApproval;

use crate::domain::{BPS_DENOMINATOR, ReferralPolicy};
use crate::error::LedgerError;
use crate::persistence::transaction::{self, RetryPolicy, Transaction};
use crate::persistence::{DocKey, Document, DocumentStore};

/// Business knobs of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Conflict retry budget.
    pub retry: RetryPolicy,
    /// Points credited for an approved review.
    pub review_reward: i64,
    /// Referral campaign rates.
    pub referral: ReferralPolicy,
}

impl ServiceSettings {
    /// Checks the reward knobs before the service starts.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if the review reward is not
    /// positive or a referral rate exceeds 10 000 basis points.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.review_reward <= 0 {
            return Err(LedgerError::Validation(format!(
                "review reward must be positive, got {}",
                self.review_reward
            )));
        }
        for rate in [self.referral.rate_before_bps, self.referral.rate_after_bps] {
            if i64::from(rate) > BPS_DENOMINATOR {
                return Err(LedgerError::Validation(format!(
                    "referral rate {rate} bps exceeds {BPS_DENOMINATOR}"
                )));
            }
        }
        Ok(())
    }
}

/// Orchestration layer for every ledger operation.
#[derive(Debug, Clone)]
pub struct LedgerService<S> {
    store: S,
    settings: ServiceSettings,
}

impl<S: DocumentStore> LedgerService<S> {
    /// Creates a new `LedgerService`.
    #[must_use]
    pub fn new(store: S, settings: ServiceSettings) -> Self {
        Self { store, settings }
    }

    /// Returns a reference to the underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the service settings.
    #[must_use]
    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    async fn transact<T, F>(
        &self,
        op: &'static str,
        keys: &[DocKey],
        body: F,
    ) -> Result<T, LedgerError>
    where
        T: Send,
        F: FnMut(&mut Transaction) -> Result<T, LedgerError> + Send,
    {
        transaction::run(&self.store, self.settings.retry, op, keys, body).await
    }

    /// Reads one document outside of any transaction.
    async fn load<T: Document>(&self, key: DocKey) -> Result<Option<T>, LedgerError> {
        let mut docs = self.store.fetch(std::slice::from_ref(&key)).await?;
        docs.remove(&key)
            .map(|doc| serde_json::from_value(doc.body))
            .transpose()
            .map_err(|e| LedgerError::Internal(format!("corrupt document {key}: {e}")))
    }

    /// Scans a collection by a top-level string field.
    async fn find<T: Document>(
        &self,
        field: &'static str,
        value: &str,
    ) -> Result<Vec<T>, LedgerError> {
        self.store
            .find_by(T::COLLECTION, field, value)
            .await?
            .into_iter()
            .map(|body| {
                serde_json::from_value(body).map_err(|e| {
                    LedgerError::Internal(format!("corrupt {} document: {e}", T::COLLECTION))
                })
            })
            .collect()
    }
}
