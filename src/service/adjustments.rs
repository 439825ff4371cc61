//! Admin balance adjustments.

use chrono::Utc;

use super::LedgerService;
use super::ledger::{Posting, post};
use crate::domain::{Actor, LedgerMutation, LedgerRecord, TransactionKind, UserId};
use crate::error::LedgerError;
use crate::persistence::DocumentStore;

impl<S: DocumentStore> LedgerService<S> {
    /// Credits or debits `amount` points on behalf of an admin.
    ///
    /// This is the only operation that takes a free-form delta. The log
    /// entry records the reason, the admin's id and email, and the
    /// balances before and after.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthorized`] for non-admins,
    /// [`LedgerError::Validation`] for a zero amount or blank reason,
    /// [`LedgerError::NotFound`] if the user has no ledger, and
    /// [`LedgerError::InsufficientBalance`] if a debit would overdraw.
    pub async fn adjust_balance(
        &self,
        actor: &Actor,
        user_id: UserId,
        amount: i64,
        reason: &str,
    ) -> Result<Posting, LedgerError> {
        actor.require_admin()?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LedgerError::Validation(
                "adjustment reason is empty".to_string(),
            ));
        }
        if amount == 0 {
            return Err(LedgerError::Validation(
                "adjustment amount must not be zero".to_string(),
            ));
        }

        let mut mutation =
            LedgerMutation::spendable(amount, TransactionKind::AdminAdjustment, reason, actor.id);
        mutation.admin_email = Some(actor.email.clone());

        let keys = [LedgerRecord::key(user_id)];
        let posting = self
            .transact("adjust_balance", &keys, |txn| {
                post(txn, user_id, &mutation, Utc::now())
            })
            .await?;

        tracing::info!(
            %user_id,
            admin_id = %actor.id,
            admin_email = %actor.email,
            amount,
            before = posting.entry.before_balance,
            after = posting.entry.after_balance,
            "balance adjusted"
        );
        Ok(posting)
    }
}
