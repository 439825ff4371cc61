//! Admin moderation of reviews and partner deals.

use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use super::LedgerService;
use super::ledger::post;
use crate::domain::{
    Actor, Deal, DealId, LedgerMutation, LedgerRecord, Review, ReviewId, TransactionEntry,
    TransactionKind,
};
use crate::error::LedgerError;
use crate::persistence::DocumentStore;

/// Result of an approved review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReviewApproval {
    /// Review, now `approved`.
    pub review: Review,
    /// Author's ledger after the reward.
    pub ledger: LedgerRecord,
    /// The `review_reward` log entry.
    pub entry: TransactionEntry,
}

impl<S: DocumentStore> LedgerService<S> {
    /// Stores a pending review written by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] for blank text and
    /// [`LedgerError::NotFound`] if the caller is not registered.
    pub async fn submit_review(
        &self,
        actor: &Actor,
        text: String,
        image_url: Option<String>,
    ) -> Result<Review, LedgerError> {
        let review = Review::submit(actor.id, text, image_url, Utc::now())?;
        self.profile(actor.id).await?;

        let key = Review::key(review.id);
        self.transact("submit_review", std::slice::from_ref(&key), |txn| {
            txn.insert(&key, &review)
        })
        .await?;

        tracing::info!(user_id = %actor.id, review_id = %review.id, "review submitted");
        Ok(review)
    }

    /// Approves a pending review and credits the configured review reward
    /// to its author in the same commit.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthorized`] for non-admins,
    /// [`LedgerError::NotFound`] for an unknown review,
    /// [`LedgerError::Validation`] if the configured reward is not positive,
    /// and [`LedgerError::NotAwaitingApproval`] unless it is pending.
    pub async fn approve_review(
        &self,
        actor: &Actor,
        review_id: ReviewId,
    ) -> Result<ReviewApproval, LedgerError> {
        actor.require_admin()?;
        let reward = self.settings.review_reward;
        if reward <= 0 {
            return Err(LedgerError::Validation(format!(
                "review reward must be positive, got {reward}"
            )));
        }
        // The author never changes, so it can be read ahead of the
        // transaction to find the ledger key.
        let author = self.review(review_id).await?.user_id;
        let review_key = Review::key(review_id);
        let keys = [review_key.clone(), LedgerRecord::key(author)];

        let approval = self
            .transact("approve_review", &keys, |txn| {
                let now = Utc::now();
                let mut review: Review = txn.require(&review_key, || {
                    LedgerError::NotFound(format!("review {review_id}"))
                })?;
                review.moderate(true, reward, actor.id, now)?;
                let mutation = LedgerMutation::spendable(
                    reward,
                    TransactionKind::ReviewReward,
                    "review approved",
                    actor.id,
                )
                .with_reference(review_id);
                let posting = post(txn, author, &mutation, now)?;
                txn.put(&review_key, &review)?;
                Ok(ReviewApproval {
                    review,
                    ledger: posting.ledger,
                    entry: posting.entry,
                })
            })
            .await?;

        tracing::info!(%review_id, user_id = %author, reward, "review approved");
        Ok(approval)
    }

    /// Rejects a pending review. No ledger effect.
    ///
    /// # Errors
    ///
    /// Same as [`LedgerService::approve_review`].
    pub async fn reject_review(&self, actor: &Actor, review_id: ReviewId) -> Result<Review, LedgerError> {
        actor.require_admin()?;
        let key = Review::key(review_id);
        let review = self
            .transact("reject_review", std::slice::from_ref(&key), |txn| {
                let mut review: Review = txn.require(&key, || {
                    LedgerError::NotFound(format!("review {review_id}"))
                })?;
                review.moderate(false, 0, actor.id, Utc::now())?;
                txn.put(&key, &review)?;
                Ok(review)
            })
            .await?;

        tracing::info!(%review_id, "review rejected");
        Ok(review)
    }

    /// Stores a pending deal offered by the calling partner.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthorized`] for plain users and
    /// [`LedgerError::Validation`] for a blank title or non-positive price.
    pub async fn submit_deal(&self, actor: &Actor, title: String, price: i64) -> Result<Deal, LedgerError> {
        actor.require_partner()?;
        let deal = Deal::submit(actor.id, title, price, Utc::now())?;
        let key = Deal::key(deal.id);
        self.transact("submit_deal", std::slice::from_ref(&key), |txn| {
            txn.insert(&key, &deal)
        })
        .await?;

        tracing::info!(partner_id = %actor.id, deal_id = %deal.id, price, "deal submitted");
        Ok(deal)
    }

    /// Activates a pending deal.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthorized`] for non-admins,
    /// [`LedgerError::DealNotFound`] for an unknown deal, and
    /// [`LedgerError::NotAwaitingApproval`] unless it is pending.
    pub async fn approve_deal(&self, actor: &Actor, deal_id: DealId) -> Result<Deal, LedgerError> {
        self.moderate_deal(actor, deal_id, true).await
    }

    /// Rejects a pending deal.
    ///
    /// # Errors
    ///
    /// Same as [`LedgerService::approve_deal`].
    pub async fn reject_deal(&self, actor: &Actor, deal_id: DealId) -> Result<Deal, LedgerError> {
        self.moderate_deal(actor, deal_id, false).await
    }

    async fn moderate_deal(
        &self,
        actor: &Actor,
        deal_id: DealId,
        approve: bool,
    ) -> Result<Deal, LedgerError> {
        actor.require_admin()?;
        let key = Deal::key(deal_id);
        let deal = self
            .transact("moderate_deal", std::slice::from_ref(&key), |txn| {
                let mut deal: Deal =
                    txn.require(&key, || LedgerError::DealNotFound(deal_id.to_string()))?;
                deal.moderate(approve, Utc::now())?;
                txn.put(&key, &deal)?;
                Ok(deal)
            })
            .await?;

        tracing::info!(%deal_id, status = ?deal.status, "deal moderated");
        Ok(deal)
    }

    /// Withdraws an active deal from sale. Tickets already sold stay
    /// redeemable.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DealNotFound`] for an unknown deal,
    /// [`LedgerError::NotOwner`] unless the caller owns it or is an admin,
    /// and [`LedgerError::InvalidState`] unless it is active.
    pub async fn deactivate_deal(&self, actor: &Actor, deal_id: DealId) -> Result<Deal, LedgerError> {
        actor.require_partner()?;
        let key = Deal::key(deal_id);
        let deal = self
            .transact("deactivate_deal", std::slice::from_ref(&key), |txn| {
                let mut deal: Deal =
                    txn.require(&key, || LedgerError::DealNotFound(deal_id.to_string()))?;
                if deal.partner_id != actor.id && !actor.is_admin() {
                    return Err(LedgerError::NotOwner);
                }
                deal.deactivate()?;
                txn.put(&key, &deal)?;
                Ok(deal)
            })
            .await?;

        tracing::info!(%deal_id, "deal deactivated");
        Ok(deal)
    }

    /// Returns a review.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if it does not exist.
    pub async fn review(&self, review_id: ReviewId) -> Result<Review, LedgerError> {
        self.load(Review::key(review_id))
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("review {review_id}")))
    }

    /// Returns a deal.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DealNotFound`] if it does not exist.
    pub async fn deal(&self, deal_id: DealId) -> Result<Deal, LedgerError> {
        self.load(Deal::key(deal_id))
            .await?
            .ok_or_else(|| LedgerError::DealNotFound(deal_id.to_string()))
    }
}
