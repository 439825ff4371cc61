//! Deal purchase, ticket redemption and partner payout settlement.

use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use super::LedgerService;
use super::ledger::post;
use crate::domain::{
    Actor, Deal, DealId, DealStatus, LedgerMutation, LedgerRecord, PartnerPayouts, Ticket,
    TransactionEntry, TransactionKind, UserId,
};
use crate::error::LedgerError;
use crate::persistence::DocumentStore;

/// Result of a deal purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Purchase {
    /// Fresh, unused ticket.
    pub ticket: Ticket,
    /// Buyer's ledger after the debit.
    pub ledger: LedgerRecord,
    /// The `deal_purchase` log entry.
    pub entry: TransactionEntry,
}

/// Result of a ticket redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Redemption {
    /// Ticket, now used.
    pub ticket: Ticket,
    /// Partner payouts after the credit.
    pub payouts: PartnerPayouts,
}

impl<S: DocumentStore> LedgerService<S> {
    /// Buys an active deal with points: debits the buyer and issues the
    /// ticket in one commit.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DealNotFound`] for an unknown deal,
    /// [`LedgerError::InvalidState`] if it is not active,
    /// [`LedgerError::AlreadyPurchased`] if the buyer holds a ticket for
    /// it, [`LedgerError::NotFound`] if the buyer has no ledger, and
    /// [`LedgerError::InsufficientPoints`] if the usable balance is below
    /// the price.
    pub async fn purchase_deal(&self, actor: &Actor, deal_id: DealId) -> Result<Purchase, LedgerError> {
        let buyer = actor.id;
        let deal_key = Deal::key(deal_id);
        let ticket_key = Ticket::key(buyer, deal_id);
        let ledger_key = LedgerRecord::key(buyer);
        let keys = [deal_key.clone(), ticket_key.clone(), ledger_key.clone()];

        let purchase = self
            .transact("purchase_deal", &keys, |txn| {
                let now = Utc::now();
                let deal: Deal =
                    txn.require(&deal_key, || LedgerError::DealNotFound(deal_id.to_string()))?;
                if deal.status != DealStatus::Active {
                    return Err(LedgerError::InvalidState(format!(
                        "deal {deal_id} is not on sale"
                    )));
                }
                if txn.get::<Ticket>(&ticket_key)?.is_some() {
                    return Err(LedgerError::AlreadyPurchased);
                }
                let ledger: LedgerRecord = txn.require(&ledger_key, || {
                    LedgerError::NotFound(format!("ledger {buyer}"))
                })?;
                if ledger.usable_balance < deal.price {
                    return Err(LedgerError::InsufficientPoints {
                        usable: ledger.usable_balance,
                        price: deal.price,
                    });
                }

                let mutation = LedgerMutation::spendable(
                    -deal.price,
                    TransactionKind::DealPurchase,
                    format!("purchased {}", deal.title),
                    buyer,
                )
                .with_reference(deal_id);
                let posting = post(txn, buyer, &mutation, now)?;
                let ticket = Ticket::issue(buyer, &deal, now);
                txn.put(&ticket_key, &ticket)?;
                Ok(Purchase {
                    ticket,
                    ledger: posting.ledger,
                    entry: posting.entry,
                })
            })
            .await?;

        tracing::info!(
            user_id = %buyer,
            %deal_id,
            price = purchase.ticket.price,
            "deal purchased"
        );
        Ok(purchase)
    }

    /// Redeems the ticket `buyer` holds for `deal_id` on behalf of the
    /// calling partner, crediting the partner's pending payout by the
    /// ticket's price. The `used` check and flip commit together with the
    /// payout credit, so duplicate scans succeed at most once.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthorized`] for plain users,
    /// [`LedgerError::NotFound`] for an unknown ticket,
    /// [`LedgerError::NotOwner`] if the ticket belongs to another partner,
    /// and [`LedgerError::AlreadyRedeemed`] if it was used.
    pub async fn redeem_ticket(
        &self,
        actor: &Actor,
        buyer: UserId,
        deal_id: DealId,
    ) -> Result<Redemption, LedgerError> {
        actor.require_partner()?;
        let partner_id = actor.id;
        let ticket_key = Ticket::key(buyer, deal_id);
        let payouts_key = PartnerPayouts::key(partner_id);
        let keys = [ticket_key.clone(), payouts_key.clone()];

        let redemption = self
            .transact("redeem_ticket", &keys, |txn| {
                let now = Utc::now();
                let mut ticket: Ticket = txn.require(&ticket_key, || {
                    LedgerError::NotFound(format!("ticket {buyer}:{deal_id}"))
                })?;
                ticket.redeem(partner_id, now)?;
                let mut payouts = txn
                    .get::<PartnerPayouts>(&payouts_key)?
                    .unwrap_or_else(|| PartnerPayouts::new(partner_id));
                payouts.credit(ticket.price, now)?;
                txn.put(&ticket_key, &ticket)?;
                txn.put(&payouts_key, &payouts)?;
                Ok(Redemption { ticket, payouts })
            })
            .await?;

        tracing::info!(
            %partner_id,
            user_id = %buyer,
            %deal_id,
            pending = redemption.payouts.pending_balance,
            "ticket redeemed"
        );
        Ok(redemption)
    }

    /// Pays out `amount` of a partner's pending balance.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthorized`] for non-admins,
    /// [`LedgerError::NotFound`] if the partner has no payouts,
    /// [`LedgerError::Validation`] for a non-positive amount, and
    /// [`LedgerError::InsufficientBalance`] if it exceeds the pending
    /// balance.
    pub async fn settle_payout(
        &self,
        actor: &Actor,
        partner_id: UserId,
        amount: i64,
    ) -> Result<PartnerPayouts, LedgerError> {
        actor.require_admin()?;
        let key = PartnerPayouts::key(partner_id);
        let payouts = self
            .transact("settle_payout", std::slice::from_ref(&key), |txn| {
                let mut payouts: PartnerPayouts = txn.require(&key, || {
                    LedgerError::NotFound(format!("payouts of partner {partner_id}"))
                })?;
                payouts.settle(amount, Utc::now())?;
                txn.put(&key, &payouts)?;
                Ok(payouts)
            })
            .await?;

        tracing::info!(
            %partner_id,
            amount,
            pending = payouts.pending_balance,
            admin_id = %actor.id,
            "payout settled"
        );
        Ok(payouts)
    }

    /// Returns the ticket `user_id` holds for `deal_id`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if it does not exist.
    pub async fn ticket(&self, user_id: UserId, deal_id: DealId) -> Result<Ticket, LedgerError> {
        self.load(Ticket::key(user_id, deal_id))
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("ticket {user_id}:{deal_id}")))
    }

    /// Returns every ticket bought by `user_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on storage failure.
    pub async fn tickets(&self, user_id: UserId) -> Result<Vec<Ticket>, LedgerError> {
        let mut tickets: Vec<Ticket> = self.find("user_id", &user_id.to_string()).await?;
        tickets.sort_by(|a, b| b.purchased_at.cmp(&a.purchased_at));
        Ok(tickets)
    }

    /// Returns the payout balances of `partner_id`, zeroed if nothing was
    /// redeemed yet.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on storage failure.
    pub async fn payouts(&self, partner_id: UserId) -> Result<PartnerPayouts, LedgerError> {
        Ok(self
            .load(PartnerPayouts::key(partner_id))
            .await?
            .unwrap_or_else(|| PartnerPayouts::new(partner_id)))
    }
}
