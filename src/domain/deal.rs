//! Partner deals, purchased tickets, and partner payout balances.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{DealId, UserId};
use crate::error::LedgerError;
use crate::persistence::{DocKey, Document};

/// Lifecycle of a deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    /// Submitted by the partner, waiting for moderation.
    Pending,
    /// Approved and purchasable.
    Active,
    /// Refused by moderation. Terminal.
    Rejected,
    /// Withdrawn from sale. Terminal.
    Inactive,
}

/// A store offer purchasable with points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Deal {
    /// Deal id.
    pub id: DealId,
    /// Partner who sells the deal and redeems its tickets.
    pub partner_id: UserId,
    /// Display title.
    pub title: String,
    /// Price in points.
    pub price: i64,
    /// Lifecycle status.
    pub status: DealStatus,
    /// Submission timestamp.
    pub created_at: DateTime<Utc>,
    /// Moderation timestamp.
    pub moderated_at: Option<DateTime<Utc>>,
}

impl Document for Deal {
    const COLLECTION: &'static str = "deals";
}

impl Deal {
    /// Storage key of the deal.
    #[must_use]
    pub fn key(id: DealId) -> DocKey {
        DocKey::of::<Self>(id)
    }

    /// Creates a pending deal.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if the title is blank or the
    /// price is not positive.
    pub fn submit(
        partner_id: UserId,
        title: String,
        price: i64,
        now: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        if title.trim().is_empty() {
            return Err(LedgerError::Validation("deal title is empty".to_string()));
        }
        if price <= 0 {
            return Err(LedgerError::Validation(format!(
                "deal price must be positive, got {price}"
            )));
        }
        Ok(Self {
            id: DealId::new(),
            partner_id,
            title,
            price,
            status: DealStatus::Pending,
            created_at: now,
            moderated_at: None,
        })
    }

    /// Records the moderation decision.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotAwaitingApproval`] unless the deal is
    /// pending.
    pub fn moderate(&mut self, approve: bool, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.status != DealStatus::Pending {
            return Err(LedgerError::NotAwaitingApproval);
        }
        self.status = if approve {
            DealStatus::Active
        } else {
            DealStatus::Rejected
        };
        self.moderated_at = Some(now);
        Ok(())
    }

    /// Withdraws an active deal from sale.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidState`] unless the deal is active.
    pub fn deactivate(&mut self) -> Result<(), LedgerError> {
        if self.status != DealStatus::Active {
            return Err(LedgerError::InvalidState(
                "only active deals can be deactivated".to_string(),
            ));
        }
        self.status = DealStatus::Inactive;
        Ok(())
    }
}

/// A purchased deal, keyed by (buyer, deal).
///
/// `used` flips from `false` to `true` exactly once, on redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Ticket {
    /// Buyer.
    pub user_id: UserId,
    /// Purchased deal.
    pub deal_id: DealId,
    /// Partner allowed to redeem the ticket.
    pub partner_id: UserId,
    /// Deal title at purchase time.
    pub deal_title: String,
    /// Price paid, snapshotted from the deal.
    pub price: i64,
    /// Whether the ticket has been redeemed.
    pub used: bool,
    /// Purchase timestamp.
    pub purchased_at: DateTime<Utc>,
    /// Redemption timestamp.
    pub redeemed_at: Option<DateTime<Utc>>,
}

impl Document for Ticket {
    const COLLECTION: &'static str = "tickets";
}

impl Ticket {
    /// Storage key of the ticket `user_id` holds for `deal_id`.
    #[must_use]
    pub fn key(user_id: UserId, deal_id: DealId) -> DocKey {
        DocKey::of::<Self>(format!("{user_id}:{deal_id}"))
    }

    /// Snapshots `deal` into a fresh, unused ticket.
    #[must_use]
    pub fn issue(user_id: UserId, deal: &Deal, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            deal_id: deal.id,
            partner_id: deal.partner_id,
            deal_title: deal.title.clone(),
            price: deal.price,
            used: false,
            purchased_at: now,
            redeemed_at: None,
        }
    }

    /// Marks the ticket used on behalf of `partner_id`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotOwner`] if the ticket belongs to another
    /// partner and [`LedgerError::AlreadyRedeemed`] if it was used.
    pub fn redeem(&mut self, partner_id: UserId, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.partner_id != partner_id {
            return Err(LedgerError::NotOwner);
        }
        if self.used {
            return Err(LedgerError::AlreadyRedeemed);
        }
        self.used = true;
        self.redeemed_at = Some(now);
        Ok(())
    }
}

/// Payout balances owed to a partner for redeemed tickets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PartnerPayouts {
    /// Partner.
    pub partner_id: UserId,
    /// Redeemed value not yet paid out.
    pub pending_balance: i64,
    /// Value paid out so far.
    pub paid_total: i64,
    /// Last redemption credit.
    pub last_credited_at: Option<DateTime<Utc>>,
    /// Last settlement.
    pub last_settled_at: Option<DateTime<Utc>>,
}

impl Document for PartnerPayouts {
    const COLLECTION: &'static str = "payouts";
}

impl PartnerPayouts {
    /// Storage key of the payouts of `partner_id`.
    #[must_use]
    pub fn key(partner_id: UserId) -> DocKey {
        DocKey::of::<Self>(partner_id)
    }

    /// Creates an empty payout record.
    #[must_use]
    pub fn new(partner_id: UserId) -> Self {
        Self {
            partner_id,
            pending_balance: 0,
            paid_total: 0,
            last_credited_at: None,
            last_settled_at: None,
        }
    }

    /// Adds a redeemed ticket's value to the pending balance.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] on overflow.
    pub fn credit(&mut self, amount: i64, now: DateTime<Utc>) -> Result<(), LedgerError> {
        self.pending_balance = self
            .pending_balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Validation("payout overflow".to_string()))?;
        self.last_credited_at = Some(now);
        Ok(())
    }

    /// Moves `amount` from pending to paid.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] for a non-positive amount and
    /// [`LedgerError::InsufficientBalance`] if it exceeds the pending
    /// balance.
    pub fn settle(&mut self, amount: i64, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::Validation(format!(
                "settlement amount must be positive, got {amount}"
            )));
        }
        if amount > self.pending_balance {
            return Err(LedgerError::InsufficientBalance {
                usable: self.pending_balance,
                requested: -amount,
            });
        }
        self.pending_balance -= amount;
        self.paid_total = self.paid_total.saturating_add(amount);
        self.last_settled_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn active_deal(partner: UserId, price: i64) -> Deal {
        let Ok(mut deal) = Deal::submit(partner, "Coffee for two".to_string(), price, Utc::now())
        else {
            panic!("valid deal rejected");
        };
        let _ = deal.moderate(true, Utc::now());
        deal
    }

    #[test]
    fn non_positive_price_is_rejected() {
        let result = Deal::submit(UserId::new(), "Free".to_string(), 0, Utc::now());
        assert!(matches!(result, Err(LedgerError::Validation(_))));
    }

    #[test]
    fn moderation_is_one_shot() {
        let mut deal = active_deal(UserId::new(), 60);
        assert_eq!(deal.status, DealStatus::Active);
        assert!(matches!(
            deal.moderate(false, Utc::now()),
            Err(LedgerError::NotAwaitingApproval)
        ));
    }

    #[test]
    fn ticket_snapshots_the_deal() {
        let partner = UserId::new();
        let deal = active_deal(partner, 60);
        let ticket = Ticket::issue(UserId::new(), &deal, Utc::now());
        assert_eq!(ticket.price, 60);
        assert_eq!(ticket.partner_id, partner);
        assert!(!ticket.used);
    }

    #[test]
    fn redeem_checks_owner_then_flag() {
        let partner = UserId::new();
        let deal = active_deal(partner, 60);
        let mut ticket = Ticket::issue(UserId::new(), &deal, Utc::now());

        assert!(matches!(
            ticket.redeem(UserId::new(), Utc::now()),
            Err(LedgerError::NotOwner)
        ));
        assert!(!ticket.used);
        assert!(ticket.redeem(partner, Utc::now()).is_ok());
        assert!(ticket.used);
        assert!(matches!(
            ticket.redeem(partner, Utc::now()),
            Err(LedgerError::AlreadyRedeemed)
        ));
    }

    #[test]
    fn settle_cannot_exceed_pending() {
        let mut payouts = PartnerPayouts::new(UserId::new());
        let _ = payouts.credit(60, Utc::now());
        assert!(payouts.settle(100, Utc::now()).is_err());
        assert!(payouts.settle(40, Utc::now()).is_ok());
        assert_eq!(payouts.pending_balance, 20);
        assert_eq!(payouts.paid_total, 40);
    }

    #[test]
    fn deactivate_requires_active() {
        let Ok(mut deal) = Deal::submit(UserId::new(), "Tea".to_string(), 5, Utc::now()) else {
            panic!("valid deal rejected");
        };
        assert!(deal.deactivate().is_err());
        let _ = deal.moderate(true, Utc::now());
        assert!(deal.deactivate().is_ok());
        assert_eq!(deal.status, DealStatus::Inactive);
    }
}
