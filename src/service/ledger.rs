//! Ledger primitive, registration, and ledger reads.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::LedgerService;
use crate::domain::{
    Actor, CustomerId, CustomerLink, LedgerMutation, LedgerRecord, TransactionEntry,
    TransactionId, UserId, UserProfile,
};
use crate::error::LedgerError;
use crate::persistence::{DocumentStore, Transaction};

/// A committed ledger change: the new balances and the log entry that
/// records them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Posting {
    /// Ledger after the change.
    pub ledger: LedgerRecord,
    /// Log entry written with the change.
    pub entry: TransactionEntry,
}

/// Registration input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    /// Id issued by the authentication layer.
    pub user_id: UserId,
    /// Contact email.
    pub email: String,
    /// Referring user, if any.
    pub referrer_id: Option<UserId>,
    /// Payment-provider customer id, if already known.
    pub customer_id: Option<CustomerId>,
}

/// Posts `mutation` against the ledger of `user_id` inside `txn`.
///
/// This is the only code that writes a [`LedgerRecord`]. It reads the
/// record, evaluates the preconditions against that read, and buffers the
/// new record together with its [`TransactionEntry`], so the two commit
/// or fail together. The ledger key must be declared on `txn`.
pub(super) fn post(
    txn: &mut Transaction,
    user_id: UserId,
    mutation: &LedgerMutation,
    now: DateTime<Utc>,
) -> Result<Posting, LedgerError> {
    if mutation.delta.is_zero() {
        return Err(LedgerError::Validation(
            "ledger mutation changes nothing".to_string(),
        ));
    }

    let key = LedgerRecord::key(user_id);
    let current: LedgerRecord =
        txn.require(&key, || LedgerError::NotFound(format!("ledger {user_id}")))?;
    let next = current.apply(&mutation.delta, &mutation.preconditions, now)?;

    let entry = TransactionEntry {
        id: TransactionId::new(),
        user_id,
        amount: mutation.delta.usable,
        kind: mutation.kind,
        description: mutation.description.clone(),
        before_balance: current.usable_balance,
        after_balance: next.usable_balance,
        actor_id: mutation.actor_id,
        admin_email: mutation.admin_email.clone(),
        reference: mutation.reference.clone(),
        created_at: now,
    };

    txn.put(&key, &next)?;
    txn.insert(&entry.key(), &entry)?;
    Ok(Posting {
        ledger: next,
        entry,
    })
}

impl<S: DocumentStore> LedgerService<S> {
    /// Creates the profile and zeroed ledger of a new user in one commit.
    ///
    /// Calling it again with an existing id returns the stored profile
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] for a blank email or
    /// self-referral, [`LedgerError::NotFound`] for an unknown referrer,
    /// and [`LedgerError::InvalidState`] if the customer id is already
    /// linked to another user.
    pub async fn register_user(&self, new_user: NewUser) -> Result<UserProfile, LedgerError> {
        let email = new_user.email.trim().to_string();
        if email.is_empty() {
            return Err(LedgerError::Validation("email is empty".to_string()));
        }
        if new_user.referrer_id == Some(new_user.user_id) {
            return Err(LedgerError::Validation(
                "a user cannot refer themselves".to_string(),
            ));
        }

        let user_id = new_user.user_id;
        let mut keys = vec![UserProfile::key(user_id), LedgerRecord::key(user_id)];
        if let Some(referrer) = new_user.referrer_id {
            keys.push(UserProfile::key(referrer));
        }
        if let Some(customer) = &new_user.customer_id {
            keys.push(CustomerLink::key(customer));
        }

        let (profile, created) = self
            .transact("register_user", &keys, |txn| {
                if let Some(existing) = txn.get::<UserProfile>(&UserProfile::key(user_id))? {
                    return Ok((existing, false));
                }
                if let Some(referrer) = new_user.referrer_id {
                    txn.require::<UserProfile>(&UserProfile::key(referrer), || {
                        LedgerError::NotFound(format!("referrer {referrer}"))
                    })?;
                }

                let now = Utc::now();
                if let Some(customer) = &new_user.customer_id {
                    link(txn, user_id, customer, now)?;
                }
                let profile = UserProfile {
                    user_id,
                    email: email.clone(),
                    referrer_id: new_user.referrer_id,
                    customer_id: new_user.customer_id.clone(),
                    reward_rate_bps: None,
                    created_at: now,
                };
                txn.put(&UserProfile::key(user_id), &profile)?;
                txn.put(&LedgerRecord::key(user_id), &LedgerRecord::new(user_id))?;
                Ok((profile, true))
            })
            .await?;

        if created {
            tracing::info!(%user_id, referred = profile.referrer_id.is_some(), "user registered");
        }
        Ok(profile)
    }

    /// Links the caller's profile to a payment-provider customer id.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if the caller has no profile,
    /// [`LedgerError::Validation`] for a blank id, and
    /// [`LedgerError::InvalidState`] if the id belongs to another user or
    /// the profile is already linked to a different id.
    pub async fn link_customer(
        &self,
        actor: &Actor,
        customer_id: CustomerId,
    ) -> Result<UserProfile, LedgerError> {
        if customer_id.as_str().trim().is_empty() {
            return Err(LedgerError::Validation("customer_id is empty".to_string()));
        }
        let user_id = actor.id;
        let keys = [UserProfile::key(user_id), CustomerLink::key(&customer_id)];

        let profile = self
            .transact("link_customer", &keys, |txn| {
                let mut profile: UserProfile = txn.require(&UserProfile::key(user_id), || {
                    LedgerError::NotFound(format!("profile {user_id}"))
                })?;
                match &profile.customer_id {
                    Some(existing) if existing == &customer_id => return Ok(profile),
                    Some(_) => {
                        return Err(LedgerError::InvalidState(
                            "profile already linked to another customer".to_string(),
                        ));
                    }
                    None => {}
                }
                link(txn, user_id, &customer_id, Utc::now())?;
                profile.customer_id = Some(customer_id.clone());
                txn.put(&UserProfile::key(user_id), &profile)?;
                Ok(profile)
            })
            .await?;

        tracing::info!(%user_id, %customer_id, "customer linked");
        Ok(profile)
    }

    /// The atomic-update primitive: applies `mutation` to the ledger of
    /// `user_id` and appends its log entry in one commit.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if the ledger does not exist,
    /// [`LedgerError::InsufficientBalance`] if a precondition fails,
    /// [`LedgerError::Validation`] for an empty delta, and
    /// [`LedgerError::Conflict`] when retries are exhausted.
    pub async fn apply_ledger_mutation(
        &self,
        user_id: UserId,
        mutation: LedgerMutation,
    ) -> Result<Posting, LedgerError> {
        let keys = [LedgerRecord::key(user_id)];
        let posting = self
            .transact("apply_ledger_mutation", &keys, |txn| {
                post(txn, user_id, &mutation, Utc::now())
            })
            .await?;

        tracing::info!(
            %user_id,
            amount = posting.entry.amount,
            kind = %posting.entry.kind,
            usable = posting.ledger.usable_balance,
            "ledger mutation committed"
        );
        Ok(posting)
    }

    /// Returns the ledger of `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if it does not exist.
    pub async fn ledger(&self, user_id: UserId) -> Result<LedgerRecord, LedgerError> {
        self.load(LedgerRecord::key(user_id))
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("ledger {user_id}")))
    }

    /// Returns the profile of `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if it does not exist.
    pub async fn profile(&self, user_id: UserId) -> Result<UserProfile, LedgerError> {
        self.load(UserProfile::key(user_id))
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("profile {user_id}")))
    }

    /// Returns the transaction log of `user_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on storage failure.
    pub async fn transactions(&self, user_id: UserId) -> Result<Vec<TransactionEntry>, LedgerError> {
        let mut entries: Vec<TransactionEntry> =
            self.find("user_id", &user_id.to_string()).await?;
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(entries)
    }
}

/// Claims `customer` for `user_id`. The link key must be declared on `txn`.
fn link(
    txn: &mut Transaction,
    user_id: UserId,
    customer: &CustomerId,
    now: DateTime<Utc>,
) -> Result<(), LedgerError> {
    let key = CustomerLink::key(customer);
    match txn.get::<CustomerLink>(&key)? {
        Some(existing) if existing.user_id != user_id => Err(LedgerError::InvalidState(format!(
            "customer {customer} is linked to another user"
        ))),
        Some(_) => Ok(()),
        None => txn.put(
            &key,
            &CustomerLink {
                customer_id: customer.clone(),
                user_id,
                linked_at: now,
            },
        ),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::{Role, TransactionKind};
    use crate::service::testing::{admin, funded_user, service};

    #[tokio::test]
    async fn registration_opens_a_zeroed_ledger() {
        let svc = service();
        let user = funded_user(&svc, 0).await;
        let Ok(ledger) = svc.ledger(user.id).await else {
            panic!("ledger missing");
        };
        assert_eq!(ledger, LedgerRecord::new(user.id));
    }

    #[tokio::test]
    async fn registration_is_idempotent() {
        let svc = service();
        let new_user = NewUser {
            user_id: UserId::new(),
            email: "a@example.com".to_string(),
            referrer_id: None,
            customer_id: None,
        };
        let first = svc.register_user(new_user.clone()).await;
        let second = svc
            .register_user(NewUser {
                email: "changed@example.com".to_string(),
                ..new_user
            })
            .await;
        assert_eq!(first.ok(), second.ok());
    }

    #[tokio::test]
    async fn unknown_referrer_is_not_found() {
        let svc = service();
        let result = svc
            .register_user(NewUser {
                user_id: UserId::new(),
                email: "a@example.com".to_string(),
                referrer_id: Some(UserId::new()),
                customer_id: None,
            })
            .await;
        assert!(matches!(result, Err(LedgerError::NotFound(_))));
    }

    #[tokio::test]
    async fn self_referral_is_rejected() {
        let svc = service();
        let id = UserId::new();
        let result = svc
            .register_user(NewUser {
                user_id: id,
                email: "a@example.com".to_string(),
                referrer_id: Some(id),
                customer_id: None,
            })
            .await;
        assert!(matches!(result, Err(LedgerError::Validation(_))));
    }

    #[tokio::test]
    async fn customer_id_links_once() {
        let svc = service();
        let a = funded_user(&svc, 0).await;
        let b = funded_user(&svc, 0).await;
        let cus = CustomerId::new("cus_42");

        assert!(svc.link_customer(&a, cus.clone()).await.is_ok());
        assert!(svc.link_customer(&a, cus.clone()).await.is_ok());
        assert!(matches!(
            svc.link_customer(&b, cus).await,
            Err(LedgerError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn mutation_on_missing_ledger_is_not_found() {
        let svc = service();
        let result = svc
            .apply_ledger_mutation(
                UserId::new(),
                LedgerMutation::spendable(5, TransactionKind::AdminAdjustment, "x", admin().id),
            )
            .await;
        assert!(matches!(result, Err(LedgerError::NotFound(_))));
    }

    #[tokio::test]
    async fn zero_delta_is_rejected() {
        let svc = service();
        let user = funded_user(&svc, 10).await;
        let result = svc
            .apply_ledger_mutation(
                user.id,
                LedgerMutation::spendable(0, TransactionKind::AdminAdjustment, "x", user.id),
            )
            .await;
        assert!(matches!(result, Err(LedgerError::Validation(_))));
    }

    #[tokio::test]
    async fn every_mutation_writes_one_entry() {
        let svc = service();
        let user = funded_user(&svc, 100).await;
        let Ok(posting) = svc
            .apply_ledger_mutation(
                user.id,
                LedgerMutation::spendable(-40, TransactionKind::DealPurchase, "coffee", user.id)
                    .with_reference("deal-1"),
            )
            .await
        else {
            panic!("debit rejected");
        };
        assert_eq!(posting.entry.before_balance, 100);
        assert_eq!(posting.entry.after_balance, 60);
        assert_eq!(posting.entry.reference.as_deref(), Some("deal-1"));

        let Ok(log) = svc.transactions(user.id).await else {
            panic!("log unreadable");
        };
        assert_eq!(log.len(), 2);
        let sum: i64 = log.iter().map(|e| e.amount).sum();
        assert_eq!(sum, 60);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_mutations_reconcile() {
        let svc = Arc::new(service());
        let user = funded_user(&svc, 0).await;
        let user_id = user.id;

        let mut handles = Vec::new();
        for i in 0..20i64 {
            let svc = Arc::clone(&svc);
            let actor = Actor::new(UserId::new(), "admin@example.com", Role::Admin);
            handles.push(tokio::spawn(async move {
                let amount = if i % 4 == 3 { -15 } else { 10 };
                svc.apply_ledger_mutation(
                    user_id,
                    LedgerMutation::spendable(
                        amount,
                        TransactionKind::AdminAdjustment,
                        "load test",
                        actor.id,
                    ),
                )
                .await
                .map(|_| amount)
            }));
        }

        let mut applied = 0i64;
        for handle in handles {
            if let Ok(Ok(amount)) = handle.await {
                applied += amount;
            }
        }

        let Ok(ledger) = svc.ledger(user.id).await else {
            panic!("ledger missing");
        };
        let Ok(log) = svc.transactions(user.id).await else {
            panic!("log unreadable");
        };
        assert!(ledger.usable_balance >= 0);
        assert_eq!(ledger.usable_balance, applied);
        assert_eq!(log.iter().map(|e| e.amount).sum::<i64>(), applied);
    }
}
