//! Referral commissions on subscription payments.

use chrono::Utc;

use super::LedgerService;
use crate::domain::{
    Actor, BillingReason, CustomerLink, PaymentEvent, PaymentEventId, ReferralOutcome,
    ReferralReward, RewardStatus, SkipReason, UserId, UserProfile, reward_amount,
};
use crate::error::LedgerError;
use crate::persistence::DocumentStore;

impl<S: DocumentStore> LedgerService<S> {
    /// Processes a verified payment-succeeded event.
    ///
    /// Reprocessing the same event id returns [`ReferralOutcome::Duplicate`]
    /// with the stored record. The referrer's rate is decided on the first
    /// qualifying payment and written to their profile in the same commit
    /// as the reward record.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] for a malformed event and
    /// [`LedgerError::NotFound`] if the referrer's profile is missing.
    pub async fn process_payment(&self, event: PaymentEvent) -> Result<ReferralOutcome, LedgerError> {
        event.validate()?;
        let event_id = event.event_id.clone();

        if let Some(existing) = self.load::<ReferralReward>(ReferralReward::key(&event_id)).await? {
            tracing::debug!(%event_id, "payment event already processed");
            return Ok(ReferralOutcome::Duplicate(existing));
        }
        if event.billing_reason == BillingReason::SubscriptionCreate {
            return Ok(skipped(&event_id, SkipReason::InitialSubscription));
        }

        // Customer links and referrer ids are immutable once written, so
        // they are resolved ahead of the transaction.
        let Some(link) = self
            .load::<CustomerLink>(CustomerLink::key(&event.customer_id))
            .await?
        else {
            return Ok(skipped(&event_id, SkipReason::UnknownCustomer));
        };
        let referred_id = link.user_id;
        let Some(referrer_id) = self
            .load::<UserProfile>(UserProfile::key(referred_id))
            .await?
            .and_then(|p| p.referrer_id)
        else {
            return Ok(skipped(&event_id, SkipReason::NoReferrer));
        };

        let reward_key = ReferralReward::key(&event_id);
        let referrer_key = UserProfile::key(referrer_id);
        let keys = [reward_key.clone(), referrer_key.clone()];
        let policy = self.settings.referral;

        let outcome = self
            .transact("process_payment", &keys, |txn| {
                if let Some(existing) = txn.get::<ReferralReward>(&reward_key)? {
                    return Ok(ReferralOutcome::Duplicate(existing));
                }
                let mut referrer: UserProfile = txn.require(&referrer_key, || {
                    LedgerError::NotFound(format!("referrer {referrer_id}"))
                })?;
                let (rate, newly_set) =
                    policy.resolve_rate(referrer.reward_rate_bps, event.occurred_at);
                if newly_set {
                    referrer.reward_rate_bps = Some(rate);
                    txn.put(&referrer_key, &referrer)?;
                }

                let amount = reward_amount(event.amount, rate);
                if amount == 0 {
                    return Ok(ReferralOutcome::Skipped(SkipReason::ZeroReward));
                }
                let reward = ReferralReward {
                    event_id: event_id.clone(),
                    referrer_id,
                    referred_id,
                    payment_amount: event.amount,
                    reward_rate_bps: rate,
                    reward_amount: amount,
                    reward_status: RewardStatus::Pending,
                    created_at: Utc::now(),
                    paid_at: None,
                };
                txn.put(&reward_key, &reward)?;
                Ok(ReferralOutcome::Rewarded(reward))
            })
            .await?;

        match &outcome {
            ReferralOutcome::Rewarded(reward) => tracing::info!(
                %event_id,
                %referrer_id,
                %referred_id,
                rate_bps = reward.reward_rate_bps,
                amount = reward.reward_amount,
                "referral reward recorded"
            ),
            ReferralOutcome::Duplicate(_) => {
                tracing::debug!(%event_id, "payment event already processed");
            }
            ReferralOutcome::Skipped(reason) => {
                tracing::debug!(%event_id, ?reason, "payment event skipped");
            }
        }
        Ok(outcome)
    }

    /// Flips a referral reward to paid.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthorized`] for non-admins,
    /// [`LedgerError::NotFound`] for an unknown event, and
    /// [`LedgerError::InvalidState`] if it was already paid.
    pub async fn mark_referral_paid(
        &self,
        actor: &Actor,
        event_id: PaymentEventId,
    ) -> Result<ReferralReward, LedgerError> {
        actor.require_admin()?;
        let key = ReferralReward::key(&event_id);
        let reward = self
            .transact("mark_referral_paid", std::slice::from_ref(&key), |txn| {
                let mut reward: ReferralReward = txn.require(&key, || {
                    LedgerError::NotFound(format!("referral reward {event_id}"))
                })?;
                reward.mark_paid(Utc::now())?;
                txn.put(&key, &reward)?;
                Ok(reward)
            })
            .await?;

        tracing::info!(%event_id, amount = reward.reward_amount, "referral reward paid");
        Ok(reward)
    }

    /// Returns the rewards earned by `referrer_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] on storage failure.
    pub async fn referral_rewards(&self, referrer_id: UserId) -> Result<Vec<ReferralReward>, LedgerError> {
        let mut rewards: Vec<ReferralReward> =
            self.find("referrer_id", &referrer_id.to_string()).await?;
        rewards.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rewards)
    }
}

fn skipped(event_id: &PaymentEventId, reason: SkipReason) -> ReferralOutcome {
    tracing::debug!(%event_id, ?reason, "payment event skipped");
    ReferralOutcome::Skipped(reason)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, TimeZone};
    use tokio_test::assert_ok;

    use super::*;
    use crate::domain::CustomerId;
    use crate::persistence::MemoryStore;
    use crate::service::testing::{admin, service};
    use crate::service::{LedgerService, NewUser};

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0)
            .single()
            .unwrap_or_default()
    }

    fn event(id: &str, customer: &str, amount: i64, when: DateTime<Utc>) -> PaymentEvent {
        PaymentEvent {
            event_id: PaymentEventId::new(id),
            customer_id: CustomerId::new(customer),
            amount,
            billing_reason: BillingReason::SubscriptionCycle,
            occurred_at: when,
        }
    }

    /// Registers a referrer and a referred customer `cus`.
    async fn referral_pair(svc: &LedgerService<MemoryStore>, cus: &str) -> (UserId, UserId) {
        let referrer = UserId::new();
        let referred = UserId::new();
        assert_ok!(
            svc.register_user(NewUser {
                user_id: referrer,
                email: "referrer@example.com".to_string(),
                referrer_id: None,
                customer_id: None,
            })
            .await
        );
        assert_ok!(
            svc.register_user(NewUser {
                user_id: referred,
                email: "referred@example.com".to_string(),
                referrer_id: Some(referrer),
                customer_id: Some(CustomerId::new(cus)),
            })
            .await
        );
        (referrer, referred)
    }

    #[tokio::test]
    async fn renewal_rewards_referrer() {
        let svc = service();
        let (referrer, referred) = referral_pair(&svc, "cus_1").await;

        let outcome = assert_ok!(
            svc.process_payment(event("evt_1", "cus_1", 1000, at(2024, 6, 1)))
                .await
        );
        let ReferralOutcome::Rewarded(reward) = outcome else {
            panic!("expected a reward, got {outcome:?}");
        };
        assert_eq!(reward.referrer_id, referrer);
        assert_eq!(reward.referred_id, referred);
        assert_eq!(reward.reward_rate_bps, 3000);
        assert_eq!(reward.reward_amount, 300);
        assert_eq!(reward.reward_status, RewardStatus::Pending);

        let profile = assert_ok!(svc.profile(referrer).await);
        assert_eq!(profile.reward_rate_bps, Some(3000));
    }

    #[tokio::test]
    async fn replayed_event_is_duplicate() {
        let svc = service();
        referral_pair(&svc, "cus_1").await;
        let first = assert_ok!(
            svc.process_payment(event("evt_1", "cus_1", 1000, at(2024, 6, 1)))
                .await
        );
        let second = assert_ok!(
            svc.process_payment(event("evt_1", "cus_1", 1000, at(2024, 6, 1)))
                .await
        );
        let ReferralOutcome::Rewarded(original) = first else {
            panic!("expected a reward");
        };
        assert_eq!(second, ReferralOutcome::Duplicate(original));
    }

    #[tokio::test]
    async fn rate_is_locked_after_first_payment() {
        let svc = service();
        let (referrer, _) = referral_pair(&svc, "cus_1").await;
        assert_ok!(
            svc.process_payment(event("evt_1", "cus_1", 1000, at(2024, 12, 1)))
                .await
        );
        let late = assert_ok!(
            svc.process_payment(event("evt_2", "cus_1", 1000, at(2026, 3, 1)))
                .await
        );
        let ReferralOutcome::Rewarded(reward) = late else {
            panic!("expected a reward, got {late:?}");
        };
        assert_eq!(reward.reward_rate_bps, 3000);
        assert_eq!(reward.reward_amount, 300);

        let rewards = assert_ok!(svc.referral_rewards(referrer).await);
        assert_eq!(rewards.len(), 2);
    }

    #[tokio::test]
    async fn first_payment_after_cutoff_uses_standard_rate() {
        let svc = service();
        referral_pair(&svc, "cus_1").await;
        let outcome = assert_ok!(
            svc.process_payment(event("evt_1", "cus_1", 999, at(2025, 2, 1)))
                .await
        );
        let ReferralOutcome::Rewarded(reward) = outcome else {
            panic!("expected a reward, got {outcome:?}");
        };
        assert_eq!(reward.reward_rate_bps, 2000);
        assert_eq!(reward.reward_amount, 199);
    }

    #[tokio::test]
    async fn skip_reasons() {
        let svc = service();
        referral_pair(&svc, "cus_ref").await;
        let loner = UserId::new();
        assert_ok!(
            svc.register_user(NewUser {
                user_id: loner,
                email: "loner@example.com".to_string(),
                referrer_id: None,
                customer_id: Some(CustomerId::new("cus_loner")),
            })
            .await
        );

        let mut initial = event("evt_a", "cus_ref", 1000, at(2024, 6, 1));
        initial.billing_reason = BillingReason::SubscriptionCreate;
        let cases = [
            (initial, SkipReason::InitialSubscription),
            (
                event("evt_b", "cus_nobody", 1000, at(2024, 6, 1)),
                SkipReason::UnknownCustomer,
            ),
            (
                event("evt_c", "cus_loner", 1000, at(2024, 6, 1)),
                SkipReason::NoReferrer,
            ),
            (
                event("evt_d", "cus_ref", 3, at(2024, 6, 1)),
                SkipReason::ZeroReward,
            ),
        ];
        for (event, reason) in cases {
            let outcome = assert_ok!(svc.process_payment(event).await);
            assert_eq!(outcome, ReferralOutcome::Skipped(reason));
        }
    }

    #[tokio::test]
    async fn zero_reward_still_locks_rate() {
        let svc = service();
        let (referrer, _) = referral_pair(&svc, "cus_1").await;
        assert_ok!(
            svc.process_payment(event("evt_1", "cus_1", 1, at(2024, 6, 1)))
                .await
        );
        let profile = assert_ok!(svc.profile(referrer).await);
        assert_eq!(profile.reward_rate_bps, Some(3000));
    }

    #[tokio::test]
    async fn reward_is_paid_once() {
        let svc = service();
        let admin = admin();
        referral_pair(&svc, "cus_1").await;
        assert_ok!(
            svc.process_payment(event("evt_1", "cus_1", 1000, at(2024, 6, 1)))
                .await
        );
        let paid = assert_ok!(
            svc.mark_referral_paid(&admin, PaymentEventId::new("evt_1"))
                .await
        );
        assert_eq!(paid.reward_status, RewardStatus::Paid);
        let again = svc
            .mark_referral_paid(&admin, PaymentEventId::new("evt_1"))
            .await;
        assert!(matches!(again, Err(LedgerError::InvalidState(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_replays_create_one_record() {
        let svc = Arc::new(service());
        let (referrer, _) = referral_pair(&svc, "cus_1").await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let svc = Arc::clone(&svc);
            handles.push(tokio::spawn(async move {
                svc.process_payment(event("evt_1", "cus_1", 1000, at(2024, 6, 1)))
                    .await
            }));
        }
        let mut rewarded = 0;
        for handle in handles {
            match handle.await {
                Ok(Ok(ReferralOutcome::Rewarded(_))) => rewarded += 1,
                Ok(Ok(ReferralOutcome::Duplicate(_))) => {}
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!(rewarded, 1);
        let rewards = assert_ok!(svc.referral_rewards(referrer).await);
        assert_eq!(rewards.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_payments_agree_on_rate() {
        let svc = Arc::new(service());
        let (referrer, _) = referral_pair(&svc, "cus_1").await;

        let mut handles = Vec::new();
        for i in 0..6 {
            let svc = Arc::clone(&svc);
            // Events straddle the cutoff; whichever commits first decides.
            let when = if i % 2 == 0 { at(2024, 12, 31) } else { at(2025, 1, 2) };
            handles.push(tokio::spawn(async move {
                svc.process_payment(event(&format!("evt_{i}"), "cus_1", 1000, when))
                    .await
            }));
        }
        for handle in handles {
            assert!(matches!(handle.await, Ok(Ok(ReferralOutcome::Rewarded(_)))));
        }

        let rewards = assert_ok!(svc.referral_rewards(referrer).await);
        assert_eq!(rewards.len(), 6);
        let Some(first) = rewards.first() else {
            panic!("no rewards");
        };
        assert!(rewards.iter().all(|r| r.reward_rate_bps == first.reward_rate_bps));
        let profile = assert_ok!(svc.profile(referrer).await);
        assert_eq!(profile.reward_rate_bps, Some(first.reward_rate_bps));
    }
}
