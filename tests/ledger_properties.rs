//! Concurrency properties of the ledger checked through the public
//! service API.

#![allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use points_ledger::domain::{Actor, ReferralPolicy, Role, TransactionKind, UserId};
use points_ledger::error::LedgerError;
use points_ledger::persistence::{MemoryStore, RetryPolicy};
use points_ledger::service::{LedgerService, NewUser, ServiceSettings};

fn service() -> Arc<LedgerService<MemoryStore>> {
    Arc::new(LedgerService::new(
        MemoryStore::new(),
        ServiceSettings {
            retry: RetryPolicy {
                max_attempts: 100,
                base_backoff: Duration::from_millis(1),
            },
            review_reward: 10,
            referral: ReferralPolicy {
                cutoff: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
                rate_before_bps: 3000,
                rate_after_bps: 2000,
            },
        },
    ))
}

async fn register(svc: &LedgerService<MemoryStore>, role: Role) -> Actor {
    let actor = Actor::new(UserId::new(), format!("{role}@example.com"), role);
    svc.register_user(NewUser {
        user_id: actor.id,
        email: actor.email.clone(),
        referrer_id: None,
        customer_id: None,
    })
    .await
    .expect("registration");
    actor
}

/// Adjustments, purchases and reviews race on one ledger; afterwards the
/// balance equals the sum of the log and never went negative.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn ledger_reconciles_with_log_under_contention() {
    let svc = service();
    let admin = Actor::new(UserId::new(), "admin@example.com", Role::Admin);
    let shop = Actor::new(UserId::new(), "shop@example.com", Role::Partner);
    let user = register(&svc, Role::User).await;
    svc.adjust_balance(&admin, user.id, 50, "seed").await.expect("seed");

    let mut deals = Vec::new();
    for i in 0..6 {
        let deal = svc
            .submit_deal(&shop, format!("deal {i}"), 25)
            .await
            .expect("deal");
        svc.approve_deal(&admin, deal.id).await.expect("approve");
        deals.push(deal.id);
    }

    let mut handles = Vec::new();
    for (i, deal_id) in deals.into_iter().enumerate() {
        let user_id = user.id;
        let buyer = user.clone();
        let svc_buy = Arc::clone(&svc);
        handles.push(tokio::spawn(async move {
            svc_buy.purchase_deal(&buyer, deal_id).await.map(|_| ())
        }));

        let svc = Arc::clone(&svc);
        let admin = admin.clone();
        let amount = if i % 2 == 0 { 15 } else { -20 };
        handles.push(tokio::spawn(async move {
            svc.adjust_balance(&admin, user_id, amount, "race").await.map(|_| ())
        }));
    }

    for handle in handles {
        match handle.await.expect("join") {
            Ok(())
            | Err(LedgerError::InsufficientBalance { .. })
            | Err(LedgerError::InsufficientPoints { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    let ledger = svc.ledger(user.id).await.expect("ledger");
    let log = svc.transactions(user.id).await.expect("log");
    assert!(ledger.usable_balance >= 0);
    assert_eq!(ledger.usable_balance, log.iter().map(|e| e.amount).sum::<i64>());
    assert_eq!(ledger.balance, ledger.usable_balance);

    for entry in &log {
        assert!(entry.after_balance >= 0);
        assert_eq!(entry.after_balance - entry.before_balance, entry.amount);
    }

    let tickets = svc.tickets(user.id).await.expect("tickets");
    let purchases = log
        .iter()
        .filter(|e| e.kind == TransactionKind::DealPurchase)
        .count();
    assert_eq!(tickets.len(), purchases);
}

/// Ledgers of different users do not interfere.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn independent_users_all_succeed() {
    let svc = service();
    let admin = Actor::new(UserId::new(), "admin@example.com", Role::Admin);

    let mut users = Vec::new();
    for _ in 0..16 {
        users.push(register(&svc, Role::User).await.id);
    }

    let mut handles = Vec::new();
    for user_id in users.iter().copied() {
        let svc = Arc::clone(&svc);
        let admin = admin.clone();
        handles.push(tokio::spawn(async move {
            svc.adjust_balance(&admin, user_id, 7, "airdrop").await
        }));
    }
    for handle in handles {
        assert!(handle.await.expect("join").is_ok());
    }
    for user_id in users {
        assert_eq!(svc.ledger(user_id).await.expect("ledger").usable_balance, 7);
    }
}
