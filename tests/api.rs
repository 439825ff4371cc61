//! End-to-end tests of the REST surface against a live server backed by
//! the in-memory store.

#![allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, missing_docs)]

use std::net::SocketAddr;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use reqwest::{Client, RequestBuilder};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use points_ledger::api;
use points_ledger::app_state::AppState;
use points_ledger::config::LedgerConfig;
use points_ledger::persistence::{Backend, MemoryStore};
use points_ledger::service::LedgerService;

fn app() -> Router {
    let settings = LedgerConfig::from_env()
        .expect("default configuration")
        .service_settings();
    let state = AppState::new(LedgerService::new(
        Backend::Memory(MemoryStore::new()),
        settings,
    ));
    api::build_router().with_state(state)
}

async fn spawn_server() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app()).await.expect("server");
    });
    addr
}

struct Caller {
    id: Uuid,
    role: &'static str,
}

impl Caller {
    fn new(role: &'static str) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
        }
    }

    fn sign(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("x-actor-id", self.id.to_string())
            .header("x-actor-role", self.role)
            .header("x-actor-email", format!("{}@example.com", self.role))
    }
}

struct Harness {
    client: Client,
    base: String,
}

impl Harness {
    async fn start() -> Self {
        let addr = spawn_server().await;
        Self {
            client: Client::new(),
            base: format!("http://{addr}"),
        }
    }

    async fn post(&self, who: &Caller, path: &str, body: Value) -> (StatusCode, Value) {
        let resp = who
            .sign(self.client.post(format!("{}{path}", self.base)))
            .json(&body)
            .send()
            .await
            .expect("request");
        let status = StatusCode::from_u16(resp.status().as_u16()).expect("status");
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, who: &Caller, path: &str) -> (StatusCode, Value) {
        let resp = who
            .sign(self.client.get(format!("{}{path}", self.base)))
            .send()
            .await
            .expect("request");
        let status = StatusCode::from_u16(resp.status().as_u16()).expect("status");
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn register(&self, who: &Caller, body: Value) {
        let (status, _) = self.post(who, "/api/v1/users", body).await;
        assert_eq!(status, StatusCode::CREATED);
    }
}

#[tokio::test]
async fn health_is_public() {
    let resp = app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_identity_is_forbidden() {
    let resp = app()
        .oneshot(
            Request::post("/api/v1/users")
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn purchase_and_redeem_flow() {
    let h = Harness::start().await;
    let admin = Caller::new("admin");
    let shop = Caller::new("partner");
    let user = Caller::new("user");
    h.register(&user, json!({})).await;

    let (status, posting) = h
        .post(
            &admin,
            &format!("/api/v1/users/{}/adjustments", user.id),
            json!({ "amount": 100, "reason": "welcome bonus" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(posting["entry"]["admin_email"], "admin@example.com");

    let (_, deal) = h
        .post(&shop, "/api/v1/deals", json!({ "title": "Free coffee", "price": 60 }))
        .await;
    let deal_id = deal["id"].as_str().expect("deal id").to_string();
    let (status, _) = h
        .post(&admin, &format!("/api/v1/deals/{deal_id}/approve"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, purchase) = h
        .post(&user, &format!("/api/v1/deals/{deal_id}/purchase"), json!({}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(purchase["ledger"]["usable_balance"], 40);
    assert_eq!(purchase["entry"]["amount"], -60);
    assert_eq!(purchase["entry"]["kind"], "deal_purchase");
    assert_eq!(purchase["ticket"]["used"], false);

    let redeem = format!("/api/v1/deals/{deal_id}/tickets/{}/redeem", user.id);
    let (status, redemption) = h.post(&shop, &redeem, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(redemption["ticket"]["used"], true);
    assert_eq!(redemption["payouts"]["pending_balance"], 60);

    let (status, err) = h.post(&shop, &redeem, json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["error"]["kind"], "already_redeemed");

    let (_, page) = h
        .get(&user, &format!("/api/v1/users/{}/transactions", user.id))
        .await;
    assert_eq!(page["pagination"]["total"], 2);
}

#[tokio::test]
async fn overdraft_is_unprocessable() {
    let h = Harness::start().await;
    let admin = Caller::new("admin");
    let user = Caller::new("user");
    h.register(&user, json!({})).await;
    h.post(
        &admin,
        &format!("/api/v1/users/{}/adjustments", user.id),
        json!({ "amount": 30, "reason": "seed" }),
    )
    .await;

    let (status, err) = h
        .post(
            &admin,
            &format!("/api/v1/users/{}/adjustments", user.id),
            json!({ "amount": -50, "reason": "chargeback" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["error"]["kind"], "insufficient_balance");

    let (_, ledger) = h
        .get(&user, &format!("/api/v1/users/{}/ledger", user.id))
        .await;
    assert_eq!(ledger["usable_balance"], 30);
}

#[tokio::test]
async fn quest_approval_rewards_once() {
    let h = Harness::start().await;
    let admin = Caller::new("admin");
    let user = Caller::new("user");
    h.register(&user, json!({})).await;

    let (status, quest) = h
        .post(&admin, "/api/v1/quests", json!({ "title": "Beach cleanup", "reward": 20 }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let quest_id = quest["id"].as_str().expect("quest id").to_string();

    h.post(&user, &format!("/api/v1/quests/{quest_id}/accept"), json!({}))
        .await;
    let (status, _) = h
        .post(
            &user,
            &format!("/api/v1/quests/{quest_id}/submit"),
            json!({ "report_text": "collected 3 bags" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let approve = format!("/api/v1/quests/{quest_id}/participants/{}/approve", user.id);
    let (status, approval) = h.post(&admin, &approve, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approval["participation"]["status"], "completed");
    assert_eq!(approval["ledger"]["usable_balance"], 20);

    let (status, err) = h.post(&admin, &approve, json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["error"]["kind"], "not_awaiting_approval");
}

#[tokio::test]
async fn webhook_is_idempotent() {
    let h = Harness::start().await;
    let referrer = Caller::new("user");
    let referred = Caller::new("user");
    h.register(&referrer, json!({})).await;
    h.register(
        &referred,
        json!({ "referrer_id": referrer.id, "customer_id": "cus_e2e" }),
    )
    .await;

    let event = json!({
        "event_id": "evt_e2e",
        "customer_id": "cus_e2e",
        "amount": 1000,
        "billing_reason": "subscription_cycle",
        "occurred_at": "2024-06-01T00:00:00Z",
    });
    let (status, first) = h.post(&referred, "/api/v1/webhooks/payments", event.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["outcome"], "rewarded");
    assert_eq!(first["detail"]["reward_amount"], 300);

    let (_, second) = h.post(&referred, "/api/v1/webhooks/payments", event).await;
    assert_eq!(second["outcome"], "duplicate");
    assert_eq!(second["detail"], first["detail"]);

    let (_, rewards) = h
        .get(
            &referrer,
            &format!("/api/v1/users/{}/referral-rewards", referrer.id),
        )
        .await;
    assert_eq!(rewards.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn users_cannot_read_each_other() {
    let h = Harness::start().await;
    let alice = Caller::new("user");
    let bob = Caller::new("user");
    h.register(&alice, json!({})).await;

    let (status, _) = h
        .get(&bob, &format!("/api/v1/users/{}/ledger", alice.id))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
