//! # points-ledger
//!
//! Points ledger and reward-transaction engine.
//!
//! Users earn points by completing quests and writing reviews, spend them
//! on partner deals, and referrers earn commission on their referrals'
//! subscription payments. Every balance change is posted through one
//! atomic-update primitive that writes the new balances and their
//! transaction log entry together, with optimistic concurrency control
//! and bounded retries.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP), payment webhook
//!     │
//!     ├── REST Handlers (api/)
//!     │
//!     ├── LedgerService (service/)
//!     ├── Entities & state machines (domain/)
//!     │
//!     ├── Optimistic transactions (persistence/transaction)
//!     └── DocumentStore: in-memory or PostgreSQL
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
