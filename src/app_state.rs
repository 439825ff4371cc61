//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::persistence::Backend;
use crate::service::LedgerService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Ledger service for all business logic.
    pub ledger: Arc<LedgerService<Backend>>,
}

impl AppState {
    /// Wraps a service for sharing across handlers.
    #[must_use]
    pub fn new(ledger: LedgerService<Backend>) -> Self {
        Self {
            ledger: Arc::new(ledger),
        }
    }
}
