//! REST endpoint handlers organized by resource.

pub mod deals;
pub mod quests;
pub mod referrals;
pub mod reviews;
pub mod system;
pub mod users;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(users::routes())
        .merge(quests::routes())
        .merge(reviews::routes())
        .merge(deals::routes())
        .merge(referrals::routes())
}
