//! OpenAPI document assembled from the handler annotations.

use utoipa::OpenApi;

use super::handlers::{deals, quests, referrals, reviews, system, users};
use crate::error::{ErrorBody, ErrorResponse};

/// OpenAPI description of every endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "points-ledger",
        description = "Points ledger and reward-transaction engine."
    ),
    paths(
        system::health_handler,
        users::register,
        users::get_profile,
        users::link_customer,
        users::get_ledger,
        users::list_transactions,
        users::adjust_balance,
        quests::create_quest,
        quests::get_quest,
        quests::close_quest,
        quests::accept_quest,
        quests::submit_quest,
        quests::get_participation,
        quests::approve_quest,
        quests::reject_quest,
        reviews::submit_review,
        reviews::get_review,
        reviews::approve_review,
        reviews::reject_review,
        deals::submit_deal,
        deals::get_deal,
        deals::approve_deal,
        deals::reject_deal,
        deals::deactivate_deal,
        deals::purchase_deal,
        deals::get_ticket,
        deals::redeem_ticket,
        deals::list_tickets,
        deals::get_payouts,
        deals::settle_payout,
        referrals::payment_webhook,
        referrals::list_rewards,
        referrals::mark_paid,
    ),
    components(schemas(ErrorResponse, ErrorBody)),
    tags(
        (name = "System", description = "Liveness"),
        (name = "Users", description = "Registration and profiles"),
        (name = "Ledger", description = "Balances, transaction log and admin adjustments"),
        (name = "Quests", description = "Quest lifecycle"),
        (name = "Reviews", description = "Review moderation"),
        (name = "Deals", description = "Deals, purchases and ticket redemption"),
        (name = "Payouts", description = "Partner payout settlement"),
        (name = "Referrals", description = "Payment webhook and referral commissions"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_core_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/api/v1/users/{id}/adjustments",
            "/api/v1/deals/{id}/tickets/{user_id}/redeem",
            "/api/v1/webhooks/payments",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
