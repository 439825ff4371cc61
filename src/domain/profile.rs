//! User profile: identity links needed by the referral calculator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{CustomerId, UserId};
use crate::persistence::{DocKey, Document};

/// Profile created at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    /// Owner.
    pub user_id: UserId,
    /// Contact email.
    pub email: String,
    /// User who referred this one.
    pub referrer_id: Option<UserId>,
    /// Payment-provider customer id, once the user subscribes.
    pub customer_id: Option<CustomerId>,
    /// Referral commission rate earned by this user as a referrer, in
    /// basis points. Decided on the first qualifying payment and never
    /// changed afterwards.
    pub reward_rate_bps: Option<u32>,
    /// Registration timestamp.
    pub created_at: DateTime<Utc>,
}

impl Document for UserProfile {
    const COLLECTION: &'static str = "profiles";
}

impl UserProfile {
    /// Storage key of the profile of `user_id`.
    #[must_use]
    pub fn key(user_id: UserId) -> DocKey {
        DocKey::of::<Self>(user_id)
    }
}

/// Index document mapping a payment-provider customer to its user.
///
/// Written in the same commit as the profile's `customer_id`, so a
/// customer id can never be linked to two users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CustomerLink {
    /// Provider customer id (record key).
    pub customer_id: CustomerId,
    /// Linked user.
    pub user_id: UserId,
    /// Link timestamp.
    pub linked_at: DateTime<Utc>,
}

impl Document for CustomerLink {
    const COLLECTION: &'static str = "customer_links";
}

impl CustomerLink {
    /// Storage key of the link for `customer_id`.
    #[must_use]
    pub fn key(customer_id: &CustomerId) -> DocKey {
        DocKey::of::<Self>(customer_id)
    }
}
