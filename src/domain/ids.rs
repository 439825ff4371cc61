//! Type-safe identifiers.
//!
//! Every entity key is a newtype so that, for example, a [`QuestId`] can
//! never be passed where a [`UserId`] is expected. Internally generated
//! keys wrap a [`uuid::Uuid`] (v4); keys minted by the payment provider
//! ([`PaymentEventId`], [`CustomerId`]) wrap the provider's opaque string.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Creates a new random identifier (UUID v4).
            #[must_use]
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Creates an identifier from an existing [`uuid::Uuid`].
            #[must_use]
            pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner [`uuid::Uuid`].
            #[must_use]
            pub const fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for uuid::Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a provider-issued identifier.
            #[must_use]
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a user account (and of its ledger record).
    ///
    /// Partners and admins are users with extra capabilities, so they are
    /// addressed by the same identifier type.
    UserId
);

uuid_id!(
    /// Identifier of a quest definition.
    QuestId
);

uuid_id!(
    /// Identifier of a user-submitted review.
    ReviewId
);

uuid_id!(
    /// Identifier of a partner deal (store offer).
    DealId
);

uuid_id!(
    /// Identifier of a transaction log entry.
    TransactionId
);

string_id!(
    /// Payment-provider event id. Used as the idempotency key for referral
    /// rewards.
    PaymentEventId
);

string_id!(
    /// Payment-provider customer id linked to a user profile.
    CustomerId
);

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn new_generates_unique_ids() {
        assert_ne!(UserId::new(), UserId::new());
        assert_ne!(DealId::new(), DealId::new());
    }

    #[test]
    fn display_is_uuid_format() {
        let s = QuestId::new().to_string();
        assert_eq!(s.len(), 36);
        assert!(s.contains('-'));
    }

    #[test]
    fn uuid_ids_serialize_transparently() {
        let uuid = uuid::Uuid::new_v4();
        let id = UserId::from_uuid(uuid);
        let Ok(json) = serde_json::to_string(&id) else {
            panic!("serialization failed");
        };
        assert_eq!(json, format!("\"{uuid}\""));
    }

    #[test]
    fn string_ids_keep_provider_value() {
        let id = PaymentEventId::new("evt_1N2x");
        assert_eq!(id.as_str(), "evt_1N2x");
        assert_eq!(id.to_string(), "evt_1N2x");
        let Ok(json) = serde_json::to_string(&id) else {
            panic!("serialization failed");
        };
        assert_eq!(json, "\"evt_1N2x\"");
    }

    #[test]
    fn hash_works_in_hashmap() {
        use std::collections::HashMap;
        let id = ReviewId::new();
        let mut map = HashMap::new();
        map.insert(id, "review");
        assert_eq!(map.get(&id), Some(&"review"));
    }
}
