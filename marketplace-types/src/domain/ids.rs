//! Opaque identifiers for marketplace entities.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Returns the UUID value.
            pub fn into_uuid(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(
    /// Identifier of a user principal, issued by the auth subsystem.
    UserId
);
uuid_id!(
    /// Identifier of a listing.
    ListingId
);
uuid_id!(
    /// Identifier of a listing category.
    CategoryId
);
uuid_id!(
    /// Identifier of a ledger payment row.
    PaymentId
);
uuid_id!(
    /// Identifier of a ledger refund row.
    RefundId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_round_trips_through_display() {
        let id = ListingId::new();
        let parsed: ListingId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<UserId>().is_err());
    }
}
