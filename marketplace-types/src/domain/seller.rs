//! Seller account directory model.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ids::UserId;
use crate::error::DomainError;

/// External payment processors the marketplace can settle through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Stripe,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Stripe => "stripe",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stripe" => Ok(Provider::Stripe),
            _ => Err(DomainError::ValidationError(format!(
                "Unknown payment provider: {}",
                s
            ))),
        }
    }
}

/// Payable identity of a seller at the external provider (e.g. `acct_...`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalSellerId(String);

impl ExternalSellerId {
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "External seller id cannot be empty".into(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExternalSellerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A user as seen by the seller directory.
///
/// `seller_id` is set at most once per user, by the first successful claim.
/// `pending_seller_id` holds an identity the provider created for this user
/// that has not been claimed yet; only its owner can resume it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellerAccount {
    pub user_id: UserId,
    pub email: String,
    pub username: String,
    pub seller_id: Option<ExternalSellerId>,
    pub provider: Option<Provider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_seller_id: Option<ExternalSellerId>,
}

impl SellerAccount {
    pub fn is_linked(&self) -> bool {
        self.seller_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_external_id_fails() {
        assert!(ExternalSellerId::new("  ").is_err());
        assert_eq!(ExternalSellerId::new("acct_123").unwrap().as_str(), "acct_123");
    }

    #[test]
    fn test_provider_round_trip() {
        assert_eq!("stripe".parse::<Provider>().unwrap(), Provider::Stripe);
        assert!("paypal".parse::<Provider>().is_err());
    }
}
