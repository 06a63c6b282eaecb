//! Payment provider gateway port.

use serde::{Deserialize, Serialize};

use crate::domain::{
    ExternalSellerId, ListingId, Money, PaymentEvent, Provider, RefundEvent, UserId,
};
use crate::error::GatewayError;

/// Where the provider sends the seller after onboarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingUrls {
    pub refresh_url: String,
    pub return_url: String,
}

/// A freshly registered external seller identity plus its onboarding link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkingSession {
    pub seller_id: ExternalSellerId,
    pub url: String,
}

/// Everything the provider needs to charge a buyer for one listing.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub listing_id: ListingId,
    pub buyer_id: UserId,
    pub title: String,
    pub seller_username: String,
    /// Destination for `price - fee`
    pub seller_id: Option<ExternalSellerId>,
    pub price: Money,
    pub fee: Money,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutRequest {
    /// Line item name shown to the buyer.
    pub fn item_name(&self) -> String {
        format!("Buying {} from @{}", self.title, self.seller_username)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub url: String,
}

/// Port over an external payment processor.
///
/// Implementations hold their own credentials; there is no ambient
/// provider configuration. Webhook verification is synchronous and must
/// check the signature before any field of the payload is read.
#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    fn provider(&self) -> Provider;

    /// Name of the request header carrying the webhook signature.
    fn signature_header(&self) -> &'static str;

    /// Registers a new external seller identity for `email`.
    async fn create_linking_session(
        &self,
        email: &str,
        urls: &OnboardingUrls,
    ) -> Result<LinkingSession, GatewayError>;

    /// Re-opens onboarding for an existing external seller identity.
    async fn create_update_session(
        &self,
        seller_id: &ExternalSellerId,
        urls: &OnboardingUrls,
    ) -> Result<String, GatewayError>;

    /// Fails with `Rejected` if `request.seller_id` is `None`.
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    fn verify_success_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<PaymentEvent, GatewayError>;

    fn verify_refund_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<RefundEvent, GatewayError>;
}
