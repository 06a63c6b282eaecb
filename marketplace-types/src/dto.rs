//! Data Transfer Objects (DTOs) for requests and responses.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{
    CategoryId, Currency, Listing, ListingId, NewListing, Provider, SellerAccount, UserId,
};
use crate::error::DomainError;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

// ─────────────────────────────────────────────────────────────────────────────
// Category DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to create a listing category.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateCategoryRequest {
    #[schema(example = "Cameras")]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Listing DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to create a listing.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateListingRequest {
    pub category_id: CategoryId,
    #[schema(example = "Vintage film camera")]
    pub title: String,
    pub description: String,
    /// Asking price in smallest currency unit
    #[schema(example = 10000)]
    pub price_in_cents: i64,
    #[serde(default = "default_currency")]
    pub currency: Currency,
}

fn default_currency() -> Currency {
    Currency::USD
}

impl From<CreateListingRequest> for NewListing {
    fn from(req: CreateListingRequest) -> Self {
        NewListing {
            category_id: req.category_id,
            title: req.title,
            description: req.description,
            price_in_cents: req.price_in_cents,
            currency: req.currency,
        }
    }
}

/// Query string for browsing open listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListingsQuery {
    /// Page size, 1..=100 (default 20)
    pub limit: Option<i64>,
    /// Zero-based page number
    pub page: Option<i64>,
    /// Category title to filter by
    pub category: Option<String>,
}

/// Normalized listing filter handed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingFilter {
    pub limit: i64,
    pub offset: i64,
    pub category: Option<String>,
}

impl ListingsQuery {
    pub fn into_filter(self) -> Result<ListingFilter, DomainError> {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(DomainError::ValidationError(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        let page = self.page.unwrap_or(0);
        if page < 0 {
            return Err(DomainError::ValidationError(
                "page cannot be negative".into(),
            ));
        }
        let offset = page
            .checked_mul(limit)
            .ok_or_else(|| DomainError::ValidationError("page is too large".into()))?;

        Ok(ListingFilter {
            limit,
            offset,
            category: self.category.filter(|c| !c.trim().is_empty()),
        })
    }
}

/// A page of open listings.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListingsPage {
    pub items: Vec<Listing>,
    pub page: i64,
    pub limit: i64,
}

// ─────────────────────────────────────────────────────────────────────────────
// User mirror DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Profile fields copied from the auth subsystem into the local user mirror.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserProfileRequest {
    #[schema(example = "jane@example.com")]
    pub email: String,
    #[schema(example = "jane")]
    pub username: String,
}

impl UserProfileRequest {
    pub fn validate(&self) -> Result<(), DomainError> {
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(DomainError::ValidationError("A valid email is required".into()));
        }
        if self.username.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "Username cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SellerAccountResponse {
    pub user_id: UserId,
    pub email: String,
    pub username: String,
    pub seller_id: Option<String>,
    pub provider: Option<Provider>,
}

impl From<SellerAccount> for SellerAccountResponse {
    fn from(account: SellerAccount) -> Self {
        Self {
            user_id: account.user_id,
            email: account.email,
            username: account.username,
            seller_id: account.seller_id.map(|id| id.as_str().to_string()),
            provider: account.provider,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Payment DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to link (or re-open onboarding for) the caller's seller account.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LinkSellerRequest {
    #[schema(example = "https://market.example.com/onboarding/refresh")]
    pub refresh_url: String,
    #[schema(example = "https://market.example.com/onboarding/done")]
    pub return_url: String,
    /// External seller id returned by an earlier attempt whose claim failed;
    /// must match the caller's own reservation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_seller_id: Option<String>,
}

/// Onboarding link for the seller.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SellerLinkResponse {
    pub url: String,
    #[schema(example = "acct_1Nv0FGQ9RKHgCVdK")]
    pub seller_id: String,
}

/// Request to open a checkout for a listing.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutSessionRequest {
    #[schema(example = "https://market.example.com/checkout/success")]
    pub success_url: String,
    #[schema(example = "https://market.example.com/checkout/cancel")]
    pub cancel_url: String,
}

/// Hosted checkout link with the price split.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutSessionResponse {
    pub url: String,
    pub listing_id: ListingId,
    /// Charged to the buyer
    #[schema(example = 10000)]
    pub amount: i64,
    /// Kept by the marketplace
    #[schema(example = 500)]
    pub fee: i64,
    /// Routed to the seller
    #[schema(example = 9500)]
    pub seller_amount: i64,
    pub currency: Currency,
}

/// How a webhook delivery was absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    Recorded,
    AlreadyRecorded,
}

/// Acknowledgement returned to the payment provider.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    pub status: WebhookStatus,
}
