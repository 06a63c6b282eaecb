//! Listing domain model and its lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::fee::FeePolicy;
use super::ids::{CategoryId, ListingId, UserId};
use super::money::{Currency, Money};
use super::seller::ExternalSellerId;
use crate::error::DomainError;

const TITLE_MIN_CHARS: usize = 8;
const TITLE_MAX_CHARS: usize = 100;
const CATEGORY_TITLE_MAX_CHARS: usize = 30;

/// Lifecycle state of a listing. The single source of truth for purchasability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Open,
    Canceled,
    Sold,
    Refunded,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Open => "open",
            ListingStatus::Canceled => "canceled",
            ListingStatus::Sold => "sold",
            ListingStatus::Refunded => "refunded",
        }
    }

    /// Applies a transition, accepting only `open -> sold` and `sold -> refunded`.
    pub fn transition_to(self, next: ListingStatus) -> Result<ListingStatus, DomainError> {
        match (self, next) {
            (ListingStatus::Open, ListingStatus::Sold)
            | (ListingStatus::Sold, ListingStatus::Refunded) => Ok(next),
            (from, to) => Err(DomainError::IllegalTransition { from, to }),
        }
    }
}

impl std::fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ListingStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(ListingStatus::Open),
            "canceled" => Ok(ListingStatus::Canceled),
            "sold" => Ok(ListingStatus::Sold),
            "refunded" => Ok(ListingStatus::Refunded),
            _ => Err(DomainError::ValidationError(format!(
                "Unknown listing status: {}",
                s
            ))),
        }
    }
}

/// A sellable item.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Listing {
    pub id: ListingId,
    /// Owning (selling) user
    pub user_id: UserId,
    pub category_id: CategoryId,
    pub title: String,
    pub description: String,
    /// Asking price in minor units
    pub price: Money,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker; deleted listings are invisible to readers
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Validated input for a new listing.
#[derive(Debug, Clone)]
pub struct NewListing {
    pub category_id: CategoryId,
    pub title: String,
    pub description: String,
    pub price_in_cents: i64,
    pub currency: Currency,
}

impl Listing {
    /// Creates a new open listing owned by `owner`.
    ///
    /// # Validation
    /// - Title must be 8..=100 characters
    /// - Description cannot be empty
    /// - Price must leave something for the seller after the marketplace fee
    pub fn new(owner: UserId, new: NewListing, fees: &FeePolicy) -> Result<Self, DomainError> {
        let title = new.title.trim().to_string();
        let title_len = title.chars().count();
        if !(TITLE_MIN_CHARS..=TITLE_MAX_CHARS).contains(&title_len) {
            return Err(DomainError::ValidationError(format!(
                "Title must be between {} and {} characters",
                TITLE_MIN_CHARS, TITLE_MAX_CHARS
            )));
        }

        if new.description.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "Description cannot be empty".into(),
            ));
        }

        let price = Money::new(new.price_in_cents, new.currency)?;
        fees.calculate(price)?;

        let now = Utc::now();
        Ok(Self {
            id: ListingId::new(),
            user_id: owner,
            category_id: new.category_id,
            title,
            description: new.description,
            price,
            status: ListingStatus::Open,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Returns true if a checkout may be opened for this listing.
    pub fn is_purchasable(&self) -> bool {
        self.status == ListingStatus::Open && self.deleted_at.is_none()
    }
}

/// Seller details needed to route funds and to word the checkout.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SellerSummary {
    pub user_id: UserId,
    pub username: String,
    /// External payable identity; `None` until onboarding completes
    #[schema(value_type = Option<String>)]
    pub seller_id: Option<ExternalSellerId>,
}

/// Snapshot of an open listing joined with its seller, read for checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutListing {
    pub listing: Listing,
    pub seller: SellerSummary,
}

/// A listing category.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Category {
    pub id: CategoryId,
    pub title: String,
    pub description: String,
}

/// Validated input for a new category.
#[derive(Debug, Clone)]
pub struct NewCategory {
    pub title: String,
    pub description: String,
}

impl NewCategory {
    pub fn new(title: String, description: String) -> Result<Self, DomainError> {
        let title = title.trim().to_string();
        if title.is_empty() || title.chars().count() > CATEGORY_TITLE_MAX_CHARS {
            return Err(DomainError::ValidationError(format!(
                "Category title must be between 1 and {} characters",
                CATEGORY_TITLE_MAX_CHARS
            )));
        }
        Ok(Self { title, description })
    }
}
