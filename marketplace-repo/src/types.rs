//! Shared database row types and error mapping for SQLite and PostgreSQL.
//!
//! Ids are `Uuid` and timestamps `DateTime<Utc>` in both backends; sqlx
//! stores them natively in PostgreSQL and as BLOB/TEXT in SQLite.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use marketplace_types::{
    Category, CategoryId, CheckoutListing, Currency, DomainError, ExternalSellerId, Listing,
    ListingId, ListingStatus, Money, Payment, PaymentId, Provider, Refund, RefundId, RepoError,
    SellerAccount, SellerSummary, UserId,
};

// ─────────────────────────────────────────────────────────────────────────────
// Error mapping
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn db_err(e: sqlx::Error) -> RepoError {
    RepoError::Database(e.to_string())
}

pub(crate) fn tx_err(e: sqlx::Error) -> RepoError {
    RepoError::Transaction(e.to_string())
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

pub(crate) fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

fn money(amount: i64, currency: &str) -> Result<Money, RepoError> {
    let currency: Currency = currency.parse().map_err(RepoError::Domain)?;
    Money::new(amount, currency).map_err(RepoError::Domain)
}

fn corrupt(what: &str, value: &str) -> RepoError {
    RepoError::Database(format!("invalid {} in database: {}", what, value))
}

// ─────────────────────────────────────────────────────────────────────────────
// Database row structs (derive FromRow for automatic mapping)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(FromRow)]
pub struct DbCategory {
    pub id: Uuid,
    pub title: String,
    pub description: String,
}

impl DbCategory {
    pub fn into_domain(self) -> Category {
        Category {
            id: CategoryId::from_uuid(self.id),
            title: self.title,
            description: self.description,
        }
    }
}

/// Listing row from database.
#[derive(FromRow)]
pub struct DbListing {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category_id: Uuid,
    pub title: String,
    pub description: String,
    pub price_in_cents: i64,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl DbListing {
    pub fn into_domain(self) -> Result<Listing, RepoError> {
        let status: ListingStatus = self
            .status
            .parse()
            .map_err(|_| corrupt("listing status", &self.status))?;

        Ok(Listing {
            id: ListingId::from_uuid(self.id),
            user_id: UserId::from_uuid(self.user_id),
            category_id: CategoryId::from_uuid(self.category_id),
            title: self.title,
            description: self.description,
            price: money(self.price_in_cents, &self.currency)?,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        })
    }
}

/// Listing joined with its seller's username and external seller id.
#[derive(FromRow)]
pub struct DbCheckoutListing {
    #[sqlx(flatten)]
    pub listing: DbListing,
    pub seller_username: String,
    pub seller_id: Option<String>,
}

impl DbCheckoutListing {
    /// Converts the row, refusing anything that is not open.
    pub fn into_open_listing(self) -> Result<CheckoutListing, RepoError> {
        let listing = self.listing.into_domain()?;
        if !listing.is_purchasable() {
            return Err(DomainError::ListingNotOpen {
                status: listing.status,
            }
            .into());
        }

        let seller_id = self
            .seller_id
            .map(ExternalSellerId::new)
            .transpose()
            .map_err(RepoError::Domain)?;

        Ok(CheckoutListing {
            seller: SellerSummary {
                user_id: listing.user_id,
                username: self.seller_username,
                seller_id,
            },
            listing,
        })
    }
}

/// User row left-joined with its seller account.
#[derive(FromRow)]
pub struct DbSellerAccount {
    pub user_id: Uuid,
    pub email: String,
    pub username: String,
    pub seller_id: Option<String>,
    pub provider: Option<String>,
    pub pending_seller_id: Option<String>,
}

impl DbSellerAccount {
    pub fn into_domain(self) -> Result<SellerAccount, RepoError> {
        let seller_id = self
            .seller_id
            .map(ExternalSellerId::new)
            .transpose()
            .map_err(RepoError::Domain)?;
        let provider = self
            .provider
            .map(|p| p.parse::<Provider>())
            .transpose()
            .map_err(RepoError::Domain)?;
        let pending_seller_id = self
            .pending_seller_id
            .map(ExternalSellerId::new)
            .transpose()
            .map_err(RepoError::Domain)?;

        Ok(SellerAccount {
            user_id: UserId::from_uuid(self.user_id),
            email: self.email,
            username: self.username,
            seller_id,
            provider,
            pending_seller_id,
        })
    }
}

/// Payment row from database.
#[derive(FromRow)]
pub struct DbPayment {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub buyer_id: Uuid,
    pub provider: String,
    pub external_payment_id: String,
    pub amount_in_cents: i64,
    pub fee_amount_in_cents: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl DbPayment {
    pub fn into_domain(self) -> Result<Payment, RepoError> {
        let provider: Provider = self
            .provider
            .parse()
            .map_err(|_| corrupt("provider", &self.provider))?;

        Ok(Payment::from_parts(
            PaymentId::from_uuid(self.id),
            ListingId::from_uuid(self.listing_id),
            UserId::from_uuid(self.buyer_id),
            provider,
            self.external_payment_id,
            money(self.amount_in_cents, &self.currency)?,
            money(self.fee_amount_in_cents, &self.currency)?,
            self.created_at,
        ))
    }
}

/// Refund row from database.
#[derive(FromRow)]
pub struct DbRefund {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub listing_id: Uuid,
    pub external_refund_id: String,
    pub amount_in_cents: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl DbRefund {
    pub fn into_domain(self) -> Result<Refund, RepoError> {
        Ok(Refund {
            id: RefundId::from_uuid(self.id),
            payment_id: PaymentId::from_uuid(self.payment_id),
            listing_id: ListingId::from_uuid(self.listing_id),
            external_refund_id: self.external_refund_id,
            amount: money(self.amount_in_cents, &self.currency)?,
            created_at: self.created_at,
        })
    }
}

/// Parses a status read inside a settlement.
pub(crate) fn parse_status(status: &str) -> Result<ListingStatus, RepoError> {
    status
        .parse()
        .map_err(|_| corrupt("listing status", status))
}
