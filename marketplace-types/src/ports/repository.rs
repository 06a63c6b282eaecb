//! Repository port traits.
//!
//! Adapters (Postgres, SQLite, in-memory test doubles) implement these.
//! Every checkout or webhook decision re-reads state through them; nothing
//! here may be cached by callers.

use crate::domain::{
    Category, CheckoutListing, ExternalSellerId, Listing, ListingId, NewCategory, Payment,
    PaymentId, Provider, Refund, SellerAccount, UserId,
};
use crate::dto::ListingFilter;
use crate::error::RepoError;

/// Listing lifecycle store: categories and listing reads/writes.
#[async_trait::async_trait]
pub trait ListingStore: Send + Sync + 'static {
    async fn create_category(&self, category: NewCategory) -> Result<Category, RepoError>;

    async fn list_categories(&self) -> Result<Vec<Category>, RepoError>;

    /// Persists a listing built by `Listing::new`.
    async fn create_listing(&self, listing: &Listing) -> Result<Listing, RepoError>;

    /// Gets a listing by ID. Soft-deleted listings are not returned.
    async fn get_listing(&self, id: ListingId) -> Result<Option<Listing>, RepoError>;

    /// Lists open listings, newest first.
    async fn list_open_listings(&self, filter: &ListingFilter) -> Result<Vec<Listing>, RepoError>;

    /// Reads a listing together with its seller for checkout.
    ///
    /// Fails with `NotFound` when absent and with `DomainError::ListingNotOpen`
    /// when its status is anything but open.
    async fn get_open_listing_for_checkout(
        &self,
        id: ListingId,
    ) -> Result<CheckoutListing, RepoError>;
}

/// Seller account directory.
#[async_trait::async_trait]
pub trait SellerDirectory: Send + Sync + 'static {
    /// Mirrors a principal record from the auth subsystem.
    async fn upsert_user(
        &self,
        user_id: UserId,
        email: &str,
        username: &str,
    ) -> Result<SellerAccount, RepoError>;

    async fn get_seller_account(&self, user_id: UserId) -> Result<SellerAccount, RepoError>;

    /// Records a provider identity created for the user but not yet claimed.
    ///
    /// Fails with `AlreadyClaimed` if the user already holds a pending id or
    /// the external id is reserved by anyone. `NotFound` for unknown users.
    async fn reserve_seller_id(
        &self,
        user_id: UserId,
        seller_id: &ExternalSellerId,
        provider: Provider,
    ) -> Result<(), RepoError>;

    /// Binds `seller_id` to the user and drops their pending reservation in
    /// the same transaction.
    ///
    /// Fails with `AlreadyClaimed` if the user already has a seller id, or if
    /// the external id belongs to another user. Never overwrites.
    async fn claim_seller_id(
        &self,
        user_id: UserId,
        seller_id: &ExternalSellerId,
        provider: Provider,
    ) -> Result<SellerAccount, RepoError>;
}

/// Append-only payment ledger.
#[async_trait::async_trait]
pub trait PaymentLedger: Send + Sync + 'static {
    async fn find_payment_by_listing(
        &self,
        listing_id: ListingId,
    ) -> Result<Option<Payment>, RepoError>;

    async fn find_payment_by_external_id(
        &self,
        provider: Provider,
        external_payment_id: &str,
    ) -> Result<Option<Payment>, RepoError>;

    async fn find_refund_by_payment(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<Refund>, RepoError>;

    /// Opens the atomic unit spanning ledger inserts and listing transitions.
    async fn begin_settlement(&self) -> Result<Box<dyn Settlement>, RepoError>;
}

/// A single database transaction over the ledger and the listing status.
///
/// Nothing is visible to other readers until `commit`. Dropping the unit
/// without committing rolls every write back.
#[async_trait::async_trait]
pub trait Settlement: Send {
    /// Fails with `DuplicatePayment` if the listing already has a payment
    /// or the external payment id is already recorded.
    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), RepoError>;

    /// Fails with `DuplicateRefund` if the payment already has a refund.
    async fn insert_refund(&mut self, refund: &Refund) -> Result<(), RepoError>;

    /// `open -> sold`; any other current status fails with
    /// `DomainError::IllegalTransition` and writes nothing.
    async fn mark_sold(&mut self, listing_id: ListingId) -> Result<(), RepoError>;

    /// `sold -> refunded`, same rules as `mark_sold`.
    async fn mark_refunded(&mut self, listing_id: ListingId) -> Result<(), RepoError>;

    async fn commit(&mut self) -> Result<(), RepoError>;
}

/// Everything the marketplace service needs from storage.
pub trait MarketplaceRepository: ListingStore + SellerDirectory + PaymentLedger {}

impl<T> MarketplaceRepository for T where T: ListingStore + SellerDirectory + PaymentLedger {}
