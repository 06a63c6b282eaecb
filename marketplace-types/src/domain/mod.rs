//! Domain models for the marketplace.

pub mod fee;
pub mod ids;
pub mod listing;
pub mod money;
pub mod payment;
pub mod principal;
pub mod seller;

pub use fee::{FeePolicy, DEFAULT_FEE_PERCENT, DEFAULT_MINIMUM_FEE};
pub use ids::{CategoryId, ListingId, PaymentId, RefundId, UserId};
pub use listing::{
    Category, CheckoutListing, Listing, ListingStatus, NewCategory, NewListing, SellerSummary,
};
pub use money::{Currency, Money};
pub use payment::{Payment, PaymentEvent, Refund, RefundEvent};
pub use principal::{Principal, UserRole};
pub use seller::{ExternalSellerId, Provider, SellerAccount};
