//! # Marketplace Types
//!
//! Domain types and port traits for the marketplace transaction engine.
//! This crate has ZERO external IO dependencies - only data structures,
//! business rules, and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the hexagonal architecture:
//! - `domain/` - Pure domain types (Money, Listing, SellerAccount, Payment, fees)
//! - `ports/` - Trait definitions that adapters must implement
//! - `dto/` - Data Transfer Objects for API boundaries
//! - `error/` - Domain, repository, gateway and application error types

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use domain::{
    Category, CategoryId, CheckoutListing, Currency, ExternalSellerId, FeePolicy, Listing,
    ListingId, ListingStatus, Money, NewCategory, NewListing, Payment, PaymentEvent, PaymentId,
    Principal, Provider, Refund, RefundEvent, RefundId, SellerAccount, SellerSummary, UserId,
    UserRole,
};
pub use dto::*;
pub use error::{AppError, DomainError, ErrorKind, GatewayError, RepoError};
pub use ports::{
    CheckoutRequest, CheckoutSession, LinkingSession, ListingStore, MarketplaceRepository,
    OnboardingUrls, PaymentGateway, PaymentLedger, SellerDirectory, Settlement,
};
