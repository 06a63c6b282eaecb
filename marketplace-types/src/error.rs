//! Error types for the marketplace.

use crate::domain::{Currency, ListingId, ListingStatus, PaymentId};

/// Domain-level errors (business logic violations).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Amount cannot be negative")]
    NegativeAmount,

    #[error("Currency mismatch: expected {expected}, got {got}")]
    CurrencyMismatch { expected: Currency, got: Currency },

    #[error("Invalid price: {0}")]
    InvalidPrice(i64),

    #[error("Fee {fee} is not below price {price}")]
    FeeExceedsPrice { fee: i64, price: i64 },

    #[error("Illegal listing transition: {from} -> {to}")]
    IllegalTransition {
        from: ListingStatus,
        to: ListingStatus,
    },

    #[error("Listing is not open (status: {status})")]
    ListingNotOpen { status: ListingStatus },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Entity not found")]
    NotFound,

    /// The ledger already holds a payment for this listing.
    #[error("Payment already recorded for listing {listing_id}")]
    DuplicatePayment { listing_id: ListingId },

    #[error("Refund already recorded for payment {payment_id}")]
    DuplicateRefund { payment_id: PaymentId },

    /// The user, or the external id, is already bound to a seller identity.
    #[error("Seller id already claimed")]
    AlreadyClaimed,

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Payment provider failures.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Network failure, timeout, rate limit or provider outage.
    #[error("Payment provider unavailable: {0}")]
    Unavailable(String),

    #[error("Payment provider rejected the request: {0}")]
    Rejected(String),

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Unsupported event type: {0}")]
    UnsupportedEventType(String),

    #[error("Missing webhook metadata: {0}")]
    MissingMetadata(String),

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),
}

/// Failure classes the HTTP boundary and telemetry reason about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    StateConflict,
    ExternalProvider,
    TrustBoundary,
    NotFound,
    Unauthorized,
    Forbidden,
    Internal,
}

/// Application-level errors (for HTTP responses).
///
/// Maps cleanly to HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Listing is not open (status: {status})")]
    ListingNotOpen { status: ListingStatus },

    #[error("Illegal listing transition: {from} -> {to}")]
    IllegalTransition {
        from: ListingStatus,
        to: ListingStatus,
    },

    #[error("Seller id already claimed")]
    AlreadyClaimed,

    #[error("Payment already recorded for listing {listing_id}")]
    DuplicatePayment { listing_id: ListingId },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Seller has not completed payment onboarding")]
    UserIsNotSeller,

    /// Linking succeeded at the provider but the claim was not stored.
    /// Retrying with `seller_id` as the pending id completes it.
    #[error("Seller linking incomplete for {seller_id}: {reason}")]
    SellerClaimIncomplete { seller_id: String, reason: String },

    #[error("Payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Payment provider rejected the request: {0}")]
    ProviderRejected(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Unsupported event type: {0}")]
    UnsupportedEventType(String),

    #[error("Missing webhook metadata: {0}")]
    MissingMetadata(String),

    #[error("Malformed webhook: {0}")]
    MalformedWebhook(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::BadRequest(_) | AppError::UnsupportedEventType(_) => ErrorKind::Validation,
            AppError::Unauthorized(_) => ErrorKind::Unauthorized,
            AppError::Forbidden(_) => ErrorKind::Forbidden,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::ListingNotOpen { .. }
            | AppError::IllegalTransition { .. }
            | AppError::AlreadyClaimed
            | AppError::DuplicatePayment { .. }
            | AppError::Conflict(_)
            | AppError::UserIsNotSeller => ErrorKind::StateConflict,
            AppError::ProviderUnavailable(_)
            | AppError::ProviderRejected(_)
            | AppError::SellerClaimIncomplete { .. } => ErrorKind::ExternalProvider,
            AppError::InvalidSignature
            | AppError::MissingMetadata(_)
            | AppError::MalformedWebhook(_) => ErrorKind::TrustBoundary,
            AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True when the caller may retry the same request unchanged
    /// (or, for an incomplete claim, with the returned pending id).
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            AppError::ProviderUnavailable(_) | AppError::SellerClaimIncomplete { .. }
        )
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::ValidationError(msg) => AppError::BadRequest(msg),
            DomainError::ListingNotOpen { status } => AppError::ListingNotOpen { status },
            DomainError::IllegalTransition { from, to } => AppError::IllegalTransition { from, to },
            e @ (DomainError::NegativeAmount
            | DomainError::CurrencyMismatch { .. }
            | DomainError::InvalidPrice(_)
            | DomainError::FeeExceedsPrice { .. }) => AppError::BadRequest(e.to_string()),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(e) => e.into(),
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::DuplicatePayment { listing_id } => AppError::DuplicatePayment { listing_id },
            RepoError::DuplicateRefund { payment_id } => {
                AppError::Conflict(format!("Refund already recorded for payment {}", payment_id))
            }
            RepoError::AlreadyClaimed => AppError::AlreadyClaimed,
            RepoError::Conflict(e) => AppError::Conflict(e),
            RepoError::Database(e) => AppError::Internal(e),
            RepoError::Transaction(e) => AppError::Internal(e),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unavailable(e) => AppError::ProviderUnavailable(e),
            GatewayError::Rejected(e) => AppError::ProviderRejected(e),
            GatewayError::InvalidSignature(_) => AppError::InvalidSignature,
            GatewayError::UnsupportedEventType(t) => AppError::UnsupportedEventType(t),
            GatewayError::MissingMetadata(e) => AppError::MissingMetadata(e),
            GatewayError::MalformedPayload(e) => AppError::MalformedWebhook(e),
        }
    }
}
