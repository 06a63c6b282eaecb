//! Payment ledger model.
//!
//! Payments and refunds are facts: created once, never mutated. A refund
//! references the payment it compensates instead of editing it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ids::{ListingId, PaymentId, RefundId, UserId};
use super::money::Money;
use super::seller::Provider;
use crate::error::DomainError;

/// A verified "payment completed" notification from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub provider: Provider,
    pub external_payment_id: String,
    /// Correlated through checkout metadata
    pub listing_id: ListingId,
    /// Correlated through checkout metadata
    pub buyer_id: UserId,
    /// Total charged to the buyer
    pub amount: Money,
    /// Marketplace share of `amount`
    pub fee: Money,
}

/// A verified "payment refunded" notification from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundEvent {
    pub provider: Provider,
    pub external_payment_id: String,
    pub external_refund_id: String,
    pub amount: Money,
}

/// A completed sale in the ledger. At most one exists per listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Payment {
    pub id: PaymentId,
    pub listing_id: ListingId,
    pub buyer_id: UserId,
    pub provider: Provider,
    pub external_payment_id: String,
    pub amount: Money,
    pub fee: Money,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Builds the ledger row for a verified payment event.
    ///
    /// # Validation
    /// - Amount must be positive
    /// - Fee must share the amount's currency and not exceed it
    pub fn record(event: PaymentEvent) -> Result<Self, DomainError> {
        if event.external_payment_id.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "External payment id cannot be empty".into(),
            ));
        }
        if event.amount.amount() <= 0 {
            return Err(DomainError::InvalidPrice(event.amount.amount()));
        }
        // fee must be a part of the total
        event.amount.checked_sub(event.fee)?;

        Ok(Self {
            id: PaymentId::new(),
            listing_id: event.listing_id,
            buyer_id: event.buyer_id,
            provider: event.provider,
            external_payment_id: event.external_payment_id,
            amount: event.amount,
            fee: event.fee,
            created_at: Utc::now(),
        })
    }

    /// Reconstructs a payment from database fields.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: PaymentId,
        listing_id: ListingId,
        buyer_id: UserId,
        provider: Provider,
        external_payment_id: String,
        amount: Money,
        fee: Money,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            listing_id,
            buyer_id,
            provider,
            external_payment_id,
            amount,
            fee,
            created_at,
        }
    }

    /// Amount routed to the seller.
    pub fn seller_amount(&self) -> Money {
        self.amount.checked_sub(self.fee).unwrap_or(self.amount)
    }
}

/// Compensating ledger entry for a fully refunded payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Refund {
    pub id: RefundId,
    pub payment_id: PaymentId,
    pub listing_id: ListingId,
    pub external_refund_id: String,
    pub amount: Money,
    pub created_at: DateTime<Utc>,
}

impl Refund {
    /// Builds the refund row for `payment`. Only full refunds are accepted.
    pub fn for_payment(payment: &Payment, event: RefundEvent) -> Result<Self, DomainError> {
        if event.amount.currency() != payment.amount.currency() {
            return Err(DomainError::CurrencyMismatch {
                expected: payment.amount.currency(),
                got: event.amount.currency(),
            });
        }
        if event.amount.amount() != payment.amount.amount() {
            return Err(DomainError::ValidationError(format!(
                "Partial refunds are not supported: refunded {} of {}",
                event.amount, payment.amount
            )));
        }

        Ok(Self {
            id: RefundId::new(),
            payment_id: payment.id,
            listing_id: payment.listing_id,
            external_refund_id: event.external_refund_id,
            amount: event.amount,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Currency;

    fn event(amount: i64, fee: i64) -> PaymentEvent {
        PaymentEvent {
            provider: Provider::Stripe,
            external_payment_id: "pi_123".into(),
            listing_id: ListingId::new(),
            buyer_id: UserId::new(),
            amount: Money::new(amount, Currency::USD).unwrap(),
            fee: Money::new(fee, Currency::USD).unwrap(),
        }
    }

    #[test]
    fn test_record_payment() {
        let payment = Payment::record(event(10_000, 500)).unwrap();
        assert_eq!(payment.external_payment_id, "pi_123");
        assert_eq!(payment.seller_amount().amount(), 9500);
    }

    #[test]
    fn test_fee_larger_than_amount_fails() {
        let result = Payment::record(event(100, 500));
        assert!(matches!(result, Err(DomainError::NegativeAmount)));
    }

    #[test]
    fn test_fee_in_other_currency_fails() {
        let mut ev = event(10_000, 500);
        ev.fee = Money::new(500, Currency::EUR).unwrap();
        assert!(matches!(
            Payment::record(ev),
            Err(DomainError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn test_full_refund_only() {
        let payment = Payment::record(event(10_000, 500)).unwrap();
        let refund_event = |amount| RefundEvent {
            provider: Provider::Stripe,
            external_payment_id: "pi_123".into(),
            external_refund_id: "ch_123".into(),
            amount: Money::new(amount, Currency::USD).unwrap(),
        };

        let refund = Refund::for_payment(&payment, refund_event(10_000)).unwrap();
        assert_eq!(refund.payment_id, payment.id);
        assert_eq!(refund.listing_id, payment.listing_id);

        let partial = Refund::for_payment(&payment, refund_event(5_000));
        assert!(matches!(partial, Err(DomainError::ValidationError(_))));
    }
}
