//! Stripe webhook payloads and their mapping to ledger events.
//!
//! Only call these on payloads whose signature has already been verified.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use marketplace_types::{
    Currency, GatewayError, ListingId, Money, PaymentEvent, Provider, RefundEvent, UserId,
};

pub const PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const CHARGE_REFUNDED: &str = "charge.refunded";

pub const METADATA_LISTING_ID: &str = "listing_id";
pub const METADATA_BUYER_ID: &str = "buyer_id";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub application_fee_amount: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeObject {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub amount_refunded: i64,
    pub currency: String,
    #[serde(default)]
    pub refunded: bool,
    #[serde(default)]
    pub payment_intent: Option<String>,
}

fn parse_event(payload: &[u8], expected_type: &str) -> Result<StripeEvent, GatewayError> {
    let event: StripeEvent = serde_json::from_slice(payload)
        .map_err(|e| GatewayError::MalformedPayload(e.to_string()))?;
    if event.event_type != expected_type {
        return Err(GatewayError::UnsupportedEventType(event.event_type));
    }
    Ok(event)
}

fn parse_object<T: serde::de::DeserializeOwned>(event: StripeEvent) -> Result<T, GatewayError> {
    serde_json::from_value(event.data.object)
        .map_err(|e| GatewayError::MalformedPayload(e.to_string()))
}

fn money(amount: i64, currency: &str) -> Result<Money, GatewayError> {
    let currency: Currency = currency
        .parse()
        .map_err(|_| GatewayError::MalformedPayload(format!("unsupported currency {}", currency)))?;
    Money::new(amount, currency).map_err(|e| GatewayError::MalformedPayload(e.to_string()))
}

fn metadata_id<T: std::str::FromStr>(
    metadata: &HashMap<String, String>,
    key: &str,
) -> Result<T, GatewayError> {
    metadata
        .get(key)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| GatewayError::MissingMetadata(key.to_string()))?
        .parse()
        .map_err(|_| GatewayError::MissingMetadata(format!("{} is not a valid id", key)))
}

/// Decodes a `payment_intent.succeeded` event.
pub fn decode_payment_event(payload: &[u8]) -> Result<PaymentEvent, GatewayError> {
    let intent: PaymentIntentObject = parse_object(parse_event(payload, PAYMENT_SUCCEEDED)?)?;

    let listing_id: ListingId = metadata_id(&intent.metadata, METADATA_LISTING_ID)?;
    let buyer_id: UserId = metadata_id(&intent.metadata, METADATA_BUYER_ID)?;

    let fee = intent.application_fee_amount.ok_or_else(|| {
        GatewayError::MalformedPayload("payment intent has no application fee".into())
    })?;

    Ok(PaymentEvent {
        provider: Provider::Stripe,
        external_payment_id: intent.id,
        listing_id,
        buyer_id,
        amount: money(intent.amount, &intent.currency)?,
        fee: money(fee, &intent.currency)?,
    })
}

/// Decodes a `charge.refunded` event, correlated through its payment intent.
pub fn decode_refund_event(payload: &[u8]) -> Result<RefundEvent, GatewayError> {
    let charge: ChargeObject = parse_object(parse_event(payload, CHARGE_REFUNDED)?)?;

    let external_payment_id = charge
        .payment_intent
        .filter(|id| !id.is_empty())
        .ok_or_else(|| GatewayError::MissingMetadata("payment_intent".into()))?;

    Ok(RefundEvent {
        provider: Provider::Stripe,
        external_payment_id,
        external_refund_id: charge.id,
        amount: money(charge.amount_refunded, &charge.currency)?,
    })
}
