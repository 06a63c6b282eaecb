//! # Payment Gateway
//!
//! Stripe Connect adapter for the marketplace `PaymentGateway` port.
//!
//! - `client` - REST calls for seller onboarding and hosted checkout
//! - `signature` - the `Stripe-Signature` webhook scheme (HMAC-SHA256 over `t.payload`)
//! - `events` - decoding verified webhook payloads into ledger events
//!
//! The gateway is an ordinary value built from a [`StripeConfig`]; several
//! instances with different credentials can coexist in one process.

mod client;
mod config;
pub mod events;
pub mod signature;

pub use client::StripeGateway;
pub use config::{StripeConfig, DEFAULT_API_BASE, DEFAULT_WEBHOOK_TOLERANCE_SECS};
pub use signature::SIGNATURE_HEADER;
