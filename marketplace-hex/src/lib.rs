//! # Marketplace Hex
//!
//! Application service layer and HTTP adapter for the marketplace.
//!
//! ## Architecture
//!
//! - `service` - Transaction orchestrator (listings, seller linking, checkout, webhooks)
//! - `inbound/` - HTTP adapter (Axum server)
//! - `metrics` - Webhook settlement counters
//! - `openapi` - OpenAPI document served by Swagger UI
//!
//! The service is generic over `R: MarketplaceRepository` and
//! `G: PaymentGateway`, so both adapters are injected at wiring time.

pub mod inbound;
pub mod metrics;
pub mod openapi;
pub mod service;


pub use service::{MarketplaceService, SettlementOutcome};
