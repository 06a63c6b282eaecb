//! HTTP Inbound Adapter
//!
//! Axum-based HTTP server that drives the application layer.

pub mod handlers;
pub mod identity;
mod rate_limit;
mod server;

pub use identity::{USER_ID_HEADER, USER_ROLE_HEADER};
pub use server::HttpServer;
