//! Caller identity handed over by the upstream auth subsystem.
//!
//! The gateway in front of this service authenticates the user and forwards
//! the result as headers; they are trusted as given.

use axum::{extract::FromRequestParts, http::request::Parts};

use marketplace_types::{AppError, Principal, UserId, UserRole};

use super::handlers::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Extracts the authenticated [`Principal`]. Rejects with 401 when absent.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Principal);

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let id: UserId = header(USER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized("Missing user identity".into()))?
            .parse()
            .map_err(|_| AppError::Unauthorized("Malformed user identity".into()))?;

        let role = match header(USER_ROLE_HEADER) {
            Some(role) => role
                .parse()
                .map_err(|_| AppError::Unauthorized(format!("Unknown role: {}", role)))?,
            None => UserRole::User,
        };

        Ok(Identity(Principal { id, role }))
    }
}
