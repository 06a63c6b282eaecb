//! Authenticated caller identity.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ids::UserId;
use crate::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl std::str::FromStr for UserRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(UserRole::User),
            "admin" => Ok(UserRole::Admin),
            _ => Err(DomainError::ValidationError(format!("Unknown role: {}", s))),
        }
    }
}

/// The user on whose behalf a request runs. Resolved by the auth layer
/// before any operation is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    pub role: UserRole,
}

impl Principal {
    pub fn user(id: UserId) -> Self {
        Self {
            id,
            role: UserRole::User,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}
