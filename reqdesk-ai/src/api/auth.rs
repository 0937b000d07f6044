//! Caller identity
//!
//! Authentication happens upstream; the gateway forwards the caller's id and
//! role as headers.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;
use reqdesk_common::db::UserRole;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Authenticated caller
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl Caller {
    /// Ministry staff or admin
    pub fn require_staff(&self) -> Result<(), ApiError> {
        if self.role.is_staff() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Staff role required".to_string()))
        }
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.role == UserRole::Admin {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Admin role required".to_string()))
        }
    }

    /// Owner of the resource, or staff
    pub fn require_owner_or_staff(&self, owner_id: Uuid) -> Result<(), ApiError> {
        if self.user_id == owner_id || self.role.is_staff() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Not allowed to view this request".to_string()))
        }
    }
}

fn header_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_value(parts, USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("Missing {} header", USER_ID_HEADER)))?;
        let user_id = Uuid::parse_str(user_id)
            .map_err(|_| ApiError::Unauthorized(format!("Invalid {} header", USER_ID_HEADER)))?;

        let role = header_value(parts, USER_ROLE_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("Missing {} header", USER_ROLE_HEADER)))?
            .parse::<UserRole>()
            .map_err(|_| ApiError::Unauthorized(format!("Invalid {} header", USER_ROLE_HEADER)))?;

        Ok(Caller { user_id, role })
    }
}
