//! # Auth Context
//!
//! Resolves the caller's `user_id` from the `x-user-id` header. Validating
//! a JWT or session cookie is explicitly out of scope (spec §1 Non-goals):
//! this crate assumes an upstream gateway already authenticated the caller
//! and forwards its resolved identity as a trusted header.

use crate::error::ApiError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Extractor pulling the trusted caller identity out of the request.
/// Rejects with [`ApiError::Unauthorized`] when the header is absent or
/// empty.
pub struct AuthContext {
    pub user_id: String,
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(ApiError::Unauthorized)?;
        Ok(Self {
            user_id: user_id.to_string(),
        })
    }
}
