use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;

/// Header set by the upstream authentication layer once it has verified the
/// caller.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Verified caller of an authenticated endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i64,
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing authenticated user".to_string()))?;

        match header.trim().parse::<i64>() {
            Ok(id) if id > 0 => Ok(CurrentUser { id }),
            _ => Err(AppError::Unauthorized("invalid authenticated user".to_string())),
        }
    }
}
