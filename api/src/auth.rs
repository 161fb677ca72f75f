use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;

/// Set by the upstream identity gateway after it has authenticated the caller.
pub use twin_core::USER_ID_HEADER;

/// Caller identity. Session handling lives in the gateway; this service trusts
/// the header it forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(*user);
        }

        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized {
                message: format!("Missing {USER_ID_HEADER} header"),
                docs_hint: Some(
                    "Requests must pass through the identity gateway, which sets the caller's user id."
                        .to_string(),
                ),
            })?;

        let user_id = parse_user_id(raw).ok_or_else(|| AppError::Unauthorized {
            message: format!("{USER_ID_HEADER} must be a UUID"),
            docs_hint: None,
        })?;

        let user = AuthenticatedUser { user_id };
        parts.extensions.insert(user);
        Ok(user)
    }
}

fn parse_user_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw.trim()).ok().filter(|id| !id.is_nil())
}
