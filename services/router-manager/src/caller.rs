//! Caller identity as resolved by the upstream identity provider.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::OpsError;

/// Header carrying the authenticated user id.
pub const USER_HEADER: &str = "x-user-id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
}

impl Caller {
    /// Fails with `Unauthorized` when no usable identity was supplied.
    pub fn resolve(user_id: Option<&str>) -> Result<Self, OpsError> {
        match user_id.map(str::trim) {
            Some(id) if !id.is_empty() => Ok(Self { user_id: id.to_string() }),
            _ => Err(OpsError::Unauthorized),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = OpsError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok());
        Caller::resolve(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_identity_is_unauthorized() {
        assert!(matches!(Caller::resolve(None), Err(OpsError::Unauthorized)));
        assert!(matches!(Caller::resolve(Some("   ")), Err(OpsError::Unauthorized)));
    }

    #[test]
    fn identity_is_trimmed() {
        let caller = Caller::resolve(Some(" user_42 ")).unwrap();
        assert_eq!(caller.user_id, "user_42");
    }
}
