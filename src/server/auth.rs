//! Authenticated user extraction.
//!
//! Token validation happens in front of this service; the validated user ID
//! arrives in a request header.

use axum::{async_trait, extract::FromRef, extract::FromRequestParts, http::request::Parts};

use super::error::ApiError;

/// Which header carries the user ID.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub user_header: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            user_header: crate::config::DEFAULT_USER_HEADER.to_string(),
        }
    }
}

/// The user a request was made on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AuthConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AuthConfig::from_ref(state);
        let user = parts
            .headers
            .get(config.user_header.as_str())
            .and_then(|val| val.to_str().ok())
            .map(str::trim)
            .filter(|val| !val.is_empty());

        match user {
            Some(user) => Ok(AuthUser(user.to_string())),
            None => {
                tracing::warn!("Missing or invalid {} header", config.user_header);
                Err(ApiError::Unauthorized)
            }
        }
    }
}
