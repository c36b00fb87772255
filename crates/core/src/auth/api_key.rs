//! Shared-key authentication.

use async_trait::async_trait;

use super::{AuthError, AuthRequest, Authenticator, Identity};

const API_KEY_HEADER: &str = "x-api-key";

/// Requires a configured key in `X-API-Key` or `Authorization: Bearer`.
///
/// The key proves the caller may use the service; the acting user still
/// comes from `X-User-Id`.
pub struct ApiKeyAuthenticator {
    key: Vec<u8>,
}

impl std::fmt::Debug for ApiKeyAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyAuthenticator").finish_non_exhaustive()
    }
}

impl ApiKeyAuthenticator {
    pub fn new(api_key: impl Into<String>) -> Result<Self, AuthError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AuthError::Misconfigured("api_key is empty".to_string()));
        }
        Ok(Self {
            key: api_key.into_bytes(),
        })
    }

    fn presented_key<'a>(request: &'a AuthRequest) -> Option<&'a str> {
        if let Some(key) = request.headers.get(API_KEY_HEADER) {
            return Some(key.trim());
        }

        let authorization = request.headers.get("authorization")?;
        let (scheme, token) = authorization.trim().split_once(' ')?;
        scheme
            .eq_ignore_ascii_case("bearer")
            .then(|| token.trim())
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let presented = Self::presented_key(request).ok_or(AuthError::MissingCredentials)?;
        if !constant_time_eq(presented.as_bytes(), &self.key) {
            return Err(AuthError::InvalidCredentials("unknown API key".to_string()));
        }

        let user_id = request.user_id()?;
        Ok(Identity::new(user_id, "api_key"))
    }

    fn method_name(&self) -> &'static str {
        "api_key"
    }
}

/// Compare two byte strings without an early exit on the first mismatch.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
