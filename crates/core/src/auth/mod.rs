//! Request authentication.
//!
//! Authenticators turn request headers into the [`Identity`] that owns the
//! tasks a request touches.

mod api_key;
mod none;
mod traits;
mod types;

use std::sync::Arc;

pub use api_key::ApiKeyAuthenticator;
pub use none::NoneAuthenticator;
pub use traits::{AuthError, Authenticator};
pub use types::{AuthRequest, Identity, ANONYMOUS_USER, USER_ID_HEADER};

use crate::config::{AuthConfig, AuthMethod};

/// Build the authenticator selected by `auth.method`.
pub fn create_authenticator(config: &AuthConfig) -> Result<Arc<dyn Authenticator>, AuthError> {
    let authenticator: Arc<dyn Authenticator> = match config.method {
        AuthMethod::None => Arc::new(NoneAuthenticator),
        AuthMethod::ApiKey => {
            let key = config.api_key.as_deref().ok_or_else(|| {
                AuthError::Misconfigured("auth.api_key is required for api_key".to_string())
            })?;
            Arc::new(ApiKeyAuthenticator::new(key)?)
        }
    };
    Ok(authenticator)
}
