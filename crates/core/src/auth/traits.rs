use async_trait::async_trait;
use thiserror::Error;

use super::types::{AuthRequest, Identity};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credentials required")]
    MissingCredentials,

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("invalid user id: {0}")]
    InvalidUserId(String),

    #[error("authenticator misconfigured: {0}")]
    Misconfigured(String),
}

impl AuthError {
    /// Label used for the auth failure counter.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "missing_credentials",
            Self::InvalidCredentials(_) => "invalid_credentials",
            Self::InvalidUserId(_) => "invalid_user_id",
            Self::Misconfigured(_) => "misconfigured",
        }
    }
}

/// Resolves the user a request acts for.
///
/// Every task operation is scoped to the returned [`Identity`]; a request
/// never sees tasks owned by another user id.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError>;

    /// Value of `auth.method` this authenticator implements.
    fn method_name(&self) -> &'static str;
}
