use async_trait::async_trait;

use super::{AuthError, AuthRequest, Authenticator, Identity};

/// Trusts `X-User-Id` without checking any credential.
///
/// Only for deployments behind a gateway that already authenticated the
/// caller. Configuration has to ask for it with `method = "none"`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoneAuthenticator;

impl NoneAuthenticator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Authenticator for NoneAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let user_id = request.user_id()?;
        Ok(Identity::new(user_id, "none"))
    }

    fn method_name(&self) -> &'static str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::USER_ID_HEADER;

    fn request(user: Option<&str>) -> AuthRequest {
        let mut request = AuthRequest::local();
        if let Some(user) = user {
            request
                .headers
                .insert(USER_ID_HEADER.to_string(), user.to_string());
        }
        request
    }

    #[tokio::test]
    async fn test_missing_header_is_anonymous() {
        let identity = NoneAuthenticator.authenticate(&request(None)).await.unwrap();
        assert_eq!(identity, Identity::anonymous());
    }

    #[tokio::test]
    async fn test_header_names_the_owner() {
        let identity = NoneAuthenticator
            .authenticate(&request(Some("bob")))
            .await
            .unwrap();
        assert_eq!(identity.user_id, "bob");
        assert_eq!(identity.method, "none");
    }

    #[tokio::test]
    async fn test_malformed_user_id_rejected() {
        let result = NoneAuthenticator
            .authenticate(&request(Some("../bob")))
            .await;
        assert!(matches!(result, Err(AuthError::InvalidUserId(_))));
    }
}
