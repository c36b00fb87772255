use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

use super::AuthError;

/// Header naming the user a request acts for.
pub const USER_ID_HEADER: &str = "x-user-id";

/// User id used when a request names none.
pub const ANONYMOUS_USER: &str = "anonymous";

const MAX_USER_ID_LEN: usize = 128;

/// Request information for authentication
#[derive(Debug, Clone)]
pub struct AuthRequest {
    /// Header names are lowercase.
    pub headers: HashMap<String, String>,
    pub source_ip: IpAddr,
}

impl AuthRequest {
    pub fn new(headers: HashMap<String, String>, source_ip: IpAddr) -> Self {
        Self { headers, source_ip }
    }

    /// Request from loopback with no headers.
    #[cfg(test)]
    pub(crate) fn local() -> Self {
        Self::new(HashMap::new(), IpAddr::V4(std::net::Ipv4Addr::LOCALHOST))
    }

    /// User the request acts for, from the `X-User-Id` header.
    ///
    /// A missing or blank header means [`ANONYMOUS_USER`].
    pub fn user_id(&self) -> Result<String, AuthError> {
        let Some(raw) = self.headers.get(USER_ID_HEADER) else {
            return Ok(ANONYMOUS_USER.to_string());
        };

        let user_id = raw.trim();
        if user_id.is_empty() {
            return Ok(ANONYMOUS_USER.to_string());
        }
        if user_id.len() > MAX_USER_ID_LEN {
            return Err(AuthError::InvalidUserId(format!(
                "user id longer than {} characters",
                MAX_USER_ID_LEN
            )));
        }
        if !user_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'))
        {
            return Err(AuthError::InvalidUserId(
                "user id contains unsupported characters".to_string(),
            ));
        }

        Ok(user_id.to_string())
    }
}

/// Authenticated identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub method: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            method: method.into(),
        }
    }

    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS_USER, "none")
    }
}
