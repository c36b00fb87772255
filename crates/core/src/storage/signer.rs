//! Signed object URLs.
//!
//! A URL carries `expires` (unix seconds) and `signature`, the hex
//! HMAC-SHA-256 over method, key and expiry joined by newlines.

use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::error::StorageError;
use super::types::{PresignedUrl, UrlMethod};

type HmacSha256 = Hmac<Sha256>;

/// Route prefix under which objects are served.
pub const OBJECTS_PATH: &str = "/api/v1/objects";

/// Creates and checks presigned object URLs.
#[derive(Clone)]
pub struct UrlSigner {
    mac: HmacSha256,
    base_url: String,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl UrlSigner {
    /// `base_url` is the public origin of the server, e.g. `http://localhost:8080`.
    pub fn new(secret: impl AsRef<[u8]>, base_url: impl Into<String>) -> Self {
        Self {
            mac: HmacSha256::new_from_slice(secret.as_ref())
                .expect("HMAC-SHA-256 accepts keys of any size"),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn sign(&self, method: UrlMethod, key: &str, ttl: Duration) -> PresignedUrl {
        self.sign_at(method, key, Utc::now() + ttl)
    }

    fn sign_at(&self, method: UrlMethod, key: &str, expires_at: DateTime<Utc>) -> PresignedUrl {
        let expires = expires_at.timestamp();
        let signature = self.signature(method, key, expires);
        let url = format!(
            "{}{}/{}?expires={}&signature={}",
            self.base_url,
            OBJECTS_PATH,
            encode_key(key),
            expires,
            signature
        );

        PresignedUrl {
            url,
            expires_at: Utc.timestamp_opt(expires, 0).single().unwrap_or(expires_at),
        }
    }

    /// Check a signature presented for `key` at `now`.
    pub fn verify(
        &self,
        method: UrlMethod,
        key: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let presented =
            hex::decode(signature).map_err(|_| StorageError::InvalidSignature(key.to_string()))?;
        self.keyed(method, key, expires)
            .verify_slice(&presented)
            .map_err(|_| StorageError::InvalidSignature(key.to_string()))?;
        if now.timestamp() > expires {
            return Err(StorageError::Expired(key.to_string()));
        }
        Ok(())
    }

    fn keyed(&self, method: UrlMethod, key: &str, expires: i64) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(method.as_str().as_bytes());
        mac.update(b"\n");
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        mac
    }

    fn signature(&self, method: UrlMethod, key: &str, expires: i64) -> String {
        hex::encode(self.keyed(method, key, expires).finalize().into_bytes())
    }
}

/// Percent-encode each path segment of a key.
pub fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
