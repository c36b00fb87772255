use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::collaborator::CollaboratorConfig;
use crate::coordinator::{CoordinatorConfig, RetentionConfig, SubmissionLimits};
use crate::storage::{ChecksumAlgorithm, StorageConfig};

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Remote transcoding engine
    #[serde(default = "CollaboratorConfig::transcoder")]
    pub transcoder: CollaboratorConfig,
    /// Remote similarity scorer
    #[serde(default = "CollaboratorConfig::scorer")]
    pub scorer: CollaboratorConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub limits: SubmissionLimits,
    #[serde(default)]
    pub retention: RetentionConfig,
}

impl Config {
    /// Minimal configuration with the given auth settings and defaults elsewhere.
    pub fn with_auth(auth: AuthConfig) -> Self {
        Self {
            auth,
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            transcoder: CollaboratorConfig::transcoder(),
            scorer: CollaboratorConfig::scorer(),
            coordinator: CoordinatorConfig::default(),
            limits: SubmissionLimits::default(),
            retention: RetentionConfig::default(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base URL clients reach the server at; signed object URLs point here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
        }
    }
}

impl ServerConfig {
    /// `public_url`, or one derived from the bind address.
    pub fn base_url(&self) -> String {
        if let Some(ref url) = self.public_url {
            return url.trim_end_matches('/').to_string();
        }
        let host = if self.host.is_unspecified() {
            "localhost".to_string()
        } else {
            match self.host {
                IpAddr::V6(v6) => format!("[{}]", v6),
                IpAddr::V4(v4) => v4.to_string(),
            }
        };
        format!("http://{}:{}", host, self.port)
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// Required when `method = "api_key"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("reelpress.db")
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    ApiKey,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ApiKey => "api_key",
        }
    }
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: SanitizedStorageConfig,
    pub transcoder: CollaboratorConfig,
    pub scorer: CollaboratorConfig,
    pub coordinator: CoordinatorConfig,
    pub limits: SubmissionLimits,
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: String,
    pub api_key_configured: bool,
}

/// Storage config with the signing secret hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedStorageConfig {
    pub root: PathBuf,
    pub checksum: ChecksumAlgorithm,
    pub signing_secret_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            auth: SanitizedAuthConfig {
                method: config.auth.method.as_str().to_string(),
                api_key_configured: config.auth.api_key.is_some(),
            },
            server: config.server.clone(),
            database: config.database.clone(),
            storage: SanitizedStorageConfig {
                root: config.storage.root.clone(),
                checksum: config.storage.checksum,
                signing_secret_configured: config.storage.signing_secret.is_some(),
            },
            transcoder: config.transcoder.clone(),
            scorer: config.scorer.clone(),
            coordinator: config.coordinator.clone(),
            limits: config.limits.clone(),
            retention: config.retention.clone(),
        }
    }
}
