use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Prefix of environment overrides. Nested keys use `__`, so
/// `REELPRESS_COORDINATOR__MAX_CONCURRENT_FILES` sets
/// `coordinator.max_concurrent_files`.
pub const ENV_PREFIX: &str = "REELPRESS_";

fn extract(figment: Figment) -> Result<Config, ConfigError> {
    figment
        .extract()
        .map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Read `path` and apply environment overrides on top.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    extract(
        Figment::from(Toml::file(path)).merge(Env::prefixed(ENV_PREFIX).split("__")),
    )
}

/// Parse TOML text alone; the environment is not consulted.
pub fn load_config_from_str(toml: &str) -> Result<Config, ConfigError> {
    extract(Figment::from(Toml::string(toml)))
}
