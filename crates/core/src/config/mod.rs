//! Service configuration.
//!
//! One TOML file, layered with `REELPRESS_`-prefixed environment overrides,
//! then checked by [`validate_config`] before anything starts.

mod loader;
mod types;
mod validate;

use std::path::PathBuf;

pub use loader::*;
pub use types::*;
pub use validate::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file {0:?} does not exist")]
    NotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    Parse(String),

    #[error("configuration rejected: {}", .0.join("; "))]
    Invalid(Vec<String>),
}
