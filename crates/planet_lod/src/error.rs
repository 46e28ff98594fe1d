//! Error type for the cold paths (configuration and terrain construction).
//!
//! The per-tick path never fails: lookups of unknown triangles return
//! `false`/`None` and malformed external data degrades to defaults.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading configuration or building a terrain.
#[derive(Debug, Error)]
pub enum TerrainError {
  /// The configuration file could not be read.
  #[error("failed to read config file {path}: {source}")]
  ConfigIo {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The configuration file is not valid TOML for [`crate::TerrainConfig`].
  #[error("failed to parse config: {0}")]
  ConfigParse(#[from] toml::de::Error),

  /// A configuration value is out of range.
  #[error("invalid config value `{field}`: {reason}")]
  InvalidConfig { field: &'static str, reason: String },

  /// The topology produced no seed triangles.
  #[error("topology has no seed triangles")]
  EmptyTopology,
}

impl TerrainError {
  pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
    Self::InvalidConfig {
      field,
      reason: reason.into(),
    }
  }
}

/// Result alias for fallible terrain operations.
pub type Result<T> = std::result::Result<T, TerrainError>;
