//! TerrainConfig - LOD aggressiveness, budgets and base shape.
//!
//! Loaded from TOML or built in code. Every field has a default, so a
//! config file only needs to name what it changes:
//!
//! ```toml
//! detail = 12.0
//! lod_steps = 30
//!
//! [shape]
//! kind = "sphere"
//! radius = 6000.0
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, TerrainError};
use crate::tree::Shape;

/// Deepest level `resolve_max_depth` will ever derive.
pub const MAX_DERIVED_DEPTH: u32 = 48;

/// Configuration for one terrain instance.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TerrainConfig {
  /// Base shape the seed triangles are laid out on.
  pub shape: Shape,

  /// LOD aggressiveness. A triangle splits when its apparent angular size
  /// exceeds `1 / detail`.
  pub detail: f64,

  /// Detail used by the synchronous activation pass.
  pub init_detail: f64,

  /// Smallest triangle edge (world units) regular splits may produce.
  pub minimum_triangle_size: f64,

  /// Explicit depth limit. Derived from `minimum_triangle_size` when absent.
  pub max_depth: Option<u32>,

  /// Wall-clock seconds of diff processing allowed per tick.
  pub lod_budget: f64,

  /// Maximum new triangles per recompute (0 = unlimited).
  pub lod_steps: usize,

  /// Run every tick synchronously, ignoring both budgets.
  pub force: bool,
}

impl Default for TerrainConfig {
  fn default() -> Self {
    Self {
      shape: Shape::Sphere { radius: 1000.0 },
      detail: 8.0,
      init_detail: 4.0,
      minimum_triangle_size: 1.0,
      max_depth: None,
      lod_budget: 0.004, // 4ms leaves headroom in a 16.6ms frame
      lod_steps: 64,
      force: false,
    }
  }
}

impl TerrainConfig {
  /// Load configuration from a TOML file.
  pub fn load(path: &Path) -> Result<Self> {
    let content = std::fs::read_to_string(path).map_err(|source| TerrainError::ConfigIo {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_toml_str(&content)
  }

  /// Parse and validate configuration from TOML text.
  pub fn from_toml_str(content: &str) -> Result<Self> {
    let config: TerrainConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  /// Check every value is in range.
  pub fn validate(&self) -> Result<()> {
    if !(self.detail.is_finite() && self.detail > 0.0) {
      return Err(TerrainError::invalid("detail", format!("must be > 0, got {}", self.detail)));
    }
    if !(self.init_detail.is_finite() && self.init_detail > 0.0) {
      return Err(TerrainError::invalid(
        "init_detail",
        format!("must be > 0, got {}", self.init_detail),
      ));
    }
    if !(self.minimum_triangle_size.is_finite() && self.minimum_triangle_size > 0.0) {
      return Err(TerrainError::invalid(
        "minimum_triangle_size",
        format!("must be > 0, got {}", self.minimum_triangle_size),
      ));
    }
    if !(self.lod_budget.is_finite() && self.lod_budget >= 0.0) {
      return Err(TerrainError::invalid(
        "lod_budget",
        format!("must be >= 0 seconds, got {}", self.lod_budget),
      ));
    }
    if self.lod_steps == 1 {
      return Err(TerrainError::invalid(
        "lod_steps",
        "a split creates two triangles, use 0 (unlimited) or at least 2",
      ));
    }
    let extent = self.shape.extent();
    if !(extent.is_finite() && extent > 0.0) {
      return Err(TerrainError::invalid("shape", format!("extent must be > 0, got {}", extent)));
    }
    Ok(())
  }

  /// Depth at which regular splits stop.
  ///
  /// Two bisections halve a triangle's longest edge, so the derived depth is
  /// `ceil(2 * log2(seed_edge / minimum_triangle_size))`.
  pub fn resolve_max_depth(&self, seed_edge: f64) -> u32 {
    if let Some(depth) = self.max_depth {
      return depth;
    }
    if seed_edge <= self.minimum_triangle_size {
      return 0;
    }
    let halvings = (seed_edge / self.minimum_triangle_size).log2();
    ((2.0 * halvings).ceil() as u32).min(MAX_DERIVED_DEPTH)
  }

  /// Per-tick wall-clock budget. Values past `Duration::MAX` saturate.
  #[inline]
  pub fn lod_budget_duration(&self) -> Duration {
    Duration::try_from_secs_f64(self.lod_budget).unwrap_or(Duration::MAX)
  }

  /// New-triangle cap for one recompute, `None` when unlimited.
  #[inline]
  pub fn step_limit(&self) -> Option<usize> {
    if self.force || self.lod_steps == 0 {
      None
    } else {
      Some(self.lod_steps)
    }
  }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
