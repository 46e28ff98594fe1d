//! Rate limiting for tree recomputes.
//!
//! Caps the number of brand-new triangles a single recompute may create so a
//! sudden observer jump spreads its work across several ticks.

/// Limits applied to one recompute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecomputeBudget {
  /// Maximum new triangles per recompute (0 = unlimited).
  pub max_new_triangles: usize,
  /// Maximum crack-fixing passes before giving up.
  pub max_fixer_passes: usize,
}

impl RecomputeBudget {
  pub const DEFAULT: Self = Self {
    max_new_triangles: 64,
    max_fixer_passes: 256,
  };

  /// No cap, used by force updates and tests.
  pub const UNLIMITED: Self = Self {
    max_new_triangles: 0,
    max_fixer_passes: 256,
  };

  /// Budget from a step limit (`None` = unlimited).
  pub fn from_step_limit(limit: Option<usize>) -> Self {
    Self {
      max_new_triangles: limit.unwrap_or(0),
      ..Self::DEFAULT
    }
  }

  #[inline]
  pub fn is_limited(&self) -> bool {
    self.max_new_triangles > 0
  }

  /// Check if `additional` more triangles fit after `created`.
  #[inline]
  pub fn can_create(&self, created: usize, additional: usize) -> bool {
    !self.is_limited() || created + additional <= self.max_new_triangles
  }
}

impl Default for RecomputeBudget {
  fn default() -> Self {
    Self::DEFAULT
  }
}

/// Statistics from one recompute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecomputeStats {
  /// Splits kept because both children already existed.
  pub continuity_splits: usize,
  /// New splits requested by the split metric.
  pub primary_splits: usize,
  /// Wanted splits postponed by the budget.
  pub deferred_splits: usize,
  /// Primary splits taken over the cap because nothing else fit.
  pub forced_splits: usize,
  /// Splits forced by the crack-fixing pass.
  pub fixer_splits: usize,
  /// Triangles in the new generation that the old one lacked.
  pub new_triangles: usize,
  /// Attempts discarded for exceeding the cap.
  pub retries: usize,
}

impl RecomputeStats {
  #[inline]
  pub fn total_splits(&self) -> usize {
    self.continuity_splits + self.primary_splits + self.fixer_splits
  }
}
