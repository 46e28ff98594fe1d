//! Visual - render record of one baked triangle.

use glam::DVec3;

use super::batch::{BatchSlot, Instance};
use super::storage::StorageSlot;
use crate::tree::{Triangle, TriangleId};

/// A baked triangle. Hidden while `batch` is `None`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Visual {
  pub id: TriangleId,
  pub depth: u32,
  pub fixer: bool,
  /// Displaced corners `[A, B, C]`.
  pub corners: [DVec3; 3],
  pub origin: DVec3,
  pub storage: StorageSlot,
  pub batch: Option<BatchSlot>,
}

impl Visual {
  pub fn new(triangle: &Triangle, corners: [DVec3; 3], origin: DVec3, storage: StorageSlot) -> Self {
    Self {
      id: triangle.id,
      depth: triangle.depth,
      fixer: triangle.fixer,
      corners,
      origin,
      storage,
      batch: None,
    }
  }

  #[inline]
  pub fn is_shown(&self) -> bool {
    self.batch.is_some()
  }

  pub fn instance(&self) -> Instance {
    Instance::new(self.origin, &self.corners, self.depth)
  }
}
