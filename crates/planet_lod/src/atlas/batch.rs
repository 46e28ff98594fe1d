//! Batch - up to `BATCH_CAPACITY` shown triangles drawn in one call.
//!
//! Slots `0..len` are occupied. Instance arrays and atlas slices mirror the
//! slots 1:1, so removal swaps the last slot into the hole:
//!
//! ```text
//! before: [a][b][c][d]      remove b
//! after:  [a][d][c]         d moved 3 -> 1
//! ```

use glam::DVec3;

use super::storage::AtlasLayers;
use crate::constants::BATCH_CAPACITY;
use crate::tree::TriangleId;

/// A visual's place in a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BatchSlot {
  pub batch: usize,
  pub slot: usize,
}

/// Instance data for one shown triangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Instance {
  /// World-local origin, w = depth.
  pub origin: [f32; 4],
  /// Corners `[A, B, C]` relative to `origin`.
  pub corners: [[f32; 4]; 3],
}

impl Instance {
  pub fn new(origin: DVec3, corners: &[DVec3; 3], depth: u32) -> Self {
    let relative = |p: DVec3| {
      let v = (p - origin).as_vec3();
      [v.x, v.y, v.z, 1.0]
    };
    Self {
      origin: [origin.x as f32, origin.y as f32, origin.z as f32, depth as f32],
      corners: [relative(corners[0]), relative(corners[1]), relative(corners[2])],
    }
  }
}

/// GPU-facing batch arrays.
#[derive(Clone, Debug)]
pub struct Batch {
  ids: Vec<TriangleId>,
  instances: Vec<Instance>,
  atlas: AtlasLayers,
  dirty: bool,
}

impl Batch {
  pub fn new() -> Self {
    Self {
      ids: Vec::with_capacity(BATCH_CAPACITY),
      instances: Vec::with_capacity(BATCH_CAPACITY),
      atlas: AtlasLayers::new(BATCH_CAPACITY),
      dirty: false,
    }
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.ids.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.ids.is_empty()
  }

  #[inline]
  pub fn is_full(&self) -> bool {
    self.ids.len() >= BATCH_CAPACITY
  }

  /// Occupy the next slot, copying the baked slice into the batch atlas.
  ///
  /// Returns the slot index, or `None` when the batch is full.
  pub fn push(&mut self, id: TriangleId, instance: Instance, src: &AtlasLayers, src_slice: usize) -> Option<usize> {
    if self.is_full() {
      return None;
    }
    let slot = self.ids.len();
    self.ids.push(id);
    self.instances.push(instance);
    self.atlas.copy_from(slot, src, src_slice);
    self.dirty = true;
    Some(slot)
  }

  /// Free `slot` by moving the last occupied slot into it.
  ///
  /// Returns the id that moved into `slot`, if any.
  pub fn swap_remove(&mut self, slot: usize) -> Option<TriangleId> {
    if slot >= self.ids.len() {
      return None;
    }
    let last = self.ids.len() - 1;
    self.ids.swap_remove(slot);
    self.instances.swap_remove(slot);
    self.dirty = true;
    if slot == last {
      return None;
    }
    self.atlas.copy_within(slot, last);
    Some(self.ids[slot])
  }

  #[inline]
  pub fn ids(&self) -> &[TriangleId] {
    &self.ids
  }

  #[inline]
  pub fn instances(&self) -> &[Instance] {
    &self.instances
  }

  #[inline]
  pub fn atlas(&self) -> &AtlasLayers {
    &self.atlas
  }

  /// True when instance arrays changed since the last draw.
  #[inline]
  pub fn is_dirty(&self) -> bool {
    self.dirty
  }

  pub fn clear_dirty(&mut self) {
    self.dirty = false;
  }

  /// Force a re-upload, e.g. after the batch moved to another index.
  pub fn mark_dirty(&mut self) {
    self.dirty = true;
  }
}

impl Default for Batch {
  fn default() -> Self {
    Self::new()
  }
}
