//! VisualAtlasManager - baked storage plus shown batches.
//!
//! # Lifecycle
//!
//! ```text
//!   add_visual ──► Hidden ──show_visual──► Shown
//!                    ▲  │                   │
//!                    │  └──remove_visual─┐  │
//!                    └────hide_visual────┼──┘
//!                                        ▼
//!                               slice back on free stack
//! ```
//!
//! Baking is expensive, show/hide is array bookkeeping. Hiding never touches
//! Storage, so a triangle that splits and merges back is shown again from
//! its original bake.
//!
//! A batch emptied by a hide is swapped to the end of the batch list (the
//! batch it trades places with is repointed and marked dirty) and trailing
//! empty batches beyond one spare are dropped.

use std::collections::HashMap;

use tracing::{debug, trace};

use super::batch::{Batch, BatchSlot};
use super::storage::{SliceView, Storage, StorageSlot};
use super::visual::Visual;
use crate::sampling::SampleResult;
use crate::tree::TriangleId;

/// External draw call for batches.
pub trait BatchRenderer {
  /// Draw one non-empty batch. `batch.is_dirty()` tells whether its
  /// instance arrays changed since the previous draw.
  fn draw_batch(&mut self, index: usize, batch: &Batch);
}

/// Owner of every visual, storage page and batch of one terrain.
#[derive(Debug, Default)]
pub struct VisualAtlasManager {
  storage: Storage,
  batches: Vec<Batch>,
  visuals: HashMap<TriangleId, Visual>,
}

impl VisualAtlasManager {
  pub fn new() -> Self {
    Self::default()
  }

  /// Reserve a slice on a page with free capacity.
  pub fn get_storage(&mut self) -> StorageSlot {
    self.storage.allocate()
  }

  /// Store a baked triangle as a hidden visual.
  ///
  /// Returns `false` (and stores nothing) when the id already has a visual.
  pub fn add_visual(&mut self, result: &SampleResult) -> bool {
    let id = result.triangle.id;
    if self.visuals.contains_key(&id) {
      debug!(id = id.raw(), "Visual already present");
      return false;
    }
    let slot = self.get_storage();
    self.storage.write(slot, &result.baked);
    self
      .visuals
      .insert(id, Visual::new(&result.triangle, result.corners, result.origin, slot));
    trace!(id = id.raw(), page = slot.page, slice = slot.slice, "Visual added");
    true
  }

  /// Put a visual into a batch. Already-shown visuals are left alone.
  pub fn show_visual(&mut self, id: TriangleId) -> bool {
    let Some(visual) = self.visuals.get_mut(&id) else {
      debug!(id = id.raw(), "Show of unknown visual");
      return false;
    };
    if visual.is_shown() {
      return true;
    }

    let batch_index = match self.batches.iter().position(|batch| !batch.is_full()) {
      Some(index) => index,
      None => {
        self.batches.push(Batch::new());
        self.batches.len() - 1
      }
    };
    let Some(page) = self.storage.page(visual.storage.page) else {
      return false;
    };
    let Some(slot) = self.batches[batch_index].push(
      id,
      visual.instance(),
      page.layers(),
      visual.storage.slice as usize,
    ) else {
      return false;
    };

    visual.batch = Some(BatchSlot {
      batch: batch_index,
      slot,
    });
    true
  }

  /// Take a visual out of its batch. Baked data stays in Storage.
  pub fn hide_visual(&mut self, id: TriangleId) -> bool {
    let Some(assigned) = self.visuals.get_mut(&id).and_then(|visual| visual.batch.take()) else {
      return false;
    };

    let moved = self
      .batches
      .get_mut(assigned.batch)
      .and_then(|batch| batch.swap_remove(assigned.slot));
    if let Some(moved) = moved.and_then(|moved_id| self.visuals.get_mut(&moved_id)) {
      moved.batch = Some(assigned);
    }
    if self.batches.get(assigned.batch).is_some_and(Batch::is_empty) {
      self.retire_batch(assigned.batch);
    }
    true
  }

  /// Move the empty batch at `index` to the end and drop surplus empties.
  fn retire_batch(&mut self, index: usize) {
    let last = self.batches.len() - 1;
    if index != last {
      self.batches.swap(index, last);
      let batch = &mut self.batches[index];
      batch.mark_dirty();
      for (slot, id) in batch.ids().iter().enumerate() {
        if let Some(visual) = self.visuals.get_mut(id) {
          visual.batch = Some(BatchSlot { batch: index, slot });
        }
      }
    }

    // Keep one spare so a lone show/hide does not reallocate
    while let [.., spare, last] = self.batches.as_slice() {
      if !(spare.is_empty() && last.is_empty()) {
        break;
      }
      self.batches.pop();
      trace!(batches = self.batches.len(), "Empty batch released");
    }
  }

  /// Hide a visual, release its slice and forget it.
  pub fn remove_visual(&mut self, id: TriangleId) -> bool {
    self.hide_visual(id);
    let Some(visual) = self.visuals.remove(&id) else {
      return false;
    };
    self.storage.release(visual.storage);
    trace!(id = id.raw(), "Visual removed");
    true
  }

  #[inline]
  pub fn visual(&self, id: TriangleId) -> Option<&Visual> {
    self.visuals.get(&id)
  }

  #[inline]
  pub fn contains(&self, id: TriangleId) -> bool {
    self.visuals.contains_key(&id)
  }

  #[inline]
  pub fn is_shown(&self, id: TriangleId) -> bool {
    self.visuals.get(&id).is_some_and(Visual::is_shown)
  }

  /// Baked layers of a visual.
  pub fn baked(&self, id: TriangleId) -> Option<SliceView<'_>> {
    let visual = self.visuals.get(&id)?;
    self.storage.slice(visual.storage)
  }

  /// Every visual id, sorted.
  pub fn ids(&self) -> Vec<TriangleId> {
    let mut ids: Vec<_> = self.visuals.keys().copied().collect();
    ids.sort_unstable();
    ids
  }

  #[inline]
  pub fn visual_count(&self) -> usize {
    self.visuals.len()
  }

  pub fn shown_count(&self) -> usize {
    self.batches.iter().map(Batch::len).sum()
  }

  #[inline]
  pub fn batches(&self) -> &[Batch] {
    &self.batches
  }

  #[inline]
  pub fn batch_count(&self) -> usize {
    self.batches.len()
  }

  #[inline]
  pub fn storage(&self) -> &Storage {
    &self.storage
  }

  #[inline]
  pub fn storage_page_count(&self) -> usize {
    self.storage.page_count()
  }

  /// Hand every non-empty batch to the renderer and clear dirty flags.
  ///
  /// Returns the number of batches drawn.
  pub fn draw(&mut self, renderer: &mut dyn BatchRenderer) -> usize {
    let mut drawn = 0;
    for (index, batch) in self.batches.iter_mut().enumerate() {
      if !batch.is_empty() {
        renderer.draw_batch(index, batch);
        drawn += 1;
      }
      batch.clear_dirty();
    }
    drawn
  }

  /// Drop every visual, page and batch.
  pub fn clear(&mut self) {
    self.visuals.clear();
    self.batches.clear();
    self.storage.clear();
  }
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod manager_test;
