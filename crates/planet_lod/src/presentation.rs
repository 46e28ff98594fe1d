//! TerrainListener - lifecycle notifications for external modules.
//!
//! Collider generators, prefab spawners and engine bridges subscribe to
//! triangle lifecycle events without the core depending on any of them.
//! Callbacks fire on the thread that drives the terrain's update loop, in
//! the order the atlas applies them.

use crate::tree::{Triangle, TriangleId};

/// Callback interface for triangle lifecycle events.
///
/// # Example
///
/// ```ignore
/// struct PrefabSpawner { /* ... */ }
///
/// impl TerrainListener for PrefabSpawner {
///   fn on_add_visual(&mut self, triangle: &Triangle) {
///     if !triangle.fixer {
///       self.queue_scatter(triangle);
///     }
///   }
///   // ...
/// }
/// ```
pub trait TerrainListener: Send {
  /// A triangle has been sampled and baked into Storage.
  ///
  /// `triangle.fixer` tells crack-fix triangles apart, which spawners
  /// usually skip.
  fn on_add_visual(&mut self, triangle: &Triangle);

  /// A baked triangle entered a batch and is now drawn.
  fn on_show_visual(&mut self, id: TriangleId);

  /// A shown triangle left its batch (it split). Baked data is kept.
  fn on_hide_visual(&mut self, id: TriangleId);

  /// A triangle's baked data was released.
  fn on_remove_visual(&mut self, id: TriangleId);

  /// The terrain is being torn down. Every visual has already been removed.
  fn on_terrain_destroy(&mut self);
}

/// No-op implementation for testing and headless operation.
pub struct NullListener;

impl TerrainListener for NullListener {
  fn on_add_visual(&mut self, _triangle: &Triangle) {
    // No-op
  }

  fn on_show_visual(&mut self, _id: TriangleId) {
    // No-op
  }

  fn on_hide_visual(&mut self, _id: TriangleId) {
    // No-op
  }

  fn on_remove_visual(&mut self, _id: TriangleId) {
    // No-op
  }

  fn on_terrain_destroy(&mut self) {
    // No-op
  }
}
