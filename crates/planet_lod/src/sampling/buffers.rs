//! Per-triangle sample buffers (one entry per lattice vertex).
//!
//! Allocated once through [`crate::pool::Pool`] and reused: `reset` keeps the
//! capacity and only rewrites the contents.

use glam::{DVec2, DVec3};

use crate::constants::LATTICE_VERTICES;

/// Neutral albedo before any color feature runs.
pub const BASE_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

/// Biome weights before any biome feature runs (all in channel 0).
pub const BASE_WEIGHTS: [f32; 4] = [1.0, 0.0, 0.0, 0.0];

/// Working memory for sampling one triangle.
#[derive(Clone, Debug, Default)]
pub struct SampleBuffers {
  /// Undeformed lattice points.
  pub points: Vec<DVec3>,
  /// Unit outward directions after shape deformation.
  pub directions: Vec<DVec3>,
  /// Points on the undisplaced base surface.
  pub bases: Vec<DVec3>,
  /// Global projection texture coordinates.
  pub uvs: Vec<DVec2>,
  /// Heights along `directions`.
  pub heights: Vec<f32>,
  /// Albedo (linear RGBA).
  pub colors: Vec<[f32; 4]>,
  /// Biome blend weights.
  pub weights: Vec<[f32; 4]>,
  /// Final displaced positions.
  pub positions: Vec<DVec3>,
}

impl SampleBuffers {
  /// Buffers sized for one lattice.
  pub fn for_lattice() -> Self {
    let mut buffers = Self::default();
    buffers.reset(LATTICE_VERTICES);
    buffers
  }

  /// Resize every buffer to `len` and restore defaults. Points are left for
  /// the lattice fill to overwrite.
  pub fn reset(&mut self, len: usize) {
    self.points.clear();
    self.points.resize(len, DVec3::ZERO);
    fill(&mut self.directions, len, DVec3::Y);
    fill(&mut self.bases, len, DVec3::ZERO);
    fill(&mut self.uvs, len, DVec2::ZERO);
    fill(&mut self.heights, len, 0.0);
    fill(&mut self.colors, len, BASE_COLOR);
    fill(&mut self.weights, len, BASE_WEIGHTS);
    fill(&mut self.positions, len, DVec3::ZERO);
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.points.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }
}

#[inline]
fn fill<T: Copy>(buffer: &mut Vec<T>, len: usize, value: T) {
  buffer.clear();
  buffer.resize(len, value);
}
