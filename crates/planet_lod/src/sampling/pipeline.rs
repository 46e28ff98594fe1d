//! FeaturePipeline - ordered sampling of one triangle's lattice.
//!
//! # Stages
//!
//! ```text
//! lattice point ──► deform ──► base height ──► Detail* ──► Flatten*
//!                                                             │
//!      position ◄── displace ◄── Biome* ◄── Color* ◄──────────┘
//! ```
//!
//! 1. Barycentric lattice (see [`super::lattice`]) in undeformed space.
//! 2. Shape deformation gives direction and base point.
//! 3. Base height from the topology heightmap through the shape projection.
//! 4. Enabled features in kind order (stable within a kind).
//! 5. Final position = base + direction * height.
//!
//! The pipeline is immutable once built and is shared by every sampling job.

use glam::DVec3;
use tracing::warn;

use super::bake::FeatureTables;
use super::buffers::SampleBuffers;
use super::features::{Feature, FeatureSet, SampleContext};
use super::heightmap::HeightSource;
use super::lattice::fill_lattice;
use crate::constants::{LATTICE_VERTICES, MAX_GLOBAL_FEATURES, MAX_LOCAL_FEATURES};
use crate::tree::{Shape, Triangle};

/// Prepared, read-only sampling pipeline of one terrain.
#[derive(Debug)]
pub struct FeaturePipeline {
  ctx: SampleContext,
  base_height: HeightSource,
  features: Vec<Box<dyn Feature>>,
}

impl FeaturePipeline {
  /// Prepare every feature for `shape` and order them by kind.
  pub fn new(shape: Shape, set: FeatureSet) -> Self {
    let ctx = SampleContext::new(shape);
    let (base_height, mut features) = set.into_parts();
    for feature in &mut features {
      feature.prepare(&ctx);
    }
    features.sort_by_key(|feature| feature.kind());

    Self {
      ctx,
      base_height,
      features,
    }
  }

  /// Flat terrain without features.
  pub fn flat(shape: Shape) -> Self {
    Self::new(shape, FeatureSet::default())
  }

  #[inline]
  pub fn context(&self) -> &SampleContext {
    &self.ctx
  }

  #[inline]
  pub fn shape(&self) -> Shape {
    self.ctx.shape
  }

  pub fn features(&self) -> &[Box<dyn Feature>] {
    &self.features
  }

  /// Fill the lattice of `tri` and run every stage.
  pub fn sample_triangle(&self, tri: &Triangle, buffers: &mut SampleBuffers) {
    let _span = tracing::info_span!("run_pipeline", depth = tri.depth).entered();
    buffers.reset(LATTICE_VERTICES);
    fill_lattice(tri, &mut buffers.points);
    self.run(buffers);
  }

  /// Run stages 2-5 over `buffers.points`.
  pub fn run(&self, buffers: &mut SampleBuffers) {
    self.run_stages(buffers, false);
  }

  fn run_stages(&self, buffers: &mut SampleBuffers, heights_only: bool) {
    let shape = self.ctx.shape;
    let projection = self.ctx.projection;

    for k in 0..buffers.len() {
      let surface = shape.surface(buffers.points[k]);
      let uv = projection.uv(&surface);
      buffers.directions[k] = surface.direction;
      buffers.bases[k] = surface.base;
      buffers.uvs[k] = uv;
      buffers.heights[k] = self.base_height.sample(uv);
    }

    let stages = self
      .features
      .iter()
      .filter(|f| f.enabled() && (!heights_only || f.kind().modifies_height()));
    for feature in stages {
      feature.apply(&self.ctx, buffers);
    }

    for k in 0..buffers.len() {
      buffers.positions[k] = buffers.bases[k] + buffers.directions[k] * buffers.heights[k] as f64;
    }
  }

  /// Terrain height under an arbitrary point.
  pub fn height_at(&self, point: DVec3) -> f64 {
    let mut buffers = SampleBuffers::default();
    buffers.reset(1);
    buffers.points[0] = point;
    self.run_stages(&mut buffers, true);
    buffers.heights[0] as f64
  }

  /// Observer moved against the surface direction by the height beneath
  /// it, so the split test measures altitude above the displaced terrain.
  pub fn effective_observer(&self, observer: DVec3) -> DVec3 {
    let direction = self.ctx.shape.surface(observer).direction;
    observer - direction * self.height_at(observer)
  }

  /// Feature records the baker needs for `tri`: every enabled global
  /// feature plus the local ones reaching the triangle.
  pub fn feature_tables(&self, tri: &Triangle) -> FeatureTables {
    let shape = self.ctx.shape;
    let center = shape.surface(tri.centroid()).base;
    let radius = tri
      .corners
      .iter()
      .map(|&corner| shape.surface(corner).base.distance(center))
      .fold(0.0, f64::max);

    let mut tables = FeatureTables::default();
    let mut dropped = 0usize;
    for feature in self.features.iter().filter(|f| f.enabled()) {
      if feature.space().is_global() {
        if tables.global.len() < MAX_GLOBAL_FEATURES {
          tables.global.push(feature.table_entry());
        } else {
          dropped += 1;
        }
      } else if feature.overlaps(&self.ctx, center, radius) {
        if tables.local.len() < MAX_LOCAL_FEATURES {
          tables.local.push(feature.table_entry());
        } else {
          dropped += 1;
        }
      }
    }

    if dropped > 0 {
      warn!(dropped, id = tri.id.raw(), "Feature tables over capacity");
    }
    tables
  }
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod pipeline_test;
