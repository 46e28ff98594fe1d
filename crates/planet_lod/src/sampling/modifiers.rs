//! Concrete features: Detail, Flatten, Color, Biome.

use glam::DVec3;

use super::buffers::SampleBuffers;
use super::features::{
  coverage, lerp4, mask_weight, smoothstep, Feature, FeatureKind, FeatureSpace, FeatureTableEntry, LocalFrame,
  SampleContext,
};
use super::heightmap::{polar_uv, HeightSource};
use crate::tree::Shape;

/// |dir.y| where pole blending starts and where it is complete.
const POLE_BLEND_START: f64 = 0.8;
const POLE_BLEND_END: f64 = 0.95;

// =============================================================================
// Detail
// =============================================================================

/// Adds a masked height delta from a detail map.
///
/// The map's normalized value is re-centered to `[-1, 1]` and scaled by
/// `amplitude`. On spheres, global detail blends towards a top-down sample
/// at `pole_frequency` near the poles, where the equirectangular mapping
/// pinches.
#[derive(Clone, Debug)]
pub struct DetailFeature {
  pub space: FeatureSpace,
  pub source: HeightSource,
  pub mask: Option<HeightSource>,
  pub amplitude: f32,
  pub frequency: f64,
  /// Second frequency used near projection poles, `None` disables blending.
  pub pole_frequency: Option<f64>,
  pub enabled: bool,
  frame: Option<LocalFrame>,
}

impl DetailFeature {
  pub fn new(source: HeightSource, amplitude: f32) -> Self {
    Self {
      space: FeatureSpace::Global,
      source,
      mask: None,
      amplitude,
      frequency: 1.0,
      pole_frequency: None,
      enabled: true,
      frame: None,
    }
  }

  pub fn with_space(mut self, space: FeatureSpace) -> Self {
    self.space = space;
    self
  }

  pub fn with_mask(mut self, mask: HeightSource) -> Self {
    self.mask = Some(mask);
    self
  }

  pub fn with_frequency(mut self, frequency: f64) -> Self {
    self.frequency = frequency;
    self
  }

  pub fn with_pole_blend(mut self, pole_frequency: f64) -> Self {
    self.pole_frequency = Some(pole_frequency);
    self
  }

  fn pole_weight(&self, ctx: &SampleContext, direction: DVec3) -> f32 {
    let blends = self.pole_frequency.is_some()
      && self.space.is_global()
      && matches!(ctx.shape, Shape::Sphere { .. });
    if !blends {
      return 0.0;
    }
    smoothstep(POLE_BLEND_START, POLE_BLEND_END, direction.y.abs()) as f32
  }
}

impl Feature for DetailFeature {
  fn kind(&self) -> FeatureKind {
    FeatureKind::Detail
  }

  fn space(&self) -> FeatureSpace {
    self.space
  }

  fn enabled(&self) -> bool {
    self.enabled
  }

  fn prepare(&mut self, ctx: &SampleContext) {
    self.frame = self.space.frame(&ctx.shape);
  }

  fn apply(&self, ctx: &SampleContext, buffers: &mut SampleBuffers) {
    for k in 0..buffers.len() {
      let Some((weight, uv)) = coverage(self.frame.as_ref(), buffers, k) else {
        continue;
      };
      let weight = weight * mask_weight(self.mask.as_ref(), uv);
      if weight <= 0.0 {
        continue;
      }

      let mut value = self.source.sample_normalized(uv * self.frequency);
      let pole = self.pole_weight(ctx, buffers.directions[k]);
      if pole > 0.0 {
        let pole_frequency = self.pole_frequency.unwrap_or(self.frequency);
        let polar = self
          .source
          .sample_normalized(polar_uv(buffers.directions[k]) * pole_frequency);
        value += (polar - value) * pole;
      }

      buffers.heights[k] += (value * 2.0 - 1.0) * self.amplitude * weight;
    }
  }

  fn table_entry(&self) -> FeatureTableEntry {
    let mut entry = FeatureTableEntry::new(FeatureKind::Detail, &self.space);
    entry.params = [
      self.amplitude,
      self.frequency as f32,
      self.pole_frequency.unwrap_or(0.0) as f32,
      0.0,
    ];
    entry
  }
}

// =============================================================================
// Flatten
// =============================================================================

/// Pulls heights towards `target` by mask weight times `strength`.
#[derive(Clone, Debug)]
pub struct FlattenFeature {
  pub space: FeatureSpace,
  pub target: f32,
  pub strength: f32,
  pub mask: Option<HeightSource>,
  pub enabled: bool,
  frame: Option<LocalFrame>,
}

impl FlattenFeature {
  pub fn new(space: FeatureSpace, target: f32, strength: f32) -> Self {
    Self {
      space,
      target,
      strength: strength.clamp(0.0, 1.0),
      mask: None,
      enabled: true,
      frame: None,
    }
  }

  pub fn with_mask(mut self, mask: HeightSource) -> Self {
    self.mask = Some(mask);
    self
  }
}

impl Feature for FlattenFeature {
  fn kind(&self) -> FeatureKind {
    FeatureKind::Flatten
  }

  fn space(&self) -> FeatureSpace {
    self.space
  }

  fn enabled(&self) -> bool {
    self.enabled
  }

  fn prepare(&mut self, ctx: &SampleContext) {
    self.frame = self.space.frame(&ctx.shape);
  }

  fn apply(&self, _ctx: &SampleContext, buffers: &mut SampleBuffers) {
    for k in 0..buffers.len() {
      let Some((weight, uv)) = coverage(self.frame.as_ref(), buffers, k) else {
        continue;
      };
      let t = (weight * mask_weight(self.mask.as_ref(), uv) * self.strength).clamp(0.0, 1.0);
      let h = buffers.heights[k];
      buffers.heights[k] = h + (self.target - h) * t;
    }
  }

  fn table_entry(&self) -> FeatureTableEntry {
    let mut entry = FeatureTableEntry::new(FeatureKind::Flatten, &self.space);
    entry.params = [self.target, self.strength, 0.0, 0.0];
    entry
  }
}

// =============================================================================
// Color
// =============================================================================

/// Tints albedo towards `color`.
#[derive(Clone, Debug)]
pub struct ColorFeature {
  pub space: FeatureSpace,
  pub color: [f32; 4],
  pub strength: f32,
  pub mask: Option<HeightSource>,
  pub enabled: bool,
  frame: Option<LocalFrame>,
}

impl ColorFeature {
  pub fn new(space: FeatureSpace, color: [f32; 4], strength: f32) -> Self {
    Self {
      space,
      color,
      strength: strength.clamp(0.0, 1.0),
      mask: None,
      enabled: true,
      frame: None,
    }
  }

  pub fn with_mask(mut self, mask: HeightSource) -> Self {
    self.mask = Some(mask);
    self
  }
}

impl Feature for ColorFeature {
  fn kind(&self) -> FeatureKind {
    FeatureKind::Color
  }

  fn space(&self) -> FeatureSpace {
    self.space
  }

  fn enabled(&self) -> bool {
    self.enabled
  }

  fn prepare(&mut self, ctx: &SampleContext) {
    self.frame = self.space.frame(&ctx.shape);
  }

  fn apply(&self, _ctx: &SampleContext, buffers: &mut SampleBuffers) {
    for k in 0..buffers.len() {
      let Some((weight, uv)) = coverage(self.frame.as_ref(), buffers, k) else {
        continue;
      };
      let t = (weight * mask_weight(self.mask.as_ref(), uv) * self.strength).clamp(0.0, 1.0);
      buffers.colors[k] = lerp4(buffers.colors[k], self.color, t);
    }
  }

  fn table_entry(&self) -> FeatureTableEntry {
    let mut entry = FeatureTableEntry::new(FeatureKind::Color, &self.space);
    entry.params = [self.strength, 0.0, 0.0, 0.0];
    entry.color = self.color;
    entry
  }
}

// =============================================================================
// Biome
// =============================================================================

/// One height band of a biome ramp.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BiomeBand {
  /// Heights up to this value (inclusive) belong to the band.
  pub max_height: f32,
  pub color: [f32; 4],
}

/// Assigns each point to a height band, tinting albedo and recording the
/// band in the biome weights (up to four channels).
#[derive(Clone, Debug)]
pub struct BiomeFeature {
  pub space: FeatureSpace,
  /// Bands sorted by `max_height`.
  pub bands: Vec<BiomeBand>,
  pub mask: Option<HeightSource>,
  pub enabled: bool,
  frame: Option<LocalFrame>,
}

impl BiomeFeature {
  pub fn new(space: FeatureSpace, mut bands: Vec<BiomeBand>) -> Self {
    bands.sort_by(|a, b| a.max_height.total_cmp(&b.max_height));
    Self {
      space,
      bands,
      mask: None,
      enabled: true,
      frame: None,
    }
  }

  pub fn with_mask(mut self, mask: HeightSource) -> Self {
    self.mask = Some(mask);
    self
  }

  /// Index of the band containing `height` (the last band catches the rest).
  pub fn band_index(&self, height: f32) -> Option<usize> {
    if self.bands.is_empty() {
      return None;
    }
    let index = self.bands.partition_point(|band| band.max_height < height);
    Some(index.min(self.bands.len() - 1))
  }
}

impl Feature for BiomeFeature {
  fn kind(&self) -> FeatureKind {
    FeatureKind::Biome
  }

  fn space(&self) -> FeatureSpace {
    self.space
  }

  fn enabled(&self) -> bool {
    self.enabled && !self.bands.is_empty()
  }

  fn prepare(&mut self, ctx: &SampleContext) {
    self.frame = self.space.frame(&ctx.shape);
  }

  fn apply(&self, _ctx: &SampleContext, buffers: &mut SampleBuffers) {
    for k in 0..buffers.len() {
      let Some((weight, uv)) = coverage(self.frame.as_ref(), buffers, k) else {
        continue;
      };
      let t = (weight * mask_weight(self.mask.as_ref(), uv)).clamp(0.0, 1.0);
      let Some(index) = self.band_index(buffers.heights[k]) else {
        continue;
      };
      buffers.colors[k] = lerp4(buffers.colors[k], self.bands[index].color, t);

      let mut target = [0.0; 4];
      target[index.min(3)] = 1.0;
      buffers.weights[k] = lerp4(buffers.weights[k], target, t);
    }
  }

  fn table_entry(&self) -> FeatureTableEntry {
    let mut entry = FeatureTableEntry::new(FeatureKind::Biome, &self.space);
    entry.params[0] = self.bands.len() as f32;
    for (slot, band) in entry.params[1..].iter_mut().zip(&self.bands) {
      *slot = band.max_height;
    }
    entry
  }
}
