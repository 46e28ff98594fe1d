//! Feature - polymorphic point modifiers run by the sampling pipeline.
//!
//! Four kinds, always run in this order:
//!
//! | Kind    | Touches           |
//! |---------|-------------------|
//! | Detail  | heights (+delta)  |
//! | Flatten | heights (lerp)    |
//! | Color   | colors            |
//! | Biome   | colors, weights   |
//!
//! Each feature lives in a [`FeatureSpace`]: `Global` covers the whole
//! terrain and samples through the shape's projection; `Local` covers a
//! spherical region with a smooth radial falloff and samples in the tangent
//! plane at its center.
//!
//! Features are prepared once on the owning thread, then shared read-only
//! (`Arc`) with every in-flight sampling job.

use std::fmt::Debug;

use glam::{DVec2, DVec3};

use super::buffers::SampleBuffers;
use super::heightmap::{HeightSource, Projection};
use crate::tree::Shape;

/// Feature kind, declared in pipeline order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeatureKind {
  Detail,
  Flatten,
  Color,
  Biome,
}

impl FeatureKind {
  /// True for kinds that change heights (and so the displaced position).
  #[inline]
  pub fn modifies_height(&self) -> bool {
    matches!(self, FeatureKind::Detail | FeatureKind::Flatten)
  }
}

/// Region a feature applies to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FeatureSpace {
  Global,
  /// Region around `center` (topology-local space) with the given radius.
  Local { center: DVec3, radius: f64 },
}

impl FeatureSpace {
  #[inline]
  pub fn is_global(&self) -> bool {
    matches!(self, FeatureSpace::Global)
  }

  /// Tangent frame for local spaces, `None` for global ones.
  pub fn frame(&self, shape: &Shape) -> Option<LocalFrame> {
    match *self {
      FeatureSpace::Global => None,
      FeatureSpace::Local { center, radius } => Some(LocalFrame::new(shape, center, radius)),
    }
  }
}

/// Tangent-plane frame of a local feature, anchored on the base surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalFrame {
  pub center: DVec3,
  pub normal: DVec3,
  pub tangent: DVec3,
  pub bitangent: DVec3,
  pub radius: f64,
}

impl LocalFrame {
  pub fn new(shape: &Shape, center: DVec3, radius: f64) -> Self {
    let anchor = shape.surface(center);
    let (tangent, bitangent) = anchor.direction.any_orthonormal_pair();
    Self {
      center: anchor.base,
      normal: anchor.direction,
      tangent,
      bitangent,
      radius: radius.max(f64::EPSILON),
    }
  }

  /// 1 at the center, easing to 0 at `radius`.
  #[inline]
  pub fn weight(&self, base: DVec3) -> f32 {
    let d = base.distance(self.center);
    1.0 - smoothstep(0.5 * self.radius, self.radius, d) as f32
  }

  /// Tangent-plane coordinates, `[0, 1]` across the region's diameter.
  #[inline]
  pub fn uv(&self, base: DVec3) -> DVec2 {
    let offset = base - self.center;
    let scale = 0.5 / self.radius;
    DVec2::new(
      offset.dot(self.tangent) * scale + 0.5,
      offset.dot(self.bitangent) * scale + 0.5,
    )
  }

  /// True when a sphere `(center, radius)` reaches into the region.
  #[inline]
  pub fn overlaps(&self, center: DVec3, radius: f64) -> bool {
    self.center.distance(center) <= self.radius + radius
  }
}

/// Weight and texture coordinate of point `k` under a feature's space.
///
/// `None` when the point lies outside a local region.
#[inline]
pub fn coverage(frame: Option<&LocalFrame>, buffers: &SampleBuffers, k: usize) -> Option<(f32, DVec2)> {
  match frame {
    None => Some((1.0, buffers.uvs[k])),
    Some(frame) => {
      let base = buffers.bases[k];
      let weight = frame.weight(base);
      (weight > 0.0).then(|| (weight, frame.uv(base)))
    }
  }
}

/// Mask value at `uv`, 1 when there is no mask.
#[inline]
pub fn mask_weight(mask: Option<&HeightSource>, uv: DVec2) -> f32 {
  mask.map_or(1.0, |m| m.sample_normalized(uv))
}

/// Shape data every feature may read while running.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SampleContext {
  pub shape: Shape,
  pub projection: Projection,
}

impl SampleContext {
  pub fn new(shape: Shape) -> Self {
    Self {
      shape,
      projection: Projection::for_shape(&shape),
    }
  }
}

/// Compact per-feature record handed to the baker.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeatureTableEntry {
  pub kind: FeatureKind,
  /// Center xyz and radius; radius 0 for global features.
  pub region: [f32; 4],
  /// Kind-specific parameters.
  pub params: [f32; 4],
  pub color: [f32; 4],
}

impl FeatureTableEntry {
  pub fn new(kind: FeatureKind, space: &FeatureSpace) -> Self {
    let region = match *space {
      FeatureSpace::Global => [0.0; 4],
      FeatureSpace::Local { center, radius } => {
        [center.x as f32, center.y as f32, center.z as f32, radius as f32]
      }
    };
    Self {
      kind,
      region,
      params: [0.0; 4],
      color: [0.0; 4],
    }
  }
}

/// A point modifier.
pub trait Feature: Send + Sync + Debug {
  fn kind(&self) -> FeatureKind;

  fn space(&self) -> FeatureSpace;

  fn enabled(&self) -> bool {
    true
  }

  /// Precompute shape-dependent data. Runs once before the feature is
  /// shared with jobs.
  fn prepare(&mut self, ctx: &SampleContext);

  /// Modify the buffers at every lattice point.
  fn apply(&self, ctx: &SampleContext, buffers: &mut SampleBuffers);

  /// Record passed to the baker.
  fn table_entry(&self) -> FeatureTableEntry;

  /// True when the feature can affect a triangle bounded by
  /// `(center, radius)` on the base surface.
  fn overlaps(&self, ctx: &SampleContext, center: DVec3, radius: f64) -> bool {
    self
      .space()
      .frame(&ctx.shape)
      .map_or(true, |frame| frame.overlaps(center, radius))
  }
}

/// Base heightmap plus the features of one terrain.
#[derive(Debug, Default)]
pub struct FeatureSet {
  /// Topology heightmap sampled through the shape's projection.
  pub base_height: HeightSource,
  features: Vec<Box<dyn Feature>>,
}

impl FeatureSet {
  pub fn new(base_height: HeightSource) -> Self {
    Self {
      base_height,
      features: Vec::new(),
    }
  }

  /// Builder form of [`FeatureSet::push`].
  pub fn with(mut self, feature: impl Feature + 'static) -> Self {
    self.push(Box::new(feature));
    self
  }

  pub fn push(&mut self, feature: Box<dyn Feature>) {
    self.features.push(feature);
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.features.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.features.is_empty()
  }

  pub(crate) fn into_parts(self) -> (HeightSource, Vec<Box<dyn Feature>>) {
    (self.base_height, self.features)
  }
}

#[inline]
pub fn smoothstep(edge0: f64, edge1: f64, x: f64) -> f64 {
  if edge1 <= edge0 {
    return if x < edge0 { 0.0 } else { 1.0 };
  }
  let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
  t * t * (3.0 - 2.0 * t)
}

#[inline]
pub(crate) fn lerp4(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
  [
    a[0] + (b[0] - a[0]) * t,
    a[1] + (b[1] - a[1]) * t,
    a[2] + (b[2] - a[2]) * t,
    a[3] + (b[3] - a[3]) * t,
  ]
}
