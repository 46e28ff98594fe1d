//! HeightSource - read-only single-channel 2D data (heights and masks).
//!
//! 8- or 16-bit texels normalized to `[0, 1]`, sampled with bilinear or
//! Catmull-Rom bicubic filtering and wrap or clamp addressing. `sample`
//! scales the normalized value by `range`.
//!
//! Texel centers sit at `(x + 0.5) / width`, so `uv = (0, 0)` is the corner
//! of the first texel, not its center.
//!
//! Malformed data (zero size, short buffer) never fails: the source degrades
//! to a single constant texel and logs a warning.

use std::f64::consts::PI;
use std::sync::Arc;

use glam::{DVec2, DVec3};
use tracing::warn;

use crate::tree::{Shape, SurfacePoint};

/// Interpolation between texels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Filter {
  #[default]
  Bilinear,
  /// Catmull-Rom over a 4x4 neighborhood.
  Bicubic,
}

/// Behavior outside `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Addressing {
  #[default]
  Wrap,
  Clamp,
}

#[derive(Clone, Debug)]
enum Texels {
  U8(Arc<[u8]>),
  U16(Arc<[u16]>),
  Constant(f32),
}

/// Sampled 2D data shared read-only between jobs.
#[derive(Clone, Debug)]
pub struct HeightSource {
  texels: Texels,
  width: usize,
  height: usize,
  /// Scale applied to normalized samples.
  pub range: f32,
  pub filter: Filter,
  pub addressing: Addressing,
}

impl HeightSource {
  /// 8-bit data, row-major, `width * height` texels.
  pub fn from_u8(data: impl Into<Arc<[u8]>>, width: usize, height: usize, range: f32) -> Self {
    let data = data.into();
    if !has_texels(data.len(), width, height) {
      warn!(len = data.len(), width, height, "Malformed 8-bit height data, using flat default");
      return Self::constant(0.0, range);
    }
    Self {
      texels: Texels::U8(data),
      width,
      height,
      range,
      filter: Filter::default(),
      addressing: Addressing::default(),
    }
  }

  /// 16-bit data, row-major, `width * height` texels.
  pub fn from_u16(data: impl Into<Arc<[u16]>>, width: usize, height: usize, range: f32) -> Self {
    let data = data.into();
    if !has_texels(data.len(), width, height) {
      warn!(len = data.len(), width, height, "Malformed 16-bit height data, using flat default");
      return Self::constant(0.0, range);
    }
    Self {
      texels: Texels::U16(data),
      width,
      height,
      range,
      filter: Filter::default(),
      addressing: Addressing::default(),
    }
  }

  /// A single texel holding `value` (normalized).
  pub fn constant(value: f32, range: f32) -> Self {
    Self {
      texels: Texels::Constant(value.clamp(0.0, 1.0)),
      width: 1,
      height: 1,
      range,
      filter: Filter::default(),
      addressing: Addressing::default(),
    }
  }

  /// Zero everywhere.
  pub fn flat() -> Self {
    Self::constant(0.0, 0.0)
  }

  pub fn with_filter(mut self, filter: Filter) -> Self {
    self.filter = filter;
    self
  }

  pub fn with_addressing(mut self, addressing: Addressing) -> Self {
    self.addressing = addressing;
    self
  }

  #[inline]
  pub fn size(&self) -> (usize, usize) {
    (self.width, self.height)
  }

  /// Sample scaled by `range`.
  #[inline]
  pub fn sample(&self, uv: DVec2) -> f32 {
    self.sample_normalized(uv) * self.range
  }

  /// Sample in `[0, 1]`.
  pub fn sample_normalized(&self, uv: DVec2) -> f32 {
    if let Texels::Constant(value) = self.texels {
      return value;
    }
    let x = fold(uv.x * self.width as f64 - 0.5, self.width, self.addressing);
    let y = fold(uv.y * self.height as f64 - 0.5, self.height, self.addressing);
    let value = match self.filter {
      Filter::Bilinear => self.bilinear(x, y),
      Filter::Bicubic => self.bicubic(x, y),
    };
    value.clamp(0.0, 1.0)
  }

  fn bilinear(&self, x: f64, y: f64) -> f32 {
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = ((x - x0) as f32, (y - y0) as f32);
    let (x0, y0) = (x0 as i64, y0 as i64);

    let top = lerp(self.texel(x0, y0), self.texel(x0 + 1, y0), fx);
    let bottom = lerp(self.texel(x0, y0 + 1), self.texel(x0 + 1, y0 + 1), fx);
    lerp(top, bottom, fy)
  }

  fn bicubic(&self, x: f64, y: f64) -> f32 {
    let (x0, y0) = (x.floor(), y.floor());
    let wx = catmull_rom_weights((x - x0) as f32);
    let wy = catmull_rom_weights((y - y0) as f32);
    let (x0, y0) = (x0 as i64, y0 as i64);

    let mut sum = 0.0;
    for (row, weight_y) in wy.iter().enumerate() {
      let ty = y0 - 1 + row as i64;
      let mut row_sum = 0.0;
      for (col, weight_x) in wx.iter().enumerate() {
        row_sum += weight_x * self.texel(x0 - 1 + col as i64, ty);
      }
      sum += weight_y * row_sum;
    }
    sum
  }

  /// Normalized texel value at integer coordinates (addressing applied).
  fn texel(&self, x: i64, y: i64) -> f32 {
    let x = address(x, self.width, self.addressing);
    let y = address(y, self.height, self.addressing);
    let index = y * self.width + x;
    match &self.texels {
      Texels::U8(data) => data[index] as f32 / u8::MAX as f32,
      Texels::U16(data) => data[index] as f32 / u16::MAX as f32,
      Texels::Constant(value) => *value,
    }
  }
}

impl Default for HeightSource {
  fn default() -> Self {
    Self::flat()
  }
}

#[inline]
fn has_texels(len: usize, width: usize, height: usize) -> bool {
  width > 0 && height > 0 && width.checked_mul(height).is_some_and(|n| len >= n)
}

/// Bring a texel coordinate into `[-1, size]` so integer neighbors cannot overflow.
#[inline]
fn fold(coord: f64, size: usize, addressing: Addressing) -> f64 {
  if !coord.is_finite() {
    return 0.0;
  }
  let size = size as f64;
  match addressing {
    Addressing::Wrap => coord.rem_euclid(size),
    Addressing::Clamp => coord.clamp(-1.0, size),
  }
}

#[inline]
fn address(coord: i64, size: usize, addressing: Addressing) -> usize {
  let size = size as i64;
  match addressing {
    Addressing::Wrap => coord.rem_euclid(size) as usize,
    Addressing::Clamp => coord.clamp(0, size - 1) as usize,
  }
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
  a + (b - a) * t
}

fn catmull_rom_weights(t: f32) -> [f32; 4] {
  let t2 = t * t;
  let t3 = t2 * t;
  [
    0.5 * (-t3 + 2.0 * t2 - t),
    0.5 * (3.0 * t3 - 5.0 * t2 + 2.0),
    0.5 * (-3.0 * t3 + 4.0 * t2 + t),
    0.5 * (t3 - t2),
  ]
}

// =============================================================================
// Projections
// =============================================================================

/// How surface points map to texture coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
  /// Longitude/latitude over the unit direction (spheres).
  Equirectangular,
  /// XZ coordinates over a square of side `size` (planes).
  Planar { size: f64 },
}

impl Projection {
  pub fn for_shape(shape: &Shape) -> Self {
    match *shape {
      Shape::Sphere { .. } => Projection::Equirectangular,
      Shape::Plane { size } => Projection::Planar { size },
    }
  }

  #[inline]
  pub fn uv(&self, point: &SurfacePoint) -> DVec2 {
    match *self {
      Projection::Equirectangular => equirectangular_uv(point.direction),
      Projection::Planar { size } => planar_uv(point.base, size),
    }
  }
}

/// Longitude to u, latitude to v (north pole at v = 0).
#[inline]
pub fn equirectangular_uv(direction: DVec3) -> DVec2 {
  let u = 0.5 + direction.z.atan2(direction.x) / (2.0 * PI);
  let v = 0.5 - direction.y.clamp(-1.0, 1.0).asin() / PI;
  DVec2::new(u, v)
}

/// Top-down XZ mapping over a square centered at the origin.
#[inline]
pub fn planar_uv(point: DVec3, size: f64) -> DVec2 {
  DVec2::new(point.x / size + 0.5, point.z / size + 0.5)
}

/// Top-down mapping of a unit direction, free of the equirectangular pole
/// pinch. Used near the poles.
#[inline]
pub fn polar_uv(direction: DVec3) -> DVec2 {
  DVec2::new(direction.x * 0.5 + 0.5, direction.z * 0.5 + 0.5)
}

#[cfg(test)]
#[path = "heightmap_test.rs"]
mod heightmap_test;
