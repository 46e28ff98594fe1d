//! Baking sampled lattices into fixed-size atlas slices.
//!
//! The bake itself is an injected capability ([`Baker`]). Renderers supply
//! their own GPU implementation; [`LatticeBaker`] is the CPU reference used
//! by tests, benches and headless tools.
//!
//! # Slice layout
//!
//! A slice is `ATLAS_RESOLUTION²` pixels. Pixel `(x, y)` maps to
//! `s = (x + 0.5) / N`, `t = (y + 0.5) / N`; the upper-right half folds back
//! onto the triangle (`s + t > 1` becomes `(1 - s, 1 - t)`). Barycentric
//! weights over `(A, B, C)` are then `(1 - s - t, s, t)`.

use glam::DVec3;
use smallvec::SmallVec;

use super::buffers::SampleBuffers;
use super::features::FeatureTableEntry;
use super::lattice::tangent_neighbors;
use crate::constants::{
  lattice_coord, lattice_index, ATLAS_PIXELS, ATLAS_RESOLUTION, LATTICE_RESOLUTION, LATTICE_VERTICES,
  MAX_GLOBAL_FEATURES,
};
use crate::tree::Triangle;

/// Feature records for one triangle.
#[derive(Clone, Debug, Default)]
pub struct FeatureTables {
  pub global: SmallVec<[FeatureTableEntry; MAX_GLOBAL_FEATURES]>,
  pub local: Vec<FeatureTableEntry>,
}

/// Baked data of one triangle, one entry per slice pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct BakedSurface {
  /// xyz relative to the visual origin, w = height.
  pub position: Vec<[f32; 4]>,
  pub albedo: Vec<[u8; 4]>,
  /// xyz unit normal, w = biome channel 0 weight.
  pub normal: Vec<[f32; 4]>,
}

impl BakedSurface {
  pub fn new() -> Self {
    Self {
      position: vec![[0.0; 4]; ATLAS_PIXELS],
      albedo: vec![[0; 4]; ATLAS_PIXELS],
      normal: vec![[0.0; 4]; ATLAS_PIXELS],
    }
  }

  /// Zero every pixel, keeping the allocation.
  pub fn clear(&mut self) {
    self.position.fill([0.0; 4]);
    self.albedo.fill([0; 4]);
    self.normal.fill([0.0; 4]);
  }
}

impl Default for BakedSurface {
  fn default() -> Self {
    Self::new()
  }
}

/// Everything a baker may read.
pub struct BakeRequest<'a> {
  pub triangle: &'a Triangle,
  pub samples: &'a SampleBuffers,
  pub tables: &'a FeatureTables,
  /// Positions are written relative to this point.
  pub origin: DVec3,
}

/// Bake capability: `(triangle, samples, tables) -> atlas slice`.
pub trait Baker: Send + Sync {
  fn bake(&self, request: &BakeRequest<'_>, out: &mut BakedSurface);
}

/// Displaced positions of the triangle's corners `[A, B, C]`.
pub fn displaced_corners(samples: &SampleBuffers) -> [DVec3; 3] {
  let r = LATTICE_RESOLUTION;
  [
    samples.positions[lattice_index(0, r, 0)],
    samples.positions[lattice_index(0, 0, r)],
    samples.positions[lattice_index(1, r, 0)],
  ]
}

/// Origin a visual's instance data is expressed against.
#[inline]
pub fn visual_origin(corners: &[DVec3; 3]) -> DVec3 {
  (corners[0] + corners[1] + corners[2]) / 3.0
}

/// CPU reference baker: interpolates lattice samples per pixel.
#[derive(Clone, Copy, Debug, Default)]
pub struct LatticeBaker;

impl Baker for LatticeBaker {
  fn bake(&self, request: &BakeRequest<'_>, out: &mut BakedSurface) {
    let samples = request.samples;
    if samples.len() < LATTICE_VERTICES {
      out.clear();
      return;
    }

    let normals = vertex_normals(samples);
    let n = ATLAS_RESOLUTION as f64;

    for y in 0..ATLAS_RESOLUTION {
      for x in 0..ATLAS_RESOLUTION {
        let mut s = (x as f64 + 0.5) / n;
        let mut t = (y as f64 + 0.5) / n;
        if s + t > 1.0 {
          s = 1.0 - s;
          t = 1.0 - t;
        }
        let stencil = pixel_stencil(1.0 - s - t, s, t);

        let mut position = DVec3::ZERO;
        let mut normal = DVec3::ZERO;
        let mut height = 0.0f32;
        let mut color = [0.0f32; 4];
        let mut biome = 0.0f32;
        for &(index, weight) in &stencil {
          let w32 = weight as f32;
          position += samples.positions[index] * weight;
          normal += normals[index] * weight;
          height += samples.heights[index] * w32;
          biome += samples.weights[index][0] * w32;
          for (channel, value) in color.iter_mut().zip(samples.colors[index]) {
            *channel += value * w32;
          }
        }

        let pixel = y * ATLAS_RESOLUTION + x;
        let local = (position - request.origin).as_vec3();
        out.position[pixel] = [local.x, local.y, local.z, height];
        out.albedo[pixel] = color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        let normal = normal.normalize_or(DVec3::Y).as_vec3();
        out.normal[pixel] = [normal.x, normal.y, normal.z, biome];
      }
    }
  }
}

/// Unit normal at every lattice vertex, oriented along the sample direction.
fn vertex_normals(samples: &SampleBuffers) -> [DVec3; LATTICE_VERTICES] {
  let mut normals = [DVec3::Y; LATTICE_VERTICES];
  for (index, normal) in normals.iter_mut().enumerate() {
    let (half, i, j) = lattice_coord(index);
    let (first, second, sign) = tangent_neighbors(half, i, j);
    let p = samples.positions[index];
    let direction = samples.directions[index];
    let n = (samples.positions[first] - p).cross(samples.positions[second] - p) * sign;
    let n = n.normalize_or(direction);
    *normal = if n.dot(direction) < 0.0 { -n } else { n };
  }
  normals
}

/// Lattice vertices and weights covering barycentric point `(wa, wb, wc)`.
fn pixel_stencil(wa: f64, wb: f64, wc: f64) -> [(usize, f64); 3] {
  // Half 0 (M, A, B) holds points nearer B, half 1 (M, C, A) nearer C
  let (half, u, v) = if wb >= wc {
    (0, wa, 1.0 - wa - 2.0 * wc)
  } else {
    (1, 1.0 - wa - 2.0 * wb, wa)
  };

  let r = LATTICE_RESOLUTION;
  let rf = r as f64;
  let x = (u * rf).clamp(0.0, rf);
  let y = (v * rf).clamp(0.0, rf - x);
  let i0 = (x.floor() as usize).min(r - 1);
  let j0 = (y.floor() as usize).min(r - 1 - i0);
  let fx = x - i0 as f64;
  let fy = y - j0 as f64;

  if fx + fy <= 1.0 || i0 + j0 + 2 > r {
    [
      (lattice_index(half, i0, j0), 1.0 - fx - fy),
      (lattice_index(half, i0 + 1, j0), fx),
      (lattice_index(half, i0, j0 + 1), fy),
    ]
  } else {
    [
      (lattice_index(half, i0 + 1, j0 + 1), fx + fy - 1.0),
      (lattice_index(half, i0, j0 + 1), 1.0 - fx),
      (lattice_index(half, i0 + 1, j0), 1.0 - fy),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sampling::features::FeatureSet;
  use crate::sampling::heightmap::HeightSource;
  use crate::sampling::pipeline::FeaturePipeline;
  use crate::tree::{Shape, Topology};

  fn bake_seed(shape: Shape, height: HeightSource) -> (Triangle, SampleBuffers, BakedSurface) {
    let tri = Topology::new(shape).unwrap().seeds()[0];
    let pipeline = FeaturePipeline::new(shape, FeatureSet::new(height));
    let mut samples = SampleBuffers::default();
    pipeline.sample_triangle(&tri, &mut samples);

    let tables = pipeline.feature_tables(&tri);
    let origin = visual_origin(&displaced_corners(&samples));
    let mut out = BakedSurface::new();
    LatticeBaker.bake(
      &BakeRequest {
        triangle: &tri,
        samples: &samples,
        tables: &tables,
        origin,
      },
      &mut out,
    );
    (tri, samples, out)
  }

  #[test]
  fn test_flat_plane_bake() {
    let (_, _, out) = bake_seed(Shape::Plane { size: 8.0 }, HeightSource::flat());

    assert_eq!(out.position.len(), ATLAS_PIXELS);
    for pixel in 0..ATLAS_PIXELS {
      assert_eq!(out.albedo[pixel], [255, 255, 255, 255]);
      assert!(out.position[pixel][1].abs() < 1e-6);
      assert!((out.normal[pixel][1] - 1.0).abs() < 1e-6, "Normal {:?}", out.normal[pixel]);
    }
  }

  #[test]
  fn test_displaced_corners_on_flat_plane() {
    let (tri, samples, _) = bake_seed(Shape::Plane { size: 8.0 }, HeightSource::flat());
    let corners = displaced_corners(&samples);
    for (baked, original) in corners.iter().zip(tri.corners) {
      assert!(baked.distance(original) < 1e-12);
    }
  }

  #[test]
  fn test_height_lands_in_position_w() {
    let (_, _, out) = bake_seed(Shape::Sphere { radius: 10.0 }, HeightSource::constant(1.0, 2.0));
    assert!(out.position.iter().all(|p| (p[3] - 2.0).abs() < 1e-5));
  }

  #[test]
  fn test_stencil_weights_sum_to_one() {
    for (wa, wb, wc) in [(1.0, 0.0, 0.0), (0.2, 0.5, 0.3), (0.0, 0.5, 0.5), (0.33, 0.01, 0.66)] {
      let sum: f64 = pixel_stencil(wa, wb, wc).iter().map(|(_, w)| w).sum();
      assert!((sum - 1.0).abs() < 1e-12);
      assert!(pixel_stencil(wa, wb, wc).iter().all(|(_, w)| *w >= -1e-12));
    }
  }

  #[test]
  fn test_stencil_hits_corner_vertex() {
    let stencil = pixel_stencil(1.0, 0.0, 0.0);
    let hit = stencil.iter().find(|(_, w)| (*w - 1.0).abs() < 1e-12).unwrap();
    assert_eq!(hit.0, lattice_index(0, LATTICE_RESOLUTION, 0));
  }
}
