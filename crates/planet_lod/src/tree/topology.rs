//! Topology - the base shape and its fixed set of seed triangles.
//!
//! # Sphere
//!
//! An octahedron of eight right-isosceles faces. Each face has its apex `A`
//! on a pole and its `B-C` edge on the equator, so the four upper faces
//! pair with the four lower ones across the equator:
//!
//! ```text
//!              +Y (A of upper faces)
//!             / | \
//!       -X --+--+--+-- +X    ring: +X, +Z, -X, -Z
//!             \ | /
//!              -Y (A of lower faces)
//! ```
//!
//! # Plane
//!
//! A square in the XZ plane cut along its diagonal into two triangles that
//! share the diagonal as their `B-C` edge.
//!
//! Seeds are laid out in undeformed space. [`Shape::surface`] maps any
//! undeformed point onto the base surface.

use glam::DVec3;
use serde::Deserialize;

use super::triangle::Triangle;
use crate::error::{Result, TerrainError};

/// Base shape of a terrain.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
  /// Sphere centered at the origin.
  Sphere { radius: f64 },
  /// Square of side `size` centered at the origin, facing +Y.
  Plane { size: f64 },
}

/// A point mapped onto the base surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfacePoint {
  /// Unit outward direction (heights displace along it).
  pub direction: DVec3,
  /// Point on the undisplaced surface.
  pub base: DVec3,
}

impl Shape {
  /// Characteristic size: radius for spheres, side length for planes.
  pub fn extent(&self) -> f64 {
    match *self {
      Shape::Sphere { radius } => radius,
      Shape::Plane { size } => size,
    }
  }

  /// Map an undeformed point onto the base surface.
  #[inline]
  pub fn surface(&self, p: DVec3) -> SurfacePoint {
    match *self {
      Shape::Sphere { radius } => {
        let direction = p.normalize_or(DVec3::Y);
        SurfacePoint {
          direction,
          base: direction * radius,
        }
      }
      Shape::Plane { .. } => SurfacePoint {
        direction: DVec3::Y,
        base: DVec3::new(p.x, 0.0, p.z),
      },
    }
  }

  /// Seed triangles at depth 0.
  pub fn seed_triangles(&self) -> Vec<Triangle> {
    match *self {
      Shape::Sphere { radius } => sphere_seeds(radius),
      Shape::Plane { size } => plane_seeds(size),
    }
  }
}

fn sphere_seeds(radius: f64) -> Vec<Triangle> {
  let top = DVec3::Y * radius;
  let bottom = -DVec3::Y * radius;
  let ring = [DVec3::X, DVec3::Z, -DVec3::X, -DVec3::Z].map(|axis| axis * radius);

  let mut seeds = Vec::with_capacity(8);
  for k in 0..4 {
    let (here, next) = (ring[k], ring[(k + 1) % 4]);
    // Outward-facing counter-clockwise winding
    seeds.push(Triangle::new(top, next, here, 0));
    seeds.push(Triangle::new(bottom, here, next, 0));
  }
  seeds
}

fn plane_seeds(size: f64) -> Vec<Triangle> {
  let h = size * 0.5;
  let p00 = DVec3::new(-h, 0.0, -h);
  let p10 = DVec3::new(h, 0.0, -h);
  let p11 = DVec3::new(h, 0.0, h);
  let p01 = DVec3::new(-h, 0.0, h);

  vec![Triangle::new(p10, p00, p11, 0), Triangle::new(p01, p11, p00, 0)]
}

/// Fixed seed set for one shape.
#[derive(Clone, Debug)]
pub struct Topology {
  shape: Shape,
  seeds: Vec<Triangle>,
}

impl Topology {
  pub fn new(shape: Shape) -> Result<Self> {
    let seeds = shape.seed_triangles();
    if seeds.is_empty() {
      return Err(TerrainError::EmptyTopology);
    }
    Ok(Self { shape, seeds })
  }

  #[inline]
  pub fn shape(&self) -> Shape {
    self.shape
  }

  #[inline]
  pub fn seeds(&self) -> &[Triangle] {
    &self.seeds
  }

  /// Longest edge among the seeds.
  pub fn seed_edge_length(&self) -> f64 {
    self
      .seeds
      .iter()
      .map(Triangle::longest_edge)
      .fold(0.0, f64::max)
  }
}

#[cfg(test)]
#[path = "topology_test.rs"]
mod topology_test;
