//! Split decision: apparent angular size against `1 / detail`.
//!
//! The triangle's centroid is projected onto the base surface and a bounding
//! radius is taken from the projected corners. A triangle is "too large"
//! when `radius / distance > 1 / detail` for any observer, evaluated as
//! `radius² · detail² > distance²` to stay free of square roots.

use glam::DVec3;

use super::topology::Shape;
use super::triangle::Triangle;

/// Precomputed split criterion for one recompute.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SplitMetric {
  pub shape: Shape,
  detail_sq: f64,
  /// Deepest level regular splits may reach.
  pub max_depth: u32,
}

impl SplitMetric {
  pub fn new(shape: Shape, detail: f64, max_depth: u32) -> Self {
    Self {
      shape,
      detail_sq: detail * detail,
      max_depth,
    }
  }

  /// Projected center and bounding radius of a triangle on the base surface.
  pub fn surface_bounds(&self, tri: &Triangle) -> (DVec3, f64) {
    let center = self.shape.surface(tri.centroid()).base;
    let radius_sq = tri
      .corners
      .iter()
      .map(|&corner| self.shape.surface(corner).base.distance_squared(center))
      .fold(0.0, f64::max);
    (center, radius_sq.sqrt())
  }

  /// True when any observer sees the triangle larger than allowed.
  pub fn is_too_large(&self, tri: &Triangle, observers: &[DVec3]) -> bool {
    let (center, radius) = self.surface_bounds(tri);
    let lhs = radius * radius * self.detail_sq;
    observers
      .iter()
      .any(|observer| lhs > observer.distance_squared(center))
  }

  /// True when a regular (non-fixer) split is wanted.
  #[inline]
  pub fn wants_split(&self, tri: &Triangle, observers: &[DVec3]) -> bool {
    tri.depth < self.max_depth && self.is_too_large(tri, observers)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn plane_triangle() -> Triangle {
    Triangle::new(
      DVec3::new(0.0, 0.0, 1.0),
      DVec3::new(-1.0, 0.0, 0.0),
      DVec3::new(1.0, 0.0, 0.0),
      0,
    )
  }

  #[test]
  fn test_near_observer_splits_far_does_not() {
    let metric = SplitMetric::new(Shape::Plane { size: 4.0 }, 4.0, 10);
    let tri = plane_triangle();

    assert!(metric.is_too_large(&tri, &[DVec3::new(0.0, 1.0, 0.3)]));
    assert!(!metric.is_too_large(&tri, &[DVec3::new(0.0, 100.0, 0.0)]));
  }

  #[test]
  fn test_any_observer_suffices() {
    let metric = SplitMetric::new(Shape::Plane { size: 4.0 }, 4.0, 10);
    let tri = plane_triangle();
    let observers = [DVec3::new(0.0, 100.0, 0.0), DVec3::new(0.0, 0.5, 0.3)];
    assert!(metric.is_too_large(&tri, &observers));
  }

  #[test]
  fn test_no_observers_never_split() {
    let metric = SplitMetric::new(Shape::Plane { size: 4.0 }, 4.0, 10);
    assert!(!metric.wants_split(&plane_triangle(), &[]));
  }

  #[test]
  fn test_max_depth_blocks_regular_split() {
    let metric = SplitMetric::new(Shape::Plane { size: 4.0 }, 4.0, 0);
    let near = [DVec3::new(0.0, 0.1, 0.3)];
    let tri = plane_triangle();
    assert!(metric.is_too_large(&tri, &near));
    assert!(!metric.wants_split(&tri, &near));
  }

  #[test]
  fn test_higher_detail_splits_further_out() {
    let tri = plane_triangle();
    let observer = [DVec3::new(0.0, 10.0, 0.0)];
    let coarse = SplitMetric::new(Shape::Plane { size: 4.0 }, 2.0, 10);
    let fine = SplitMetric::new(Shape::Plane { size: 4.0 }, 20.0, 10);
    assert!(!coarse.is_too_large(&tri, &observer));
    assert!(fine.is_too_large(&tri, &observer));
  }
}
