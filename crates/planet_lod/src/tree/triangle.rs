//! Triangle - one node of the bisection tree.
//!
//! ```text
//!            A
//!           /|\
//!          / | \
//!   child0/  |  \child1
//!        /   |   \
//!       B----M----C      M = mid(B, C), the pivot
//! ```
//!
//! Splitting bisects edge B-C at its midpoint. Children are `(M, A, B)` and
//! `(M, C, A)`, so each child's own B-C edge is one of the parent's legs.

use glam::DVec3;

use super::identity::TriangleId;

/// A node of the LOD tree.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangle {
  /// Corners `[A, B, C]` in topology-local space (undeformed).
  pub corners: [DVec3; 3],
  /// Number of bisections from the seed triangle.
  pub depth: u32,
  /// True when the triangle has children in its generation.
  pub split: bool,
  /// True when created by the crack-fixing pass rather than by LOD demand.
  pub fixer: bool,
  /// Identity derived from the corners.
  pub id: TriangleId,
}

impl Triangle {
  pub fn new(a: DVec3, b: DVec3, c: DVec3, depth: u32) -> Self {
    Self {
      corners: [a, b, c],
      depth,
      split: false,
      fixer: false,
      id: TriangleId::from_corners(a, b, c),
    }
  }

  #[inline]
  pub fn a(&self) -> DVec3 {
    self.corners[0]
  }

  #[inline]
  pub fn b(&self) -> DVec3 {
    self.corners[1]
  }

  #[inline]
  pub fn c(&self) -> DVec3 {
    self.corners[2]
  }

  #[inline]
  pub fn is_leaf(&self) -> bool {
    !self.split
  }

  /// Midpoint of B-C, where a split inserts its new vertex.
  #[inline]
  pub fn pivot(&self) -> DVec3 {
    midpoint(self.b(), self.c())
  }

  /// The two children a split produces, one level deeper.
  pub fn children(&self) -> [Triangle; 2] {
    let m = self.pivot();
    let depth = self.depth + 1;
    [
      Triangle::new(m, self.a(), self.b(), depth),
      Triangle::new(m, self.c(), self.a(), depth),
    ]
  }

  /// Midpoints of edges A-B, B-C and C-A, in that order.
  pub fn edge_midpoints(&self) -> [DVec3; 3] {
    let [a, b, c] = self.corners;
    [midpoint(a, b), midpoint(b, c), midpoint(c, a)]
  }

  #[inline]
  pub fn centroid(&self) -> DVec3 {
    (self.a() + self.b() + self.c()) / 3.0
  }

  /// Length of the longest edge.
  pub fn longest_edge(&self) -> f64 {
    let [a, b, c] = self.corners;
    a.distance(b).max(b.distance(c)).max(c.distance(a))
  }
}

/// Exact midpoint, symmetric in its arguments.
///
/// Float addition is commutative, so `midpoint(p, q)` and `midpoint(q, p)`
/// are bit-identical. Crack detection depends on that.
#[inline]
pub fn midpoint(p: DVec3, q: DVec3) -> DVec3 {
  (p + q) * 0.5
}
