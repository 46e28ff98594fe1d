//! Barycentric sample lattice of one triangle.
//!
//! See [`crate::constants`] for the layout. The two halves share the edge
//! `M-A`; vertices on it are computed with the same expression in both
//! halves so they are bit-identical.

use glam::DVec3;

use crate::constants::{lattice_index, LATTICE_RESOLUTION, LATTICE_VERTICES};
use crate::tree::Triangle;

/// Corners `(P0, P1, P2)` of a lattice half.
///
/// Half 0 is `(M, A, B)` and half 1 is `(M, C, A)`, the footprints of the
/// triangle's two children.
#[inline]
pub fn half_corners(tri: &Triangle, half: usize) -> [DVec3; 3] {
  let m = tri.pivot();
  if half == 0 {
    [m, tri.a(), tri.b()]
  } else {
    [m, tri.c(), tri.a()]
  }
}

/// Undeformed position of vertex `(i, j)` in a half.
#[inline]
pub fn lattice_point(corners: &[DVec3; 3], i: usize, j: usize) -> DVec3 {
  let r = LATTICE_RESOLUTION as f64;
  let [p0, p1, p2] = *corners;
  p0 + (p1 - p0) * (i as f64 / r) + (p2 - p0) * (j as f64 / r)
}

/// Fill `out` with every lattice point in index order.
pub fn fill_lattice(tri: &Triangle, out: &mut Vec<DVec3>) {
  out.clear();
  out.reserve(LATTICE_VERTICES);
  for half in 0..2 {
    let corners = half_corners(tri, half);
    for i in 0..=LATTICE_RESOLUTION {
      for j in 0..=(LATTICE_RESOLUTION - i) {
        debug_assert_eq!(out.len(), lattice_index(half, i, j));
        out.push(lattice_point(&corners, i, j));
      }
    }
  }
}

/// Two grid neighbors spanning a micro-triangle at `(half, i, j)`.
///
/// Returns `(first, second, sign)` such that
/// `sign * (first - p).cross(second - p)` has the winding of the half.
pub fn tangent_neighbors(half: usize, i: usize, j: usize) -> (usize, usize, f64) {
  let r = LATTICE_RESOLUTION;
  if i + j < r {
    (lattice_index(half, i + 1, j), lattice_index(half, i, j + 1), 1.0)
  } else if i > 0 {
    // Far edge: the micro-triangle behind the vertex
    (lattice_index(half, i - 1, j), lattice_index(half, i - 1, j + 1), -1.0)
  } else {
    (lattice_index(half, 0, r - 1), lattice_index(half, 1, r - 1), 1.0)
  }
}

#[cfg(test)]
#[path = "lattice_test.rs"]
mod lattice_test;
