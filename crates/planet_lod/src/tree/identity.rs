//! TriangleId - winding-independent identity of a triangle.
//!
//! Corners are sorted lexicographically (x, then y, then z) before hashing,
//! so every permutation of the same three points yields the same id. Ids
//! survive across generations, which is what lets the diff engine match a
//! triangle in the old tree with the same triangle in the new one.

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use glam::DVec3;

/// Canonical 64-bit triangle identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct TriangleId(u64);

impl TriangleId {
  /// Identity of the triangle spanned by three corners, in any order.
  pub fn from_corners(a: DVec3, b: DVec3, c: DVec3) -> Self {
    let mut corners = [PointKey::new(a), PointKey::new(b), PointKey::new(c)];
    corners.sort_unstable();

    let mut hasher = DefaultHasher::new();
    corners.hash(&mut hasher);
    Self(hasher.finish())
  }

  /// Wrap a raw value (for FFI round-trips).
  pub fn from_raw(raw: u64) -> Self {
    Self(raw)
  }

  /// Get the raw id value.
  pub fn raw(&self) -> u64 {
    self.0
  }
}

/// Exact, hashable key of a point.
///
/// Built from the IEEE bit patterns with `-0.0` folded onto `0.0`. Ordering
/// is lexicographic on x, then y, then z using the numeric total order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct PointKey([u64; 3]);

impl PointKey {
  pub fn new(p: DVec3) -> Self {
    Self([canonical_bits(p.x), canonical_bits(p.y), canonical_bits(p.z)])
  }

  /// Coordinates back as a vector.
  pub fn to_vec(&self) -> DVec3 {
    DVec3::new(
      f64::from_bits(self.0[0]),
      f64::from_bits(self.0[1]),
      f64::from_bits(self.0[2]),
    )
  }
}

impl Ord for PointKey {
  fn cmp(&self, other: &Self) -> Ordering {
    for axis in 0..3 {
      let lhs = f64::from_bits(self.0[axis]);
      let rhs = f64::from_bits(other.0[axis]);
      match lhs.total_cmp(&rhs) {
        Ordering::Equal => continue,
        unequal => return unequal,
      }
    }
    Ordering::Equal
  }
}

impl PartialOrd for PointKey {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

#[inline]
fn canonical_bits(v: f64) -> u64 {
  // -0.0 + 0.0 == +0.0
  (v + 0.0).to_bits()
}

#[cfg(test)]
#[path = "identity_test.rs"]
mod identity_test;
