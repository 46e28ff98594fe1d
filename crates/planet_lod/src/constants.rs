//! Fixed resolutions and capacities shared by sampling, baking and batching.
//!
//! # Sample Lattice Layout
//!
//! Every triangle is sampled on two barycentric grids, one per half of the
//! triangle. The halves are fanned around the split pivot `M = mid(B, C)`,
//! which makes each half the exact footprint of the child the triangle would
//! produce when split:
//!
//! ```text
//!                 A
//!                / \
//!               /   \
//!              / h0 | \
//!             /  h1 |  \        h0 = (M, A, B)
//!            /      |   \       h1 = (M, C, A)
//!           B ------M---- C
//! ```
//!
//! Within one half with corners `(P0, P1, P2)` the vertex `(i, j)` with
//! `i + j <= LATTICE_RESOLUTION` sits at
//!
//! ```text
//! P0 + (P1 - P0) * i / R + (P2 - P0) * j / R        R = LATTICE_RESOLUTION
//! ```
//!
//! Rows are stored by `i`, row `i` holding `R + 1 - i` vertices:
//!
//! ```text
//! index = half * HALF_LATTICE_VERTICES + row_offset(i) + j
//! row_offset(i) = i * (R + 1) - i * (i - 1) / 2
//! ```

/// Grid subdivisions per edge of one lattice half.
pub const LATTICE_RESOLUTION: usize = 8;

/// Vertices in one half: (R + 1)(R + 2) / 2.
pub const HALF_LATTICE_VERTICES: usize = (LATTICE_RESOLUTION + 1) * (LATTICE_RESOLUTION + 2) / 2;

/// Vertices sampled per triangle (both halves).
pub const LATTICE_VERTICES: usize = HALF_LATTICE_VERTICES * 2;

/// Side length in pixels of one baked atlas slice.
pub const ATLAS_RESOLUTION: usize = 32;

/// Pixels per atlas slice.
pub const ATLAS_PIXELS: usize = ATLAS_RESOLUTION * ATLAS_RESOLUTION;

/// Slices held by one storage page.
pub const STORAGE_PAGE_SLICES: usize = 64;

/// Visual slots per render batch.
pub const BATCH_CAPACITY: usize = 35;

/// Global feature entries passed to the baker.
pub const MAX_GLOBAL_FEATURES: usize = 8;

/// Local feature entries passed to the baker.
pub const MAX_LOCAL_FEATURES: usize = 32;

/// Times a triangle is sampled before a failing job is given up on.
pub const MAX_SAMPLE_ATTEMPTS: u32 = 3;

/// Start of row `i` inside one lattice half.
#[inline(always)]
pub const fn row_offset(i: usize) -> usize {
  // i * (R + 1) - i * (i - 1) / 2, written to stay unsigned at i = 0
  i * (LATTICE_RESOLUTION + 1) - (i * i.saturating_sub(1)) / 2
}

/// Linear lattice index for vertex `(i, j)` of `half`.
#[inline(always)]
pub const fn lattice_index(half: usize, i: usize, j: usize) -> usize {
  half * HALF_LATTICE_VERTICES + row_offset(i) + j
}

/// Inverse of [`lattice_index`].
pub fn lattice_coord(index: usize) -> (usize, usize, usize) {
  let half = index / HALF_LATTICE_VERTICES;
  let local = index % HALF_LATTICE_VERTICES;

  let mut i = 0;
  while i < LATTICE_RESOLUTION && row_offset(i + 1) <= local {
    i += 1;
  }
  (half, i, local - row_offset(i))
}

#[cfg(test)]
#[path = "constants_test.rs"]
mod constants_test;
