//! DiffEngine - changes between two generations.
//!
//! - **creates**: in the new generation only
//! - **deletes**: in the old generation only
//! - **status**: in both, with a changed split flag
//!
//! Output order is deterministic: shallow triangles first, ties by id.

use super::generation::Generation;
use super::identity::TriangleId;
use super::triangle::Triangle;

/// A triangle kept across generations whose split flag flipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusDiff {
  pub id: TriangleId,
  /// New split flag: `true` means hide, `false` means show.
  pub split: bool,
}

/// Changes that turn one generation into the next.
#[derive(Clone, Debug, Default)]
pub struct GenerationDiff {
  pub creates: Vec<Triangle>,
  pub deletes: Vec<Triangle>,
  pub status: Vec<StatusDiff>,
}

impl GenerationDiff {
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.creates.is_empty() && self.deletes.is_empty() && self.status.is_empty()
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.creates.len() + self.deletes.len() + self.status.len()
  }
}

/// Diff `old` against `new`.
pub fn diff_generations(old: &Generation, new: &Generation) -> GenerationDiff {
  let mut diff = GenerationDiff::default();

  for tri in new.iter() {
    match old.get(&tri.id) {
      None => diff.creates.push(*tri),
      Some(before) if before.split != tri.split => diff.status.push(StatusDiff {
        id: tri.id,
        split: tri.split,
      }),
      Some(_) => {}
    }
  }
  diff.deletes.extend(old.iter().filter(|t| !new.contains(&t.id)).copied());

  diff.creates.sort_unstable_by_key(|t| (t.depth, t.id));
  diff.deletes.sort_unstable_by_key(|t| (t.depth, t.id));
  diff.status.sort_unstable_by_key(|s| s.id);
  diff
}

#[cfg(test)]
#[path = "diff_test.rs"]
mod diff_test;
