//! Generation recompute: split state machine plus crack fixing.
//!
//! A generation is the full set of triangles (internal nodes and leaves) for
//! one observer snapshot. Recomputing never mutates the previous generation;
//! it builds a fresh one from the seeds so the old snapshot stays valid for
//! the renderer until the diff is applied.
//!
//! # Phases
//!
//! 1. **Split walk** (breadth-first from the seeds). A triangle whose split
//!    metric wants a split is split when both children already exist in the
//!    previous generation (continuity), otherwise only while the budget's
//!    new-triangle allowance lasts.
//! 2. **Crack fixing.** The pivot `mid(B, C)` of every split triangle is
//!    collected. A leaf that has any edge midpoint (A-B, then B-C, then C-A)
//!    in that set would leave a T-junction, so it is force-split as a fixer.
//!    A leaf can only be bisected at its own pivot: when the crack sits on
//!    A-B or C-A, the child that inherits that edge as its B-C is caught by
//!    the next pass. Repeats until no leaf matches. Fixer splits ignore
//!    `max_depth`.
//! 3. **Step cap.** If the result creates more triangles than the budget
//!    allows, the walk is retried with a smaller allowance. When even a
//!    single split does not fit, the first one is taken anyway so a small
//!    cap slows refinement down but never stops it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use glam::DVec3;
use tracing::{debug, trace, warn};

use super::budget::{RecomputeBudget, RecomputeStats};
use super::diff::{diff_generations, GenerationDiff};
use super::identity::{PointKey, TriangleId};
use super::split::SplitMetric;
use super::topology::Topology;
use super::triangle::Triangle;

/// Every triangle of one tree snapshot, keyed by id.
#[derive(Clone, Debug, Default)]
pub struct Generation {
  triangles: HashMap<TriangleId, Triangle>,
}

impl Generation {
  pub fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.triangles.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.triangles.is_empty()
  }

  #[inline]
  pub fn get(&self, id: &TriangleId) -> Option<&Triangle> {
    self.triangles.get(id)
  }

  #[inline]
  pub fn contains(&self, id: &TriangleId) -> bool {
    self.triangles.contains_key(id)
  }

  pub fn iter(&self) -> impl Iterator<Item = &Triangle> {
    self.triangles.values()
  }

  pub fn leaves(&self) -> impl Iterator<Item = &Triangle> {
    self.triangles.values().filter(|t| t.is_leaf())
  }

  pub fn leaf_count(&self) -> usize {
    self.leaves().count()
  }

  /// Sorted leaf ids, handy for comparing generations.
  pub fn leaf_ids(&self) -> Vec<TriangleId> {
    let mut ids: Vec<_> = self.leaves().map(|t| t.id).collect();
    ids.sort_unstable();
    ids
  }

  pub fn max_depth(&self) -> u32 {
    self.triangles.values().map(|t| t.depth).max().unwrap_or(0)
  }

  fn insert(&mut self, tri: Triangle) {
    self.triangles.insert(tri.id, tri);
  }
}

impl FromIterator<Triangle> for Generation {
  fn from_iter<I: IntoIterator<Item = Triangle>>(iter: I) -> Self {
    let mut generation = Generation::new();
    for tri in iter {
      generation.insert(tri);
    }
    generation
  }
}

/// Input for one recompute.
#[derive(Clone)]
pub struct RecomputeInput {
  /// Observer positions in topology-local space, already lowered by the
  /// terrain height beneath them.
  pub observers: Vec<DVec3>,
  pub topology: Arc<Topology>,
  pub prev: Arc<Generation>,
  pub metric: SplitMetric,
  pub budget: RecomputeBudget,
}

/// Output from one recompute.
pub struct RecomputeOutput {
  pub generation: Arc<Generation>,
  /// Changes from `prev` to `generation`.
  pub diff: GenerationDiff,
  pub stats: RecomputeStats,
}

/// Build the next generation and diff it against the previous one.
pub fn recompute(input: &RecomputeInput) -> RecomputeOutput {
  let _span = tracing::info_span!("recompute", observers = input.observers.len()).entered();

  let limit = input.budget.is_limited().then_some(input.budget.max_new_triangles);
  let mut allowance = limit;
  let mut retries = 0;

  let (generation, mut stats) = loop {
    let (generation, stats) = build_generation(input, allowance, 0);
    let over = match (limit, allowance) {
      (Some(limit), Some(current)) if stats.new_triangles > limit && current > 0 => {
        Some((stats.new_triangles - limit, current))
      }
      _ => None,
    };
    match over {
      Some((overflow, current)) => {
        // Fixer cascades pushed us over; shrink the primary allowance
        allowance = Some(current.saturating_sub(overflow.max(2)));
        retries += 1;
      }
      None => break (generation, stats),
    }
  };
  stats.retries = retries;

  // One split plus its crack fixing can exceed a small cap on its own. An
  // attempt that creates nothing while splits are still wanted would repeat
  // forever, so the first wanted split goes through regardless of the cap.
  let (generation, stats) = if stats.new_triangles == 0 && stats.deferred_splits > 0 {
    let (generation, mut forced) = build_generation(input, Some(0), 1);
    forced.retries = retries + 1;
    debug!(
      limit = ?limit,
      new_triangles = forced.new_triangles,
      "Step cap smaller than one split, admitting it anyway"
    );
    (generation, forced)
  } else {
    (generation, stats)
  };

  let generation = Arc::new(generation);
  let diff = diff_generations(&input.prev, &generation);
  debug!(
    triangles = generation.len(),
    creates = diff.creates.len(),
    deletes = diff.deletes.len(),
    status = diff.status.len(),
    fixer_splits = stats.fixer_splits,
    deferred = stats.deferred_splits,
    retries,
    "Recompute finished"
  );

  RecomputeOutput {
    generation,
    diff,
    stats,
  }
}

/// One attempt: split walk, crack fixing, count new triangles.
///
/// The first `guaranteed` splits that create triangles are taken even when
/// they do not fit `allowance`.
fn build_generation(
  input: &RecomputeInput,
  allowance: Option<usize>,
  guaranteed: usize,
) -> (Generation, RecomputeStats) {
  let prev = &input.prev;
  let mut stats = RecomputeStats::default();
  let mut next = Generation {
    triangles: HashMap::with_capacity(prev.len().max(input.topology.seeds().len())),
  };
  let mut queue: VecDeque<Triangle> = input.topology.seeds().iter().copied().collect();
  let mut primary_created = 0usize;

  while let Some(mut tri) = queue.pop_front() {
    if input.metric.wants_split(&tri, &input.observers) {
      let children = tri.children();
      let fresh = children.iter().filter(|c| !prev.contains(&c.id)).count();

      let split = if fresh == 0 {
        stats.continuity_splits += 1;
        true
      } else if allowance.map_or(true, |a| primary_created + fresh <= a) {
        primary_created += fresh;
        stats.primary_splits += 1;
        true
      } else if stats.primary_splits < guaranteed {
        primary_created += fresh;
        stats.primary_splits += 1;
        stats.forced_splits += 1;
        true
      } else {
        stats.deferred_splits += 1;
        false
      };

      if split {
        tri.split = true;
        queue.extend(children);
      }
    }
    next.insert(tri);
  }

  stats.fixer_splits = fix_cracks(&mut next, input.budget.max_fixer_passes);
  stats.new_triangles = next.iter().filter(|t| !prev.contains(&t.id)).count();
  (next, stats)
}

/// Which leaf edge matched a split pivot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CrackEdge {
  AB,
  BC,
  CA,
}

/// First edge (A-B, B-C, C-A order) whose midpoint is a pivot.
pub fn find_crack(leaf: &Triangle, pivots: &HashSet<PointKey>) -> Option<CrackEdge> {
  let [ab, bc, ca] = leaf.edge_midpoints();
  if pivots.contains(&PointKey::new(ab)) {
    Some(CrackEdge::AB)
  } else if pivots.contains(&PointKey::new(bc)) {
    Some(CrackEdge::BC)
  } else if pivots.contains(&PointKey::new(ca)) {
    Some(CrackEdge::CA)
  } else {
    None
  }
}

/// Force-split leaves until no leaf edge is bisected by a neighbor.
///
/// Returns the number of fixer splits.
fn fix_cracks(next: &mut Generation, max_passes: usize) -> usize {
  let mut fixer_splits = 0;

  for _pass in 0..max_passes.max(1) {
    let pivots: HashSet<PointKey> = next
      .iter()
      .filter(|t| t.split)
      .map(|t| PointKey::new(t.pivot()))
      .collect();

    let mut cracked: Vec<(u32, TriangleId, CrackEdge)> = next
      .leaves()
      .filter_map(|leaf| find_crack(leaf, &pivots).map(|edge| (leaf.depth, leaf.id, edge)))
      .collect();

    if cracked.is_empty() {
      return fixer_splits;
    }
    cracked.sort_unstable_by_key(|&(depth, id, _)| (depth, id));

    for (depth, id, edge) in cracked {
      let Some(tri) = next.triangles.get_mut(&id) else {
        continue;
      };
      tri.split = true;
      let children = tri.children();
      for mut child in children {
        child.fixer = true;
        next.triangles.entry(child.id).or_insert(child);
      }
      fixer_splits += 1;
      trace!(id = id.raw(), depth, ?edge, "Fixer split");
    }
  }

  warn!(
    max_passes,
    fixer_splits, "Crack fixing did not converge, generation may contain T-junctions"
  );
  fixer_splits
}

/// Owner of the committed generation.
pub struct LodTree {
  topology: Arc<Topology>,
  current: Arc<Generation>,
}

impl LodTree {
  pub fn new(topology: Arc<Topology>) -> Self {
    Self {
      topology,
      current: Arc::new(Generation::new()),
    }
  }

  #[inline]
  pub fn topology(&self) -> &Arc<Topology> {
    &self.topology
  }

  /// The generation the renderer currently reflects.
  #[inline]
  pub fn current(&self) -> &Arc<Generation> {
    &self.current
  }

  /// Build the input for a recompute against the committed generation.
  pub fn recompute_input(
    &self,
    observers: Vec<DVec3>,
    metric: SplitMetric,
    budget: RecomputeBudget,
  ) -> RecomputeInput {
    RecomputeInput {
      observers,
      topology: Arc::clone(&self.topology),
      prev: Arc::clone(&self.current),
      metric,
      budget,
    }
  }

  /// Recompute synchronously on the calling thread.
  pub fn recompute(
    &self,
    observers: Vec<DVec3>,
    metric: SplitMetric,
    budget: RecomputeBudget,
  ) -> RecomputeOutput {
    recompute(&self.recompute_input(observers, metric, budget))
  }

  /// Make `generation` the committed one.
  pub fn commit(&mut self, generation: Arc<Generation>) {
    self.current = generation;
  }

  /// Drop every triangle.
  pub fn clear(&mut self) {
    self.current = Arc::new(Generation::new());
  }
}

#[cfg(test)]
#[path = "generation_test.rs"]
mod generation_test;
