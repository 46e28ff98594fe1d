use std::collections::{HashMap, HashSet};

use super::*;
use crate::tree::Shape;

fn sphere_tree(radius: f64) -> LodTree {
  LodTree::new(Arc::new(Topology::new(Shape::Sphere { radius }).unwrap()))
}

fn plane_tree(size: f64) -> LodTree {
  LodTree::new(Arc::new(Topology::new(Shape::Plane { size }).unwrap()))
}

fn metric_for(tree: &LodTree, detail: f64, max_depth: u32) -> SplitMetric {
  SplitMetric::new(tree.topology().shape(), detail, max_depth)
}

/// Recompute and commit, returning the output.
fn step(
  tree: &mut LodTree,
  observers: &[DVec3],
  metric: SplitMetric,
  budget: RecomputeBudget,
) -> RecomputeOutput {
  let output = tree.recompute(observers.to_vec(), metric, budget);
  tree.commit(Arc::clone(&output.generation));
  output
}

/// No leaf edge midpoint may be a vertex of another leaf (no hanging vertex).
fn assert_conforming(generation: &Generation) {
  let corners: HashSet<PointKey> = generation
    .leaves()
    .flat_map(|t| t.corners.iter().map(|&c| PointKey::new(c)))
    .collect();

  for leaf in generation.leaves() {
    for mid in leaf.edge_midpoints() {
      assert!(
        !corners.contains(&PointKey::new(mid)),
        "T-junction at {:?} on leaf depth {}",
        mid,
        leaf.depth
      );
    }
  }
}

fn assert_children_one_deeper(generation: &Generation) {
  for tri in generation.iter().filter(|t| t.split) {
    for child in tri.children() {
      let stored = generation
        .get(&child.id)
        .unwrap_or_else(|| panic!("Split triangle {:?} is missing a child", tri.id));
      assert_eq!(stored.depth, tri.depth + 1);
    }
  }
}

#[test]
fn test_far_observer_keeps_only_seeds() {
  let mut tree = sphere_tree(10.0);
  let metric = metric_for(&tree, 5.0, 15);
  let output = step(&mut tree, &[DVec3::new(0.0, 0.0, 1.0e6)], metric, RecomputeBudget::UNLIMITED);

  assert_eq!(output.generation.len(), 8);
  assert_eq!(output.generation.leaf_count(), 8);
  assert_eq!(output.diff.creates.len(), 8);
  assert_eq!(output.stats.total_splits(), 0);
}

#[test]
fn test_no_observers_keeps_only_seeds() {
  let mut tree = plane_tree(64.0);
  let metric = metric_for(&tree, 5.0, 15);
  let output = step(&mut tree, &[], metric, RecomputeBudget::UNLIMITED);
  assert_eq!(output.generation.leaf_count(), 2);
}

#[test]
fn test_close_observer_refines_and_keeps_structure() {
  let mut tree = sphere_tree(10.0);
  let metric = metric_for(&tree, 5.0, 15);
  let output = step(&mut tree, &[DVec3::new(0.0, 0.0, 15.0)], metric, RecomputeBudget::UNLIMITED);

  assert!(output.generation.leaf_count() > 8);
  assert!(output.generation.max_depth() > 2);
  assert_children_one_deeper(&output.generation);
  assert_conforming(&output.generation);
}

/// Two updates with the same observer converge on the same leaf set.
#[test]
fn test_sphere_reaches_fixed_point() {
  let mut tree = sphere_tree(10.0);
  let metric = metric_for(&tree, 5.0, 15);
  let observers = [DVec3::new(0.0, 0.0, 15.0)];

  let first = step(&mut tree, &observers, metric, RecomputeBudget::UNLIMITED);
  let second = step(&mut tree, &observers, metric, RecomputeBudget::UNLIMITED);

  assert!(second.diff.is_empty(), "Second update changed {} triangles", second.diff.len());
  assert_eq!(first.generation.leaf_ids(), second.generation.leaf_ids());
  assert_eq!(second.stats.primary_splits, 0);
}

#[test]
fn test_sphere_stays_conforming_with_multiple_observers() {
  let mut tree = sphere_tree(10.0);
  let metric = metric_for(&tree, 6.0, 16);
  let observers = [
    DVec3::new(0.0, 0.0, 12.0),
    DVec3::new(9.0, 7.0, 0.5),
    DVec3::new(-0.3, -10.6, 0.2),
  ];

  let output = step(&mut tree, &observers, metric, RecomputeBudget::UNLIMITED);
  assert_conforming(&output.generation);
  assert_children_one_deeper(&output.generation);
}

/// Leaves sharing a full edge differ by at most one level. Returns the
/// number of shared edges checked.
fn assert_neighbor_depths(generation: &Generation) -> usize {
  let mut edges: HashMap<(PointKey, PointKey), Vec<u32>> = HashMap::new();
  for leaf in generation.leaves() {
    let [a, b, c] = leaf.corners;
    for (p, q) in [(a, b), (b, c), (c, a)] {
      let (kp, kq) = (PointKey::new(p), PointKey::new(q));
      let key = if kp < kq { (kp, kq) } else { (kq, kp) };
      edges.entry(key).or_default().push(leaf.depth);
    }
  }

  let mut shared = 0;
  for depths in edges.values().filter(|d| d.len() == 2) {
    shared += 1;
    assert!(depths[0].abs_diff(depths[1]) <= 1, "Neighbor depths {:?}", depths);
  }
  shared
}

#[test]
fn test_plane_neighbor_depths_differ_by_at_most_one() {
  let mut tree = plane_tree(64.0);
  let metric = metric_for(&tree, 8.0, 16);
  let output = step(&mut tree, &[DVec3::new(5.0, 1.0, -3.0)], metric, RecomputeBudget::UNLIMITED);
  assert!(assert_neighbor_depths(&output.generation) > 0);
  assert_conforming(&output.generation);
}

#[test]
fn test_sphere_neighbor_depths_differ_by_at_most_one() {
  let mut tree = sphere_tree(10.0);
  let metric = metric_for(&tree, 6.0, 14);
  let observers = [
    DVec3::new(0.0, 0.0, 10.5),
    DVec3::new(7.5, 7.0, 0.3),
    DVec3::new(-0.2, -10.4, 0.1),
  ];
  let capped = RecomputeBudget {
    max_new_triangles: 24,
    ..Default::default()
  };

  // Every intermediate capped generation must hold the bound, not only the
  // final one
  let mut converged = false;
  for _ in 0..2_000 {
    let output = step(&mut tree, &observers, metric, capped);
    assert!(assert_neighbor_depths(&output.generation) > 0);
    assert_conforming(&output.generation);
    if output.diff.is_empty() {
      converged = true;
      break;
    }
  }
  assert!(converged, "Capped sphere recompute never converged");
  assert!(tree.current().max_depth() > 4);
}

#[test]
fn test_fixer_splits_flag_children() {
  let mut tree = plane_tree(64.0);
  let metric = metric_for(&tree, 8.0, 16);
  let output = step(&mut tree, &[DVec3::new(0.0, 0.5, 31.0)], metric, RecomputeBudget::UNLIMITED);

  let fixers = output.generation.iter().filter(|t| t.fixer).count();
  assert_eq!(fixers, output.stats.fixer_splits * 2);
}

#[test]
fn test_step_cap_limits_creates_and_converges() {
  let mut tree = plane_tree(64.0);
  let metric = metric_for(&tree, 4.0, 14);
  let capped = RecomputeBudget {
    max_new_triangles: 30,
    ..Default::default()
  };

  step(&mut tree, &[DVec3::new(0.0, 500.0, 0.0)], metric, RecomputeBudget::UNLIMITED);

  // Teleport close to the surface
  let near = [DVec3::new(3.0, 0.5, 2.0)];
  let mut converged = false;
  for _ in 0..500 {
    let output = step(&mut tree, &near, metric, capped);
    assert!(
      output.diff.creates.len() <= 30,
      "Recompute created {} triangles",
      output.diff.creates.len()
    );
    assert_conforming(&output.generation);
    if output.diff.is_empty() {
      assert_eq!(output.stats.deferred_splits, 0);
      converged = true;
      break;
    }
  }
  assert!(converged, "Capped recompute never converged");

  // The capped path ends where an unlimited recompute would
  let unlimited = tree.recompute(near.to_vec(), metric, RecomputeBudget::UNLIMITED);
  assert!(unlimited.diff.is_empty());
}

/// Recompute with `cap` until nothing changes. Returns the number of
/// recomputes that changed the tree.
fn converge_capped(tree: &mut LodTree, observers: &[DVec3], metric: SplitMetric, cap: usize) -> usize {
  let capped = RecomputeBudget {
    max_new_triangles: cap,
    ..Default::default()
  };
  for steps in 0..20_000 {
    let output = step(tree, observers, metric, capped);
    if output.diff.is_empty() {
      assert_eq!(output.stats.deferred_splits, 0, "Stopped with splits still wanted");
      return steps;
    }
    assert!(output.stats.new_triangles > 0 || !output.diff.deletes.is_empty());
    if output.stats.forced_splits == 0 {
      assert!(
        output.diff.creates.len() <= cap,
        "Created {} triangles with cap {}",
        output.diff.creates.len(),
        cap
      );
    } else {
      // Only one split may overshoot the cap
      assert_eq!(output.stats.forced_splits, 1);
      assert_eq!(output.stats.primary_splits, 1);
    }
    assert_conforming(&output.generation);
  }
  panic!("Cap {} never converged", cap);
}

#[test]
fn test_small_step_caps_reach_unlimited_generation() {
  let cases = [
    (plane_tree(64.0), DVec3::new(3.0, 0.5, 2.0), 4.0, 14),
    (sphere_tree(10.0), DVec3::new(0.0, 0.0, 10.5), 5.0, 12),
  ];

  for (tree, observer, detail, max_depth) in cases {
    let metric = metric_for(&tree, detail, max_depth);
    let reference = LodTree::new(Arc::clone(tree.topology()));
    let unlimited = reference.recompute(vec![observer], metric, RecomputeBudget::UNLIMITED);
    assert!(unlimited.generation.len() > 100);

    for cap in [2, 4, 8] {
      // Start from the seeds only
      let mut capped = LodTree::new(Arc::clone(tree.topology()));
      step(&mut capped, &[observer * 1.0e6], metric, RecomputeBudget::UNLIMITED);
      assert_eq!(capped.current().len(), tree.topology().seeds().len());

      let steps = converge_capped(&mut capped, &[observer], metric, cap);
      assert!(steps > 1);
      assert_eq!(
        capped.current().leaf_ids(),
        unlimited.generation.leaf_ids(),
        "Cap {} ended on a different tree",
        cap
      );
    }
  }
}

#[test]
fn test_cap_below_one_split_still_progresses() {
  // Splitting a plane seed needs a fixer split of the other one: four new
  // triangles against a cap of two
  let mut tree = plane_tree(64.0);
  let metric = metric_for(&tree, 4.0, 10);
  let capped = RecomputeBudget {
    max_new_triangles: 2,
    ..Default::default()
  };
  step(&mut tree, &[DVec3::new(0.0, 1.0e6, 0.0)], metric, RecomputeBudget::UNLIMITED);
  assert_eq!(tree.current().len(), 2);

  let output = step(&mut tree, &[DVec3::new(0.0, 1.0, 0.0)], metric, capped);
  assert_eq!(output.stats.forced_splits, 1);
  assert_eq!(output.diff.creates.len(), 4);
  assert_eq!(output.generation.leaf_count(), 4);
  assert_conforming(&output.generation);
}

#[test]
fn test_moving_away_merges_back_to_seeds() {
  let mut tree = plane_tree(64.0);
  let metric = metric_for(&tree, 4.0, 12);

  step(&mut tree, &[DVec3::new(0.0, 1.0, 0.0)], metric, RecomputeBudget::UNLIMITED);
  let before = tree.current().len();

  let output = step(&mut tree, &[DVec3::new(0.0, 1.0e5, 0.0)], metric, RecomputeBudget::UNLIMITED);
  assert_eq!(output.diff.deletes.len(), before - 2);
  assert_eq!(output.generation.len(), 2);
  assert!(output.diff.status.iter().all(|s| !s.split));
}

#[test]
fn test_find_crack_prefers_ab_edge() {
  let tri = Triangle::new(
    DVec3::new(0.0, 0.0, 2.0),
    DVec3::new(-2.0, 0.0, 0.0),
    DVec3::new(2.0, 0.0, 0.0),
    0,
  );
  let [ab, bc, ca] = tri.edge_midpoints();

  let all: HashSet<_> = [ab, bc, ca].into_iter().map(PointKey::new).collect();
  assert_eq!(find_crack(&tri, &all), Some(CrackEdge::AB));

  let later: HashSet<_> = [bc, ca].into_iter().map(PointKey::new).collect();
  assert_eq!(find_crack(&tri, &later), Some(CrackEdge::BC));

  assert_eq!(find_crack(&tri, &HashSet::new()), None);
}

#[test]
fn test_crack_on_leg_is_fixed_by_next_pass() {
  let (a, b, c, d) = (
    DVec3::new(0.0, 0.0, 2.0),
    DVec3::new(-2.0, 0.0, 0.0),
    DVec3::new(2.0, 0.0, 0.0),
    DVec3::new(0.0, 0.0, -2.0),
  );
  let mut split = Triangle::new(a, b, c, 0);
  split.split = true;
  // Shares the split edge B-C as its own A-B
  let leaf = Triangle::new(b, c, d, 0);

  let pivots: HashSet<_> = [PointKey::new(split.pivot())].into_iter().collect();
  assert_eq!(find_crack(&leaf, &pivots), Some(CrackEdge::AB));

  let mut generation: Generation = split.children().into_iter().chain([split, leaf]).collect();
  // The leaf is bisected at its own pivot, then its child holding the
  // cracked edge as B-C is bisected on the second pass
  assert_eq!(fix_cracks(&mut generation, 8), 2);
  assert!(generation.get(&leaf.id).is_some_and(|t| t.split));
  assert_eq!(generation.iter().filter(|t| t.fixer).count(), 4);
  assert_conforming(&generation);
  assert_children_one_deeper(&generation);
}
