use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::sampling::{BakeRequest, BakedSurface, LatticeBaker};
use crate::test_utils::{
  flat_terrain, plane_config, sphere_config, tick_until_converged, ListenerEvent, RecordingListener,
};

const SPHERE_OBSERVER: DVec3 = DVec3::new(0.0, 0.0, 15.0);

/// Panics on its first `failures` bakes, then bakes normally.
struct FlakyBaker {
  failures: AtomicUsize,
}

impl FlakyBaker {
  fn new(failures: usize) -> Self {
    Self {
      failures: AtomicUsize::new(failures),
    }
  }
}

impl Baker for FlakyBaker {
  fn bake(&self, request: &BakeRequest<'_>, out: &mut BakedSurface) {
    let fail = self
      .failures
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if fail {
      panic!("bake failed");
    }
    LatticeBaker.bake(request, out);
  }
}

fn flaky_terrain(config: TerrainConfig, failures: usize) -> Terrain {
  Terrain::new(config, FeatureSet::default(), Arc::new(FlakyBaker::new(failures))).unwrap()
}

/// Every leaf shown, every split triangle baked but hidden.
fn assert_presentation_matches_tree(terrain: &Terrain) {
  let generation = terrain.tree().current();
  let atlas = terrain.atlas();
  assert_eq!(atlas.visual_count(), generation.len());
  assert_eq!(atlas.shown_count(), generation.leaf_count());
  for tri in generation.iter() {
    assert!(atlas.contains(tri.id), "Triangle {:?} has no visual", tri.id);
    assert_eq!(atlas.is_shown(tri.id), tri.is_leaf());
  }
}

#[test]
fn test_force_updates_reach_fixed_point() {
  let mut terrain = flat_terrain(sphere_config());

  let first = terrain.force_update(&[SPHERE_OBSERVER]);
  assert!(first.applied.is_some());
  let leaves = terrain.tree().current().leaf_ids();
  assert!(leaves.len() > 8);

  let second = terrain.force_update(&[SPHERE_OBSERVER]);
  assert_eq!(second.applied, None);
  assert!(terrain.is_converged());
  assert_eq!(terrain.tree().current().leaf_ids(), leaves);
  assert_presentation_matches_tree(&terrain);
}

#[test]
fn test_activate_uses_init_detail() {
  let coarse = {
    let mut config = sphere_config();
    config.init_detail = 1.0;
    let mut terrain = flat_terrain(config);
    terrain.activate(&[SPHERE_OBSERVER]);
    terrain.tree().current().len()
  };
  let mut terrain = flat_terrain(sphere_config());
  terrain.activate(&[SPHERE_OBSERVER]);
  assert!(coarse < terrain.tree().current().len());
}

#[test]
fn test_step_cap_bounds_creates_per_tick() {
  let mut terrain = flat_terrain(plane_config());
  terrain.activate(&[DVec3::new(0.0, 1.0e6, 0.0)]);
  assert_eq!(terrain.tree().current().len(), 2);

  let near = [DVec3::new(0.0, 1.0, 0.0)];
  let reports = tick_until_converged(&mut terrain, &near, 100_000);

  let applied: Vec<_> = reports.iter().filter_map(|r| r.applied).collect();
  assert!(applied.len() > 1, "Jump should take several recomputes");
  for diff in &applied {
    // A lone split whose crack fixing exceeds the cap is the only overshoot
    assert!(
      diff.creates <= 30 || diff.forced_splits == 1,
      "Applied {} creates in one diff",
      diff.creates
    );
  }
  assert_presentation_matches_tree(&terrain);

  // Same tree as one unlimited update
  let mut reference = flat_terrain(plane_config());
  reference.force_update(&near);
  assert_eq!(terrain.tree().current().leaf_ids(), reference.tree().current().leaf_ids());
}

#[test]
fn test_budgeted_ticks_walk_through_phases() {
  let mut terrain = flat_terrain(sphere_config());
  let report = terrain.tick(&[SPHERE_OBSERVER]);
  assert!(report.recompute_started);
  assert_ne!(report.phase, UpdatePhase::ApplyingDiffs);

  let mut seen = HashSet::new();
  seen.insert(report.phase);
  for report in tick_until_converged(&mut terrain, &[SPHERE_OBSERVER], 100_000) {
    seen.insert(report.phase);
  }
  assert!(seen.contains(&UpdatePhase::Idle));
  assert_eq!(terrain.phase(), UpdatePhase::Idle);
  assert_eq!(terrain.outstanding_buffers(), 0);
  assert_presentation_matches_tree(&terrain);
}

#[test]
fn test_zero_budget_still_makes_progress() {
  let mut config = plane_config();
  config.lod_budget = 0.0;
  config.lod_steps = 0;
  let mut terrain = flat_terrain(config);
  tick_until_converged(&mut terrain, &[DVec3::new(0.0, 8.0, 0.0)], 100_000);
  assert_presentation_matches_tree(&terrain);
}

#[test]
fn test_force_config_finishes_in_one_tick() {
  let mut config = sphere_config();
  config.force = true;
  let mut terrain = flat_terrain(config);

  let report = terrain.tick(&[SPHERE_OBSERVER]);
  assert_eq!(report.phase, UpdatePhase::Idle);
  assert!(report.applied.is_some());
  assert_presentation_matches_tree(&terrain);
}

#[test]
fn test_merge_back_keeps_seed_visuals() {
  let listener = RecordingListener::new();
  let mut terrain = flat_terrain(sphere_config()).with_listener(listener.clone());

  terrain.force_update(&[SPHERE_OBSERVER]);
  let seeds: Vec<_> = terrain.tree().topology().seeds().iter().map(|t| t.id).collect();
  let adds_before = listener
    .events()
    .iter()
    .filter(|e| matches!(e, ListenerEvent::Add { .. }))
    .count();

  terrain.force_update(&[DVec3::new(0.0, 0.0, 1.0e6)]);
  assert_eq!(terrain.tree().current().len(), seeds.len());
  assert_presentation_matches_tree(&terrain);

  // Seeds were hidden while split and shown again without a new bake
  let adds_after = listener
    .events()
    .iter()
    .filter(|e| matches!(e, ListenerEvent::Add { .. }))
    .count();
  assert_eq!(adds_before, adds_after);
  let shown = listener.shown();
  for id in seeds {
    assert!(shown.contains(&id));
  }
}

#[test]
fn test_listener_mirrors_atlas() {
  let listener = RecordingListener::new();
  let mut terrain = flat_terrain(sphere_config()).with_listener(listener.clone());
  terrain.force_update(&[SPHERE_OBSERVER]);
  terrain.force_update(&[DVec3::new(3.0, 0.0, 14.0)]);

  let generation = terrain.tree().current();
  let leaves: HashSet<_> = generation.leaf_ids().into_iter().collect();
  assert_eq!(listener.shown(), leaves);

  for event in listener.events() {
    if let ListenerEvent::Add { id, fixer } = event {
      if let Some(tri) = generation.get(&id) {
        assert_eq!(tri.fixer, fixer);
      }
    }
  }
}

#[test]
fn test_observer_transform() {
  let offset = DVec3::new(100.0, -20.0, 5.0);
  let mut moved = flat_terrain(sphere_config());
  moved.set_transform(DAffine3::from_translation(offset));
  moved.force_update(&[SPHERE_OBSERVER + offset]);

  let mut reference = flat_terrain(sphere_config());
  reference.force_update(&[SPHERE_OBSERVER]);
  assert_eq!(moved.tree().current().leaf_ids(), reference.tree().current().leaf_ids());
}

#[test]
fn test_shutdown_mid_update_releases_everything() {
  let listener = RecordingListener::new();
  let mut terrain = flat_terrain(plane_config()).with_listener(listener.clone());
  terrain.activate(&[DVec3::new(0.0, 1.0e6, 0.0)]);

  // Leave a recompute or some bakes in flight
  for _ in 0..3 {
    terrain.tick(&[DVec3::new(0.0, 1.0, 0.0)]);
  }
  terrain.shutdown();

  assert!(terrain.is_shut_down());
  assert_eq!(terrain.outstanding_buffers(), 0);
  assert_eq!(terrain.atlas().visual_count(), 0);
  assert_eq!(terrain.atlas().storage_page_count(), 0);
  assert!(terrain.tree().current().is_empty());

  let events = listener.events();
  assert_eq!(events.last(), Some(&ListenerEvent::Destroy));
  let added: HashSet<_> = events
    .iter()
    .filter_map(|e| match e {
      ListenerEvent::Add { id, .. } => Some(*id),
      _ => None,
    })
    .collect();
  let removed: HashSet<_> = events
    .iter()
    .filter_map(|e| match e {
      ListenerEvent::Remove(id) => Some(*id),
      _ => None,
    })
    .collect();
  assert_eq!(added, removed);
  assert!(listener.shown().is_empty());

  // Idempotent, and ticks are ignored afterwards
  terrain.shutdown();
  assert_eq!(terrain.tick(&[DVec3::ZERO]), TickReport::default());
  assert_eq!(
    listener
      .events()
      .iter()
      .filter(|e| **e == ListenerEvent::Destroy)
      .count(),
    1
  );
}

#[test]
fn test_drop_runs_shutdown() {
  let listener = RecordingListener::new();
  {
    let mut terrain = flat_terrain(sphere_config()).with_listener(listener.clone());
    terrain.force_update(&[SPHERE_OBSERVER]);
  }
  assert_eq!(listener.events().last(), Some(&ListenerEvent::Destroy));
}

#[test]
fn test_metrics_follow_presentation() {
  let mut terrain = flat_terrain(sphere_config());
  terrain.force_update(&[SPHERE_OBSERVER]);

  let metrics = terrain.metrics();
  let generation = terrain.tree().current();
  assert_eq!(metrics.visible_triangles, generation.leaf_count());
  assert_eq!(metrics.baked_visuals, generation.len());
  assert_eq!(metrics.last_creates, generation.len());
  assert_eq!(metrics.total_triangles_baked, generation.len() as u64);
  assert_eq!(metrics.total_recomputes, 1);
  assert!(metrics.storage_pages >= 1);
}

#[test]
fn test_smallest_step_cap_still_converges() {
  let mut config = plane_config();
  config.lod_steps = 2;
  let mut terrain = flat_terrain(config);
  terrain.activate(&[DVec3::new(0.0, 1.0e6, 0.0)]);

  let near = [DVec3::new(0.0, 4.0, 0.0)];
  tick_until_converged(&mut terrain, &near, 200_000);
  assert!(terrain.tree().current().len() > 2);
  assert_presentation_matches_tree(&terrain);

  let mut reference = flat_terrain(plane_config());
  reference.force_update(&near);
  assert_eq!(terrain.tree().current().leaf_ids(), reference.tree().current().leaf_ids());
}

#[test]
fn test_huge_lod_budget_ticks() {
  let mut config = sphere_config();
  config.lod_budget = 1.0e20;
  let mut terrain = flat_terrain(config);
  tick_until_converged(&mut terrain, &[SPHERE_OBSERVER], 100_000);
  assert_presentation_matches_tree(&terrain);
}

#[test]
fn test_lost_bakes_are_retried_on_force() {
  let mut terrain = flaky_terrain(sphere_config(), MAX_SAMPLE_ATTEMPTS as usize - 1);
  terrain.force_update(&[SPHERE_OBSERVER]);

  assert_presentation_matches_tree(&terrain);
  assert_eq!(terrain.outstanding_buffers(), 0);
}

#[test]
fn test_lost_bakes_are_retried_on_ticks() {
  let mut terrain = flaky_terrain(plane_config(), MAX_SAMPLE_ATTEMPTS as usize - 1);
  terrain.activate(&[DVec3::new(0.0, 1.0e6, 0.0)]);
  tick_until_converged(&mut terrain, &[DVec3::new(0.0, 6.0, 0.0)], 100_000);

  assert!(terrain.tree().current().len() > 2);
  assert_presentation_matches_tree(&terrain);
  assert_eq!(terrain.outstanding_buffers(), 0);
}

#[test]
fn test_always_lost_bakes_give_up() {
  let mut terrain = flaky_terrain(sphere_config(), usize::MAX);
  let report = terrain.force_update(&[SPHERE_OBSERVER]);

  let triangles = terrain.tree().current().len();
  assert!(triangles > 8);
  assert_eq!(report.scheduled, triangles * MAX_SAMPLE_ATTEMPTS as usize);
  assert_eq!(report.completed, 0);
  assert_eq!(terrain.metrics().total_lost_samples, report.scheduled as u64);
  assert_eq!(terrain.atlas().visual_count(), 0);
  assert_eq!(terrain.outstanding_buffers(), 0);
}
