//! Shared fixtures for terrain tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use glam::DVec3;

use crate::config::TerrainConfig;
use crate::presentation::TerrainListener;
use crate::sampling::{FeatureSet, LatticeBaker};
use crate::terrain::{Terrain, TickReport};
use crate::tree::{Shape, Triangle, TriangleId};

/// One listener callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenerEvent {
  Add { id: TriangleId, fixer: bool },
  Show(TriangleId),
  Hide(TriangleId),
  Remove(TriangleId),
  Destroy,
}

/// Listener that records every callback. Clones share one log.
#[derive(Clone, Default)]
pub struct RecordingListener {
  events: Arc<Mutex<Vec<ListenerEvent>>>,
}

impl RecordingListener {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn events(&self) -> Vec<ListenerEvent> {
    self.events.lock().unwrap().clone()
  }

  /// Ids shown after replaying every event.
  pub fn shown(&self) -> HashSet<TriangleId> {
    let mut shown = HashSet::new();
    for event in self.events() {
      match event {
        ListenerEvent::Show(id) => {
          assert!(shown.insert(id), "Shown twice without a hide");
        }
        ListenerEvent::Hide(id) => {
          assert!(shown.remove(&id), "Hidden while not shown");
        }
        ListenerEvent::Remove(id) => {
          assert!(!shown.contains(&id), "Removed while shown");
        }
        _ => {}
      }
    }
    shown
  }

  fn push(&self, event: ListenerEvent) {
    self.events.lock().unwrap().push(event);
  }
}

impl TerrainListener for RecordingListener {
  fn on_add_visual(&mut self, triangle: &Triangle) {
    self.push(ListenerEvent::Add {
      id: triangle.id,
      fixer: triangle.fixer,
    });
  }

  fn on_show_visual(&mut self, id: TriangleId) {
    self.push(ListenerEvent::Show(id));
  }

  fn on_hide_visual(&mut self, id: TriangleId) {
    self.push(ListenerEvent::Hide(id));
  }

  fn on_remove_visual(&mut self, id: TriangleId) {
    self.push(ListenerEvent::Remove(id));
  }

  fn on_terrain_destroy(&mut self) {
    self.push(ListenerEvent::Destroy);
  }
}

/// Radius 10 sphere, detail 5, minimum triangle size 0.1.
pub fn sphere_config() -> TerrainConfig {
  TerrainConfig {
    shape: Shape::Sphere { radius: 10.0 },
    detail: 5.0,
    init_detail: 5.0,
    minimum_triangle_size: 0.1,
    max_depth: None,
    lod_budget: 1.0,
    lod_steps: 0,
    force: false,
  }
}

/// 64 x 64 plane, detail 4, depth 14, at most 30 new triangles per recompute.
pub fn plane_config() -> TerrainConfig {
  TerrainConfig {
    shape: Shape::Plane { size: 64.0 },
    detail: 4.0,
    init_detail: 4.0,
    minimum_triangle_size: 0.1,
    max_depth: Some(14),
    lod_budget: 1.0,
    lod_steps: 30,
    force: false,
  }
}

/// Flat terrain baked with the reference baker.
pub fn flat_terrain(config: TerrainConfig) -> Terrain {
  Terrain::new(config, FeatureSet::default(), Arc::new(LatticeBaker)).unwrap()
}

/// Tick until a recompute produces no change. Returns every tick report.
pub fn tick_until_converged(terrain: &mut Terrain, observers: &[DVec3], max_ticks: usize) -> Vec<TickReport> {
  let mut reports = Vec::new();
  for _ in 0..max_ticks {
    reports.push(terrain.tick(observers));
    if terrain.is_converged() {
      return reports;
    }
    std::thread::sleep(Duration::from_micros(200));
  }
  panic!("Terrain did not converge within {} ticks", max_ticks);
}
