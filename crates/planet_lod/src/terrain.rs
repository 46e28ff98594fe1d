//! Terrain - the budgeted per-tick update loop.
//!
//! # Phases
//!
//! ```text
//!          ┌──────────────────────────────────────────────────────┐
//!          ▼                                                      │
//!        Idle ──snapshot observers, spawn recompute──► DiffPending │
//!                                                        │        │
//!                                       recompute done   │        │
//!                                                        ▼        │
//!                      SchedulingNewTriangles (one job per create) │
//!                                                        │        │
//!                                      all creates sent  │        │
//!                                                        ▼        │
//!                      AwaitingCompletion (poll, add hidden visual) │
//!                                                        │        │
//!                                  every bake consumed   │        │
//!                                                        ▼        │
//!                      ApplyingDiffs (deletes, status, show) ─────┘
//! ```
//!
//! One recompute is in flight per terrain. Its diff is fully applied before
//! the next recompute starts. Scheduling and polling stop once the tick's
//! wall-clock budget is spent (at least one operation always runs); applying
//! a diff happens within a single tick so no frame shows half of it.
//!
//! Force mode (`force_update`, `activate`, or `force = true` in the config)
//! runs everything synchronously with no step cap.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use glam::{DAffine3, DVec3};
use tracing::{debug, error, info, warn};
use web_time::Instant;

use crate::atlas::{BatchRenderer, VisualAtlasManager};
use crate::config::TerrainConfig;
use crate::constants::MAX_SAMPLE_ATTEMPTS;
use crate::error::Result;
use crate::metrics::TerrainMetrics;
use crate::presentation::{NullListener, TerrainListener};
use crate::sampling::{Baker, FeaturePipeline, FeatureSet, SampleHandle, SampleResult, SampleScheduler};
use crate::threading::{spawn_job, worker_count, JobHandle, JobStatus};
use crate::tree::{
  recompute, GenerationDiff, LodTree, RecomputeBudget, RecomputeInput, RecomputeOutput, SplitMetric, Topology,
  Triangle, TriangleId,
};

/// Where the update loop stands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum UpdatePhase {
  #[default]
  Idle,
  /// A recompute is running on the worker pool.
  DiffPending,
  /// Sampling jobs are being launched for created triangles.
  SchedulingNewTriangles,
  /// Every job is launched; waiting for the last bakes.
  AwaitingCompletion,
  /// Deletes and visibility changes are being applied.
  ApplyingDiffs,
}

/// Counts of one applied diff.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AppliedDiff {
  pub creates: usize,
  pub deletes: usize,
  pub status: usize,
  pub fixer_splits: usize,
  /// Splits taken over the step cap because no single split fit it.
  pub forced_splits: usize,
}

/// What one tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
  /// Phase after the tick.
  pub phase: UpdatePhase,
  pub recompute_started: bool,
  /// Sampling jobs launched.
  pub scheduled: usize,
  /// Bakes consumed.
  pub completed: usize,
  /// Set on the tick a diff was applied.
  pub applied: Option<AppliedDiff>,
}

/// Recompute result with its wall-clock cost.
struct TimedRecompute {
  output: RecomputeOutput,
  recompute_us: u64,
}

/// A recompute whose diff is being worked off.
struct PendingUpdate {
  output: RecomputeOutput,
  /// Next index into `output.diff.creates` to schedule.
  next_create: usize,
  in_flight: VecDeque<SampleHandle>,
  /// Triangles whose job was lost, scheduled again before new creates.
  retry: VecDeque<Triangle>,
  attempts: HashMap<TriangleId, u32>,
  /// Created leaves to show once the diff is applied.
  show_queue: Vec<TriangleId>,
}

impl PendingUpdate {
  fn new(output: RecomputeOutput) -> Self {
    Self {
      output,
      next_create: 0,
      in_flight: VecDeque::new(),
      retry: VecDeque::new(),
      attempts: HashMap::new(),
      show_queue: Vec::new(),
    }
  }

  #[inline]
  fn all_scheduled(&self) -> bool {
    self.retry.is_empty() && self.next_create >= self.output.diff.creates.len()
  }

  /// Next triangle to sample, retries first.
  fn next_triangle(&mut self) -> Option<Triangle> {
    if let Some(triangle) = self.retry.pop_front() {
      return Some(triangle);
    }
    let triangle = self.output.diff.creates.get(self.next_create).copied()?;
    self.next_create += 1;
    Some(triangle)
  }
}

/// Per-tick wall-clock allowance.
struct TickBudget {
  start: Instant,
  limit: Duration,
  ops: usize,
}

impl TickBudget {
  fn new(limit: Duration) -> Self {
    Self {
      start: Instant::now(),
      limit,
      ops: 0,
    }
  }

  /// Spent once at least one operation ran and the time is up.
  #[inline]
  fn exhausted(&self) -> bool {
    self.ops > 0 && self.start.elapsed() >= self.limit
  }

  #[inline]
  fn spend(&mut self) {
    self.ops += 1;
  }
}

/// One adaptive terrain instance.
pub struct Terrain {
  config: TerrainConfig,
  tree: LodTree,
  metric: SplitMetric,
  init_metric: SplitMetric,
  budget: RecomputeBudget,
  scheduler: SampleScheduler,
  atlas: VisualAtlasManager,
  listener: Box<dyn TerrainListener>,
  metrics: TerrainMetrics,
  /// Topology-local space to world space.
  transform: DAffine3,
  world_to_local: DAffine3,
  phase: UpdatePhase,
  recompute_job: Option<JobHandle<TimedRecompute>>,
  pending: Option<PendingUpdate>,
  max_in_flight: usize,
  converged: bool,
  shut_down: bool,
}

impl Terrain {
  /// Build a terrain. Nothing is sampled until the first tick or `activate`.
  pub fn new(config: TerrainConfig, features: FeatureSet, baker: Arc<dyn Baker>) -> Result<Self> {
    config.validate()?;
    let topology = Arc::new(Topology::new(config.shape)?);
    let max_depth = config.resolve_max_depth(topology.seed_edge_length());
    let metric = SplitMetric::new(config.shape, config.detail, max_depth);
    let init_metric = SplitMetric::new(config.shape, config.init_detail, max_depth);
    let budget = RecomputeBudget::from_step_limit(config.step_limit());
    let pipeline = Arc::new(FeaturePipeline::new(config.shape, features));

    info!(
      shape = ?config.shape,
      seeds = topology.seeds().len(),
      max_depth,
      detail = config.detail,
      lod_steps = config.lod_steps,
      "Terrain created"
    );

    Ok(Self {
      config,
      tree: LodTree::new(topology),
      metric,
      init_metric,
      budget,
      scheduler: SampleScheduler::new(pipeline, baker),
      atlas: VisualAtlasManager::new(),
      listener: Box::new(NullListener),
      metrics: TerrainMetrics::new(),
      transform: DAffine3::IDENTITY,
      world_to_local: DAffine3::IDENTITY,
      phase: UpdatePhase::Idle,
      recompute_job: None,
      pending: None,
      max_in_flight: (worker_count() * 2).max(2),
      converged: false,
      shut_down: false,
    })
  }

  /// Attach a lifecycle listener.
  pub fn with_listener(mut self, listener: impl TerrainListener + 'static) -> Self {
    self.listener = Box::new(listener);
    self
  }

  /// Place the terrain in the world. Observers passed to `tick` are in
  /// world space and converted with the inverse of this transform.
  pub fn set_transform(&mut self, transform: DAffine3) {
    self.transform = transform;
    self.world_to_local = transform.inverse();
  }

  #[inline]
  pub fn transform(&self) -> DAffine3 {
    self.transform
  }

  #[inline]
  pub fn config(&self) -> &TerrainConfig {
    &self.config
  }

  #[inline]
  pub fn phase(&self) -> UpdatePhase {
    self.phase
  }

  #[inline]
  pub fn tree(&self) -> &LodTree {
    &self.tree
  }

  #[inline]
  pub fn atlas(&self) -> &VisualAtlasManager {
    &self.atlas
  }

  #[inline]
  pub fn pipeline(&self) -> &Arc<FeaturePipeline> {
    self.scheduler.pipeline()
  }

  #[inline]
  pub fn metrics(&self) -> &TerrainMetrics {
    &self.metrics
  }

  /// Sample buffers owned by in-flight jobs.
  #[inline]
  pub fn outstanding_buffers(&self) -> usize {
    self.scheduler.outstanding_buffers()
  }

  /// True when the last finished recompute changed nothing and no other
  /// one is running.
  #[inline]
  pub fn is_converged(&self) -> bool {
    self.converged
  }

  #[inline]
  pub fn is_shut_down(&self) -> bool {
    self.shut_down
  }

  /// Hand the shown batches to a renderer.
  pub fn draw(&mut self, renderer: &mut dyn BatchRenderer) -> usize {
    self.atlas.draw(renderer)
  }

  fn to_local(&self, observers: &[DVec3]) -> Vec<DVec3> {
    observers
      .iter()
      .map(|&observer| self.world_to_local.transform_point3(observer))
      .collect()
  }

  // ===========================================================================
  // Budgeted path
  // ===========================================================================

  /// Advance the update loop by one tick.
  pub fn tick(&mut self, observers: &[DVec3]) -> TickReport {
    if self.shut_down {
      return TickReport::default();
    }
    if self.config.force {
      return self.force_update(observers);
    }

    let _span = tracing::info_span!("terrain_tick", phase = ?self.phase).entered();
    let mut budget = TickBudget::new(self.config.lod_budget_duration());
    let mut report = TickReport::default();

    loop {
      match self.phase {
        UpdatePhase::Idle => {
          // At most one recompute per tick, never right after an apply
          if report.recompute_started || report.applied.is_some() {
            break;
          }
          self.start_recompute(observers);
          report.recompute_started = true;
        }
        UpdatePhase::DiffPending => {
          if !self.poll_recompute() {
            break;
          }
        }
        UpdatePhase::SchedulingNewTriangles | UpdatePhase::AwaitingCompletion => {
          let (completed, scheduled) = self.pump_samples(&mut budget);
          report.completed += completed;
          report.scheduled += scheduled;
          if self.phase != UpdatePhase::ApplyingDiffs {
            break;
          }
        }
        UpdatePhase::ApplyingDiffs => {
          report.applied = self.apply_pending();
          self.phase = UpdatePhase::Idle;
        }
      }
    }

    report.phase = self.phase;
    self.metrics.record_tick(budget.start.elapsed().as_micros() as u64);
    report
  }

  fn start_recompute(&mut self, observers: &[DVec3]) {
    let input = self
      .tree
      .recompute_input(self.to_local(observers), self.metric, self.budget);
    let pipeline = Arc::clone(self.scheduler.pipeline());
    self.recompute_job = Some(spawn_job(move || timed_recompute(&pipeline, input)));
    self.converged = false;
    self.phase = UpdatePhase::DiffPending;
  }

  /// Returns `true` when the phase moved on.
  fn poll_recompute(&mut self) -> bool {
    let Some(job) = self.recompute_job.as_mut() else {
      self.phase = UpdatePhase::Idle;
      return false;
    };
    match job.poll() {
      JobStatus::Pending => false,
      JobStatus::Done(timed) => {
        self.recompute_job = None;
        self.begin_update(timed);
        true
      }
      JobStatus::Lost => {
        self.recompute_job = None;
        error!("Recompute job lost, retrying next tick");
        self.phase = UpdatePhase::Idle;
        false
      }
    }
  }

  fn begin_update(&mut self, timed: TimedRecompute) {
    let TimedRecompute { output, recompute_us } = timed;
    self
      .metrics
      .record_recompute(recompute_us, &output.stats);

    if output.diff.is_empty() {
      self.tree.commit(output.generation);
      self.converged = true;
      self.phase = UpdatePhase::Idle;
      return;
    }

    self.converged = false;
    self.pending = Some(PendingUpdate::new(output));
    self.phase = UpdatePhase::SchedulingNewTriangles;
  }

  /// Consume finished bakes, then launch more jobs. Returns
  /// `(completed, scheduled)`.
  fn pump_samples(&mut self, budget: &mut TickBudget) -> (usize, usize) {
    let Some(mut update) = self.pending.take() else {
      self.phase = UpdatePhase::Idle;
      return (0, 0);
    };

    let mut completed = 0;
    let mut index = 0;
    while index < update.in_flight.len() && !budget.exhausted() {
      match update.in_flight[index].poll() {
        JobStatus::Pending => index += 1,
        JobStatus::Done(result) => {
          update.in_flight.remove(index);
          self.finish_sample(&mut update, result);
          budget.spend();
          completed += 1;
        }
        JobStatus::Lost => {
          if let Some(handle) = update.in_flight.remove(index) {
            self.sample_lost(&mut update, *handle.triangle());
          }
        }
      }
    }

    let mut scheduled = 0;
    while update.in_flight.len() < self.max_in_flight && !budget.exhausted() {
      let Some(triangle) = update.next_triangle() else {
        break;
      };
      update.in_flight.push_back(self.scheduler.schedule(triangle));
      budget.spend();
      scheduled += 1;
    }

    self.phase = if !update.all_scheduled() {
      UpdatePhase::SchedulingNewTriangles
    } else if !update.in_flight.is_empty() {
      UpdatePhase::AwaitingCompletion
    } else {
      UpdatePhase::ApplyingDiffs
    };
    self.pending = Some(update);
    (completed, scheduled)
  }

  // ===========================================================================
  // Shared steps
  // ===========================================================================

  /// Store a finished bake as a hidden visual.
  fn finish_sample(&mut self, update: &mut PendingUpdate, result: SampleResult) {
    self.metrics.record_sample(result.sample_us, result.bake_us);
    if self.atlas.add_visual(&result) {
      self.listener.on_add_visual(&result.triangle);
      if !result.triangle.split {
        update.show_queue.push(result.triangle.id);
      }
    }
    self.scheduler.recycle(result);
  }

  /// Reschedule a triangle whose job panicked, up to the attempt limit.
  fn sample_lost(&mut self, update: &mut PendingUpdate, triangle: Triangle) {
    self.scheduler.forget_lost();
    self.metrics.record_lost_sample();
    let attempts = update.attempts.entry(triangle.id).or_insert(0);
    *attempts += 1;
    if *attempts < MAX_SAMPLE_ATTEMPTS {
      warn!(id = triangle.id.raw(), attempts = *attempts, "Sampling job lost, retrying");
      update.retry.push_back(triangle);
    } else {
      error!(
        id = triangle.id.raw(),
        attempts = *attempts,
        "Sampling job lost too often, triangle will not be drawn"
      );
    }
  }

  /// Apply deletes, status changes and pending shows, then commit.
  fn apply_pending(&mut self) -> Option<AppliedDiff> {
    let update = self.pending.take()?;
    let _span = tracing::info_span!("apply_diffs").entered();
    let PendingUpdate {
      output, show_queue, ..
    } = update;
    let GenerationDiff {
      creates,
      deletes,
      status,
    } = &output.diff;

    for tri in deletes {
      self.remove_visual(tri.id);
    }
    for change in status {
      if change.split {
        self.hide_visual(change.id);
      } else {
        self.show_visual(change.id);
      }
    }
    for &id in &show_queue {
      self.show_visual(id);
    }

    let applied = AppliedDiff {
      creates: creates.len(),
      deletes: deletes.len(),
      status: status.len(),
      fixer_splits: output.stats.fixer_splits,
      forced_splits: output.stats.forced_splits,
    };
    self.tree.commit(output.generation);
    self.record_presentation(&applied);
    debug!(
      creates = applied.creates,
      deletes = applied.deletes,
      status = applied.status,
      visible = self.metrics.visible_triangles,
      "Diff applied"
    );
    Some(applied)
  }

  fn show_visual(&mut self, id: TriangleId) {
    if self.atlas.is_shown(id) {
      return;
    }
    if self.atlas.show_visual(id) {
      self.listener.on_show_visual(id);
    } else {
      warn!(id = id.raw(), "Leaf has no baked visual");
    }
  }

  fn hide_visual(&mut self, id: TriangleId) {
    if self.atlas.hide_visual(id) {
      self.listener.on_hide_visual(id);
    }
  }

  fn remove_visual(&mut self, id: TriangleId) {
    self.hide_visual(id);
    if self.atlas.remove_visual(id) {
      self.listener.on_remove_visual(id);
    }
  }

  fn record_presentation(&mut self, applied: &AppliedDiff) {
    self
      .metrics
      .record_applied(applied.creates, applied.deletes, applied.status);
    self.metrics.visible_triangles = self.atlas.shown_count();
    self.metrics.baked_visuals = self.atlas.visual_count();
    self.metrics.storage_pages = self.atlas.storage_page_count();
    self.metrics.batches = self.atlas.batch_count();
  }

  // ===========================================================================
  // Force path
  // ===========================================================================

  /// Bring the terrain fully up to date for `observers`, blocking.
  pub fn force_update(&mut self, observers: &[DVec3]) -> TickReport {
    let metric = self.metric;
    self.force_with(observers, metric)
  }

  /// Synchronous first update at `init_detail`.
  pub fn activate(&mut self, observers: &[DVec3]) -> TickReport {
    let metric = self.init_metric;
    self.force_with(observers, metric)
  }

  fn force_with(&mut self, observers: &[DVec3], metric: SplitMetric) -> TickReport {
    if self.shut_down {
      return TickReport::default();
    }
    let _span = tracing::info_span!("terrain_force_update").entered();
    let start = Instant::now();
    let mut report = TickReport::default();

    // Finish whatever the budgeted path left in flight
    if let Some(job) = self.recompute_job.take() {
      match job.wait() {
        Some(timed) => self.begin_update(timed),
        None => self.phase = UpdatePhase::Idle,
      }
    }
    if self.pending.is_some() {
      let (completed, scheduled) = self.drain_pending();
      report.completed += completed;
      report.scheduled += scheduled;
      report.applied = self.apply_pending();
    }

    let input = self
      .tree
      .recompute_input(self.to_local(observers), metric, RecomputeBudget::UNLIMITED);
    let timed = timed_recompute(self.scheduler.pipeline(), input);
    report.recompute_started = true;
    self.begin_update(timed);
    if self.pending.is_some() {
      let (completed, scheduled) = self.drain_pending();
      report.completed += completed;
      report.scheduled += scheduled;
      report.applied = self.apply_pending();
    }

    self.phase = UpdatePhase::Idle;
    report.phase = self.phase;
    self.metrics.record_tick(start.elapsed().as_micros() as u64);
    report
  }

  /// Schedule every remaining create and wait for every bake.
  fn drain_pending(&mut self) -> (usize, usize) {
    let Some(mut update) = self.pending.take() else {
      return (0, 0);
    };

    let mut scheduled = 0;
    let mut completed = 0;
    loop {
      while let Some(triangle) = update.next_triangle() {
        update.in_flight.push_back(self.scheduler.schedule(triangle));
        scheduled += 1;
      }
      let Some(handle) = update.in_flight.pop_front() else {
        break;
      };
      let triangle = *handle.triangle();
      match handle.wait() {
        Some(result) => {
          self.finish_sample(&mut update, result);
          completed += 1;
        }
        None => self.sample_lost(&mut update, triangle),
      }
    }

    self.pending = Some(update);
    self.phase = UpdatePhase::ApplyingDiffs;
    (completed, scheduled)
  }

  // ===========================================================================
  // Teardown
  // ===========================================================================

  /// Wait for every in-flight job, release every visual and notify the
  /// listener. Runs once; later calls do nothing.
  pub fn shutdown(&mut self) {
    if self.shut_down {
      return;
    }
    let _span = tracing::info_span!("terrain_shutdown").entered();

    if let Some(job) = self.recompute_job.take() {
      // Result is discarded, only its completion matters
      let _ = job.wait();
    }
    if let Some(update) = self.pending.take() {
      for handle in update.in_flight {
        match handle.wait() {
          Some(result) => self.scheduler.recycle(result),
          None => self.scheduler.forget_lost(),
        }
      }
    }

    for id in self.atlas.ids() {
      self.remove_visual(id);
    }
    self.atlas.clear();
    self.tree.clear();
    self.scheduler.trim_pools();
    self.listener.on_terrain_destroy();

    self.phase = UpdatePhase::Idle;
    self.shut_down = true;
    self.record_presentation(&AppliedDiff::default());
    info!(outstanding = self.scheduler.outstanding_buffers(), "Terrain shut down");
  }
}

impl Drop for Terrain {
  fn drop(&mut self) {
    self.shutdown();
  }
}

/// Lower observers onto the displaced surface and recompute.
fn timed_recompute(pipeline: &FeaturePipeline, mut input: RecomputeInput) -> TimedRecompute {
  let start = Instant::now();
  for observer in &mut input.observers {
    *observer = pipeline.effective_observer(*observer);
  }
  let output = recompute(&input);
  TimedRecompute {
    output,
    recompute_us: start.elapsed().as_micros() as u64,
  }
}

#[cfg(test)]
#[path = "terrain_test.rs"]
mod terrain_test;
