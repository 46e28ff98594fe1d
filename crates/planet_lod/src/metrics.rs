//! Terrain statistics updated by the update loop.
//!
//! ```ignore
//! let metrics = terrain.metrics();
//! println!(
//!   "visible={} recompute avg={:.0}us",
//!   metrics.visible_triangles,
//!   metrics.avg_recompute_us()
//! );
//! ```

use std::collections::VecDeque;

use crate::tree::RecomputeStats;

/// Recent timings in microseconds, oldest evicted first.
///
/// Keeps a running sum so the average is cheap to read every frame.
#[derive(Debug, Clone)]
pub struct TimingWindow {
  samples: VecDeque<u64>,
  capacity: usize,
  sum: u64,
}

impl TimingWindow {
  pub fn new(capacity: usize) -> Self {
    let capacity = capacity.max(1);
    Self {
      samples: VecDeque::with_capacity(capacity),
      capacity,
      sum: 0,
    }
  }

  pub fn record(&mut self, micros: u64) {
    if self.samples.len() == self.capacity {
      if let Some(oldest) = self.samples.pop_front() {
        self.sum -= oldest;
      }
    }
    self.samples.push_back(micros);
    self.sum += micros;
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.samples.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.samples.is_empty()
  }

  pub fn clear(&mut self) {
    self.samples.clear();
    self.sum = 0;
  }

  /// Most recent timing.
  pub fn last(&self) -> Option<u64> {
    self.samples.back().copied()
  }

  /// Mean of the window, 0 when empty.
  pub fn average(&self) -> f64 {
    if self.samples.is_empty() {
      0.0
    } else {
      self.sum as f64 / self.samples.len() as f64
    }
  }

  /// Slowest timing in the window.
  pub fn peak(&self) -> u64 {
    self.samples.iter().copied().max().unwrap_or(0)
  }
}

impl Default for TimingWindow {
  fn default() -> Self {
    Self::new(128) // ~2 seconds at 60fps
  }
}

/// Per-terrain statistics.
#[derive(Debug, Clone, Default)]
pub struct TerrainMetrics {
  // Timing
  /// Recompute (split walk + fixer + diff) times in microseconds.
  pub recompute_timings: TimingWindow,
  /// Sampling pipeline times per triangle in microseconds.
  pub sample_timings: TimingWindow,
  /// Bake times per triangle in microseconds.
  pub bake_timings: TimingWindow,
  /// Wall-clock time spent inside `tick` in microseconds.
  pub tick_timings: TimingWindow,

  // Last applied diff
  pub last_creates: usize,
  pub last_deletes: usize,
  pub last_status: usize,

  // Last finished recompute
  pub last_fixer_splits: usize,
  /// Splits taken over the step cap.
  pub last_forced_splits: usize,

  // Presentation
  /// Leaves currently shown in a batch.
  pub visible_triangles: usize,
  /// Baked visuals (shown or hidden).
  pub baked_visuals: usize,
  pub storage_pages: usize,
  pub batches: usize,

  // Cumulative
  pub total_recomputes: u64,
  pub total_triangles_baked: u64,
  /// Sampling jobs that panicked, retries included.
  pub total_lost_samples: u64,
}

impl TerrainMetrics {
  pub fn new() -> Self {
    Self::default()
  }

  /// Reset all metrics except the cumulative counters.
  pub fn reset(&mut self) {
    *self = Self {
      total_recomputes: self.total_recomputes,
      total_triangles_baked: self.total_triangles_baked,
      total_lost_samples: self.total_lost_samples,
      ..Self::default()
    };
  }

  pub fn record_recompute(&mut self, timing_us: u64, stats: &RecomputeStats) {
    self.recompute_timings.record(timing_us);
    self.last_fixer_splits = stats.fixer_splits;
    self.last_forced_splits = stats.forced_splits;
    self.total_recomputes += 1;
  }

  pub fn record_sample(&mut self, sample_us: u64, bake_us: u64) {
    self.sample_timings.record(sample_us);
    self.bake_timings.record(bake_us);
    self.total_triangles_baked += 1;
  }

  pub fn record_lost_sample(&mut self) {
    self.total_lost_samples += 1;
  }

  pub fn record_tick(&mut self, timing_us: u64) {
    self.tick_timings.record(timing_us);
  }

  pub fn record_applied(&mut self, creates: usize, deletes: usize, status: usize) {
    self.last_creates = creates;
    self.last_deletes = deletes;
    self.last_status = status;
  }

  pub fn avg_recompute_us(&self) -> f64 {
    self.recompute_timings.average()
  }

  pub fn avg_sample_us(&self) -> f64 {
    self.sample_timings.average()
  }

  pub fn avg_bake_us(&self) -> f64 {
    self.bake_timings.average()
  }

  /// Slowest recent tick, to compare against the configured budget.
  pub fn peak_tick_us(&self) -> u64 {
    self.tick_timings.peak()
  }
}
