//! SampleScheduler - per-triangle sampling + bake jobs.
//!
//! ```text
//! Main thread                          rayon worker
//! ┌──────────────────┐
//! │ schedule(tri)    │  buffers + surface from pools
//! └────────┬─────────┘
//!          │ spawn_job
//!          ▼
//!                                     ┌──────────────────────┐
//!                                     │ pipeline.sample(tri) │
//!                                     │ feature_tables(tri)  │
//!                                     │ baker.bake(..)       │
//!                                     └──────────┬───────────┘
//! ┌──────────────────┐                           │
//! │ handle.poll()    │◄──────────────────────────┘
//! │ atlas.add_visual │
//! │ recycle(result)  │  buffers + surface back to pools
//! └──────────────────┘
//! ```
//!
//! Stages inside one job run strictly in sequence; jobs for different
//! triangles share nothing mutable and run in parallel.

use std::sync::Arc;

use glam::DVec3;
use web_time::Instant;

use super::bake::{displaced_corners, visual_origin, BakeRequest, BakedSurface, Baker};
use super::buffers::SampleBuffers;
use super::pipeline::FeaturePipeline;
use crate::pool::Pool;
use crate::threading::{spawn_job, JobHandle, JobStatus};
use crate::tree::Triangle;

/// A sampled and baked triangle.
#[derive(Debug)]
pub struct SampleResult {
  pub triangle: Triangle,
  pub buffers: SampleBuffers,
  pub baked: BakedSurface,
  /// Displaced corners `[A, B, C]`.
  pub corners: [DVec3; 3],
  /// Baked positions are relative to this point.
  pub origin: DVec3,
  pub sample_us: u64,
  pub bake_us: u64,
}

/// In-flight sampling job for one triangle.
#[derive(Debug)]
pub struct SampleHandle {
  triangle: Triangle,
  job: JobHandle<SampleResult>,
}

impl SampleHandle {
  #[inline]
  pub fn triangle(&self) -> &Triangle {
    &self.triangle
  }

  pub fn is_finished(&mut self) -> bool {
    self.job.is_finished()
  }

  pub fn poll(&mut self) -> JobStatus<SampleResult> {
    self.job.poll()
  }

  /// Block until the job completes (force path and teardown).
  pub fn wait(self) -> Option<SampleResult> {
    self.job.wait()
  }
}

/// Schedules sampling jobs and owns their pooled buffers.
pub struct SampleScheduler {
  pipeline: Arc<FeaturePipeline>,
  baker: Arc<dyn Baker>,
  buffer_pool: Pool<SampleBuffers>,
  surface_pool: Pool<BakedSurface>,
}

impl SampleScheduler {
  pub fn new(pipeline: Arc<FeaturePipeline>, baker: Arc<dyn Baker>) -> Self {
    Self {
      pipeline,
      baker,
      buffer_pool: Pool::new(SampleBuffers::for_lattice),
      surface_pool: Pool::new(BakedSurface::new),
    }
  }

  #[inline]
  pub fn pipeline(&self) -> &Arc<FeaturePipeline> {
    &self.pipeline
  }

  /// Start sampling `triangle` on the worker pool.
  pub fn schedule(&mut self, triangle: Triangle) -> SampleHandle {
    let buffers = self.buffer_pool.take();
    let baked = self.surface_pool.take();
    let pipeline = Arc::clone(&self.pipeline);
    let baker = Arc::clone(&self.baker);

    let job = spawn_job(move || sample_and_bake(&pipeline, baker.as_ref(), triangle, buffers, baked));
    SampleHandle { triangle, job }
  }

  /// Sample `triangle` on the calling thread.
  pub fn run_now(&mut self, triangle: Triangle) -> SampleResult {
    let buffers = self.buffer_pool.take();
    let baked = self.surface_pool.take();
    sample_and_bake(&self.pipeline, self.baker.as_ref(), triangle, buffers, baked)
  }

  /// Return a consumed result's buffers to the pools.
  pub fn recycle(&mut self, result: SampleResult) {
    self.buffer_pool.give(result.buffers);
    self.surface_pool.give(result.baked);
  }

  /// A job was lost; its buffers went down with it.
  pub fn forget_lost(&mut self) {
    self.buffer_pool.forget();
    self.surface_pool.forget();
  }

  /// Sample buffers currently owned by jobs or unconsumed results.
  #[inline]
  pub fn outstanding_buffers(&self) -> usize {
    self.buffer_pool.outstanding()
  }

  #[inline]
  pub fn allocated_buffers(&self) -> usize {
    self.buffer_pool.allocated()
  }

  /// Drop pooled buffers that are not in use.
  pub fn trim_pools(&mut self) {
    self.buffer_pool.clear();
    self.surface_pool.clear();
  }
}

fn sample_and_bake(
  pipeline: &FeaturePipeline,
  baker: &dyn Baker,
  triangle: Triangle,
  mut buffers: SampleBuffers,
  mut baked: BakedSurface,
) -> SampleResult {
  let sample_start = Instant::now();
  pipeline.sample_triangle(&triangle, &mut buffers);
  let tables = pipeline.feature_tables(&triangle);
  let sample_us = sample_start.elapsed().as_micros() as u64;

  let corners = displaced_corners(&buffers);
  let origin = visual_origin(&corners);

  let bake_start = Instant::now();
  baker.bake(
    &BakeRequest {
      triangle: &triangle,
      samples: &buffers,
      tables: &tables,
      origin,
    },
    &mut baked,
  );
  let bake_us = bake_start.elapsed().as_micros() as u64;

  tracing::trace!(id = triangle.id.raw(), depth = triangle.depth, sample_us, bake_us, "Triangle baked");

  SampleResult {
    triangle,
    buffers,
    baked,
    corners,
    origin,
    sample_us,
    bake_us,
  }
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod scheduler_test;
