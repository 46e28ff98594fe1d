//! Headless planet_lod driver.
//!
//! Builds a terrain from a TOML config (or defaults), drops an observer from
//! orbit towards the surface along a scripted path, and logs what each tick
//! did. Set `RUST_LOG=planet_lod=debug` for per-recompute detail.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use glam::DVec3;
use planet_lod::{
  Batch, BatchRenderer, BiomeBand, BiomeFeature, DetailFeature, FeatureSet, FeatureSpace, FlattenFeature,
  HeightSource, LatticeBaker, Shape, Terrain, TerrainConfig,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use web_time::Instant;

/// Headless driver for the planet_lod terrain engine.
#[derive(Parser, Debug)]
#[command(name = "planet_lod_demo")]
#[command(about = "Flies an observer over an adaptive LOD terrain and logs tick stats")]
struct Args {
  /// Path to a terrain configuration TOML file.
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Number of ticks to run.
  #[arg(short, long, default_value_t = 600)]
  ticks: usize,

  /// Starting altitude as a multiple of the terrain extent.
  #[arg(long, default_value_t = 3.0)]
  start_altitude: f64,

  /// Final altitude as a multiple of the terrain extent.
  #[arg(long, default_value_t = 0.01)]
  end_altitude: f64,

  /// Sleep between ticks in milliseconds (simulated frame time).
  #[arg(long, default_value_t = 16)]
  frame_ms: u64,

  /// Log a summary every N ticks.
  #[arg(long, default_value_t = 60)]
  log_every: usize,

  /// Height range of the procedural heightmap, in world units.
  #[arg(long, default_value_t = 40.0)]
  height_range: f32,
}

/// Counts what a real renderer would upload.
#[derive(Default)]
struct StatsRenderer {
  batches: usize,
  instances: usize,
  uploads: usize,
}

impl BatchRenderer for StatsRenderer {
  fn draw_batch(&mut self, _index: usize, batch: &Batch) {
    self.batches += 1;
    self.instances += batch.len();
    if batch.is_dirty() {
      self.uploads += 1;
    }
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  let config = match &args.config {
    Some(path) => {
      info!("Loading config from: {}", path.display());
      TerrainConfig::load(path).with_context(|| format!("Failed to load config: {}", path.display()))?
    }
    None => TerrainConfig::default(),
  };

  let features = build_features(&config.shape, args.height_range);
  let mut terrain =
    Terrain::new(config.clone(), features, Arc::new(LatticeBaker)).context("Failed to build terrain")?;

  let extent = config.shape.extent();
  let path = ObserverPath {
    shape: config.shape,
    start: args.start_altitude * extent,
    end: args.end_altitude * extent,
    ticks: args.ticks.max(1),
  };

  let start = Instant::now();
  let report = terrain.activate(&[path.at(0)]);
  info!(
    triangles = terrain.tree().current().len(),
    baked = report.completed,
    elapsed_ms = start.elapsed().as_millis() as u64,
    "Activated"
  );

  let mut renderer = StatsRenderer::default();
  for tick in 0..args.ticks {
    let observer = path.at(tick);
    let report = terrain.tick(&[observer]);
    terrain.draw(&mut renderer);

    if let Some(applied) = report.applied {
      debug!(
        tick,
        creates = applied.creates,
        deletes = applied.deletes,
        status = applied.status,
        fixer_splits = applied.fixer_splits,
        forced_splits = applied.forced_splits,
        "Diff applied"
      );
    }

    if args.log_every > 0 && tick % args.log_every == 0 {
      let metrics = terrain.metrics();
      info!(
        tick,
        altitude = path.altitude(tick),
        phase = ?report.phase,
        triangles = terrain.tree().current().len(),
        visible = metrics.visible_triangles,
        batches = metrics.batches,
        storage_pages = metrics.storage_pages,
        recompute_us = metrics.avg_recompute_us() as u64,
        sample_us = metrics.avg_sample_us() as u64,
        bake_us = metrics.avg_bake_us() as u64,
        peak_tick_us = metrics.peak_tick_us(),
        "Tick"
      );
    }

    if args.frame_ms > 0 {
      std::thread::sleep(Duration::from_millis(args.frame_ms));
    }
  }

  let metrics = terrain.metrics();
  info!(
    recomputes = metrics.total_recomputes,
    baked = metrics.total_triangles_baked,
    drawn_batches = renderer.batches,
    drawn_instances = renderer.instances,
    uploads = renderer.uploads,
    lost_samples = metrics.total_lost_samples,
    elapsed_ms = start.elapsed().as_millis() as u64,
    "Done"
  );

  terrain.shutdown();
  Ok(())
}

/// Descent from `start` to `end` altitude while circling the terrain.
struct ObserverPath {
  shape: Shape,
  start: f64,
  end: f64,
  ticks: usize,
}

impl ObserverPath {
  fn altitude(&self, tick: usize) -> f64 {
    let t = (tick as f64 / self.ticks as f64).clamp(0.0, 1.0);
    // Exponential descent: equal time per halving of altitude
    self.start * (self.end / self.start).powf(t)
  }

  fn at(&self, tick: usize) -> DVec3 {
    let angle = tick as f64 / self.ticks as f64 * std::f64::consts::FRAC_PI_2;
    let altitude = self.altitude(tick);
    match self.shape {
      Shape::Sphere { radius } => {
        let direction = DVec3::new(angle.sin(), 0.3, angle.cos()).normalize();
        direction * (radius + altitude)
      }
      Shape::Plane { size } => {
        let r = size * 0.25;
        DVec3::new(r * angle.sin(), altitude, r * angle.cos())
      }
    }
  }
}

/// Procedural base heightmap plus a handful of features.
fn build_features(shape: &Shape, height_range: f32) -> FeatureSet {
  let (width, height) = (512usize, 256usize);
  let base = procedural_map(width, height, 3.0, 0);
  let detail = procedural_map(width / 2, height / 2, 9.0, 17);

  let mut set = FeatureSet::new(HeightSource::from_u16(base, width, height, height_range));

  let detail = DetailFeature::new(
    HeightSource::from_u16(detail, width / 2, height / 2, 1.0),
    height_range * 0.1,
  )
  .with_frequency(6.0);
  let detail = match shape {
    Shape::Sphere { .. } => detail.with_pole_blend(3.0),
    Shape::Plane { .. } => detail,
  };
  set.push(Box::new(detail));

  let landing = match *shape {
    Shape::Sphere { radius } => DVec3::new(0.0, 0.3, 1.0).normalize() * radius,
    Shape::Plane { .. } => DVec3::ZERO,
  };
  set.push(Box::new(FlattenFeature::new(
    FeatureSpace::Local {
      center: landing,
      radius: shape.extent() * 0.05,
    },
    height_range * 0.5,
    0.9,
  )));

  set.push(Box::new(BiomeFeature::new(
    FeatureSpace::Global,
    vec![
      BiomeBand {
        max_height: height_range * 0.3,
        color: [0.2, 0.35, 0.6, 1.0],
      },
      BiomeBand {
        max_height: height_range * 0.6,
        color: [0.3, 0.55, 0.25, 1.0],
      },
      BiomeBand {
        max_height: height_range * 0.85,
        color: [0.5, 0.45, 0.4, 1.0],
      },
      BiomeBand {
        max_height: f32::MAX,
        color: [0.95, 0.95, 0.97, 1.0],
      },
    ],
  )));

  set
}

/// Sum of a few sine ridges, normalized into the full u16 range.
fn procedural_map(width: usize, height: usize, frequency: f64, phase: u32) -> Vec<u16> {
  let phase = phase as f64 * 0.37;
  let mut data = Vec::with_capacity(width * height);
  for y in 0..height {
    for x in 0..width {
      let u = x as f64 / width as f64 * std::f64::consts::TAU;
      let v = y as f64 / height as f64 * std::f64::consts::PI;
      let mut value = 0.0;
      let mut amplitude = 0.5;
      let mut f = frequency;
      for _ in 0..4 {
        value += amplitude * ((u * f + phase).sin() * (v * f * 0.7 - phase).cos());
        amplitude *= 0.5;
        f *= 2.03;
      }
      let normalized = (value * 0.5 + 0.5).clamp(0.0, 1.0);
      data.push((normalized * u16::MAX as f64) as u16);
    }
  }
  data
}
