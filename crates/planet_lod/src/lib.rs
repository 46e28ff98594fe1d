//! planet_lod - adaptive LOD terrain for planets and flat worlds
//!
//! A binary triangle-bisection tree is re-tessellated every tick so its
//! density follows the observers. New triangles are sampled through an
//! ordered feature pipeline on a worker pool, baked into atlas slices and
//! shown through fixed-size render batches.
//!
//! # Features
//!
//! - **Crack-free bisection**: split decisions by apparent angular size,
//!   plus a fixer pass that removes every T-junction
//! - **Incremental diffs**: Create/Delete/Status records between generations,
//!   matched by a winding-independent triangle id
//! - **Feature pipeline**: heightmap base plus Detail, Flatten, Color and
//!   Biome features in global or local space
//! - **Atlas batching**: bakes kept in storage pages so show/hide never
//!   re-bakes
//! - **Budgeted updates**: wall-clock budget per tick and a cap on new
//!   triangles per recompute
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use planet_lod::{FeatureSet, HeightSource, LatticeBaker, Terrain, TerrainConfig};
//!
//! let config = TerrainConfig::load("terrain.toml".as_ref())?;
//! let features = FeatureSet::new(HeightSource::from_u16(heights, 1024, 512, 250.0));
//! let mut terrain = Terrain::new(config, features, Arc::new(LatticeBaker))?;
//!
//! terrain.activate(&[camera]);
//! loop {
//!   let report = terrain.tick(&[camera]);
//!   terrain.draw(&mut renderer);
//! }
//! ```

pub mod constants;
pub mod error;

// Configuration
pub mod config;
pub use config::TerrainConfig;
pub use error::{Result, TerrainError};

// Triangle tree, diffs and topology
pub mod tree;
pub use tree::{GenerationDiff, LodTree, Shape, Topology, Triangle, TriangleId};

// Sampling pipeline and bake
pub mod sampling;
pub use sampling::{
  Baker, BiomeBand, BiomeFeature, ColorFeature, DetailFeature, Feature, FeatureSet, FeatureSpace, FlattenFeature,
  HeightSource, LatticeBaker,
};

// Storage pages and render batches
pub mod atlas;
pub use atlas::{Batch, BatchRenderer, VisualAtlasManager};

// Update loop
pub mod terrain;
pub use terrain::{AppliedDiff, Terrain, TickReport, UpdatePhase};

// Lifecycle notifications
pub mod presentation;
pub use presentation::{NullListener, TerrainListener};

// Infrastructure
pub mod metrics;
pub mod pool;
pub mod threading;
pub use metrics::TerrainMetrics;

#[cfg(test)]
pub(crate) mod test_utils;
