//! Per-triangle sampling: lattice, feature pipeline, bake and scheduling.

pub mod bake;
pub mod buffers;
pub mod features;
pub mod heightmap;
pub mod lattice;
pub mod modifiers;
pub mod pipeline;
pub mod scheduler;

pub use bake::{displaced_corners, visual_origin, BakeRequest, BakedSurface, Baker, FeatureTables, LatticeBaker};
pub use buffers::SampleBuffers;
pub use features::{Feature, FeatureKind, FeatureSet, FeatureSpace, FeatureTableEntry, LocalFrame, SampleContext};
pub use heightmap::{Addressing, Filter, HeightSource, Projection};
pub use modifiers::{BiomeBand, BiomeFeature, ColorFeature, DetailFeature, FlattenFeature};
pub use pipeline::FeaturePipeline;
pub use scheduler::{SampleHandle, SampleResult, SampleScheduler};
