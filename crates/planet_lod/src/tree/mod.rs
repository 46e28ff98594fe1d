//! LodTree - binary triangle bisection tree over a fixed seed topology.
//!
//! Each recompute produces a new immutable [`Generation`] plus the diff from
//! the previous one. The renderer only ever sees committed generations.

pub mod budget;
pub mod diff;
pub mod generation;
pub mod identity;
pub mod split;
pub mod topology;
pub mod triangle;

pub use budget::{RecomputeBudget, RecomputeStats};
pub use diff::{diff_generations, GenerationDiff, StatusDiff};
pub use generation::{recompute, Generation, LodTree, RecomputeInput, RecomputeOutput};
pub use identity::{PointKey, TriangleId};
pub use split::SplitMetric;
pub use topology::{Shape, SurfacePoint, Topology};
pub use triangle::{midpoint, Triangle};
