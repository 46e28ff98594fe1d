//! Atlas storage and render batches for baked triangles.

pub mod batch;
pub mod manager;
pub mod storage;
pub mod visual;

pub use batch::{Batch, BatchSlot, Instance};
pub use manager::{BatchRenderer, VisualAtlasManager};
pub use storage::{AtlasLayers, SliceView, Storage, StoragePage, StorageSlot};
pub use visual::Visual;
