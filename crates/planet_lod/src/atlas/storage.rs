//! Storage - atlas pages holding baked triangles.
//!
//! Each page is a texture-array equivalent of `STORAGE_PAGE_SLICES` slices
//! plus a stack of free slice indices. A freed slice goes back on top of the
//! stack and is only handed out again by popping it.
//!
//! Slots address pages by index, so only unused pages at the end are
//! dropped; one is kept spare so a visual that comes and goes does not
//! reallocate a page each time. Unused pages further in are refilled first
//! by `get_storage`.

use std::ops::Range;

use crate::constants::{ATLAS_PIXELS, STORAGE_PAGE_SLICES};
use crate::sampling::BakedSurface;

/// Location of one baked triangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StorageSlot {
  pub page: usize,
  pub slice: u32,
}

/// Borrowed view of one slice's layers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SliceView<'a> {
  pub position: &'a [[f32; 4]],
  pub albedo: &'a [[u8; 4]],
  pub normal: &'a [[f32; 4]],
}

/// Position/albedo/normal layers of a slice array.
#[derive(Clone, Debug)]
pub struct AtlasLayers {
  position: Vec<[f32; 4]>,
  albedo: Vec<[u8; 4]>,
  normal: Vec<[f32; 4]>,
  slices: usize,
}

impl AtlasLayers {
  pub fn new(slices: usize) -> Self {
    Self {
      position: vec![[0.0; 4]; slices * ATLAS_PIXELS],
      albedo: vec![[0; 4]; slices * ATLAS_PIXELS],
      normal: vec![[0.0; 4]; slices * ATLAS_PIXELS],
      slices,
    }
  }

  #[inline]
  pub fn slices(&self) -> usize {
    self.slices
  }

  #[inline]
  fn range(slice: usize) -> Range<usize> {
    slice * ATLAS_PIXELS..(slice + 1) * ATLAS_PIXELS
  }

  pub fn write(&mut self, slice: usize, surface: &BakedSurface) {
    let range = Self::range(slice);
    self.position[range.clone()].copy_from_slice(&surface.position);
    self.albedo[range.clone()].copy_from_slice(&surface.albedo);
    self.normal[range].copy_from_slice(&surface.normal);
  }

  pub fn slice(&self, slice: usize) -> SliceView<'_> {
    let range = Self::range(slice);
    SliceView {
      position: &self.position[range.clone()],
      albedo: &self.albedo[range.clone()],
      normal: &self.normal[range],
    }
  }

  /// Copy slice `src_slice` of `src` into slice `dst_slice` of `self`.
  pub fn copy_from(&mut self, dst_slice: usize, src: &AtlasLayers, src_slice: usize) {
    let dst = Self::range(dst_slice);
    let src_range = Self::range(src_slice);
    self.position[dst.clone()].copy_from_slice(&src.position[src_range.clone()]);
    self.albedo[dst.clone()].copy_from_slice(&src.albedo[src_range.clone()]);
    self.normal[dst].copy_from_slice(&src.normal[src_range]);
  }

  /// Copy between two slices of the same layers.
  pub fn copy_within(&mut self, dst_slice: usize, src_slice: usize) {
    if dst_slice == src_slice {
      return;
    }
    let src = Self::range(src_slice);
    let dst = Self::range(dst_slice).start;
    self.position.copy_within(src.clone(), dst);
    self.albedo.copy_within(src.clone(), dst);
    self.normal.copy_within(src, dst);
  }
}

/// One atlas page and its free-slice stack.
#[derive(Clone, Debug)]
pub struct StoragePage {
  layers: AtlasLayers,
  free: Vec<u32>,
}

impl StoragePage {
  pub fn new() -> Self {
    Self {
      layers: AtlasLayers::new(STORAGE_PAGE_SLICES),
      // Reversed so slice 0 is popped first
      free: (0..STORAGE_PAGE_SLICES as u32).rev().collect(),
    }
  }

  /// Pop a free slice.
  #[inline]
  pub fn allocate(&mut self) -> Option<u32> {
    self.free.pop()
  }

  /// Push a slice back on the free stack.
  pub fn release(&mut self, slice: u32) {
    debug_assert!(!self.free.contains(&slice), "slice {} released twice", slice);
    self.free.push(slice);
  }

  #[inline]
  pub fn free_slices(&self) -> usize {
    self.free.len()
  }

  #[inline]
  pub fn has_free(&self) -> bool {
    !self.free.is_empty()
  }

  /// No slice holds a baked triangle.
  #[inline]
  pub fn is_unused(&self) -> bool {
    self.free.len() == STORAGE_PAGE_SLICES
  }

  #[inline]
  pub fn layers(&self) -> &AtlasLayers {
    &self.layers
  }

  #[inline]
  pub fn layers_mut(&mut self) -> &mut AtlasLayers {
    &mut self.layers
  }
}

impl Default for StoragePage {
  fn default() -> Self {
    Self::new()
  }
}

/// Every page of one terrain.
#[derive(Clone, Debug, Default)]
pub struct Storage {
  pages: Vec<StoragePage>,
}

impl Storage {
  pub fn new() -> Self {
    Self::default()
  }

  /// Index of a page with a free slice, allocating a page when all are full.
  pub fn get_storage(&mut self) -> usize {
    if let Some(index) = self.pages.iter().position(StoragePage::has_free) {
      return index;
    }
    self.pages.push(StoragePage::new());
    tracing::debug!(pages = self.pages.len(), "Storage page allocated");
    self.pages.len() - 1
  }

  /// Reserve a slice.
  pub fn allocate(&mut self) -> StorageSlot {
    let page = self.get_storage();
    // get_storage only returns pages with a free slice
    let slice = self.pages[page].allocate().unwrap_or_default();
    StorageSlot { page, slice }
  }

  pub fn release(&mut self, slot: StorageSlot) {
    if let Some(page) = self.pages.get_mut(slot.page) {
      page.release(slot.slice);
      self.trim();
    }
  }

  /// Drop trailing unused pages, keeping one spare.
  fn trim(&mut self) {
    let before = self.pages.len();
    while let [.., spare, last] = self.pages.as_slice() {
      if !(spare.is_unused() && last.is_unused()) {
        break;
      }
      self.pages.pop();
    }
    if self.pages.len() < before {
      tracing::debug!(pages = self.pages.len(), "Storage pages released");
    }
  }

  pub fn write(&mut self, slot: StorageSlot, surface: &BakedSurface) {
    if let Some(page) = self.pages.get_mut(slot.page) {
      page.layers_mut().write(slot.slice as usize, surface);
    }
  }

  pub fn slice(&self, slot: StorageSlot) -> Option<SliceView<'_>> {
    self.pages.get(slot.page).map(|page| page.layers().slice(slot.slice as usize))
  }

  #[inline]
  pub fn page(&self, index: usize) -> Option<&StoragePage> {
    self.pages.get(index)
  }

  #[inline]
  pub fn page_count(&self) -> usize {
    self.pages.len()
  }

  /// Slices currently holding a baked triangle.
  pub fn used_slices(&self) -> usize {
    self
      .pages
      .iter()
      .map(|page| STORAGE_PAGE_SLICES - page.free_slices())
      .sum()
  }

  pub fn clear(&mut self) {
    self.pages.clear();
  }
}
