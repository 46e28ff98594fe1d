//! Free-list pool for large reusable buffers.
//!
//! Owned by the main thread. Buffers are taken before a job is spawned,
//! moved into the job, and given back once its result has been consumed.

/// Pool of reusable `T` values.
pub struct Pool<T> {
  free: Vec<T>,
  factory: fn() -> T,
  allocated: usize,
}

impl<T> Pool<T> {
  pub fn new(factory: fn() -> T) -> Self {
    Self {
      free: Vec::new(),
      factory,
      allocated: 0,
    }
  }

  /// Take a value, allocating a fresh one when the free list is empty.
  pub fn take(&mut self) -> T {
    match self.free.pop() {
      Some(value) => value,
      None => {
        self.allocated += 1;
        (self.factory)()
      }
    }
  }

  /// Return a value for reuse.
  pub fn give(&mut self, value: T) {
    self.free.push(value);
  }

  /// Values waiting in the free list.
  #[inline]
  pub fn available(&self) -> usize {
    self.free.len()
  }

  /// Values ever created by this pool.
  #[inline]
  pub fn allocated(&self) -> usize {
    self.allocated
  }

  /// Values currently handed out.
  #[inline]
  pub fn outstanding(&self) -> usize {
    self.allocated.saturating_sub(self.free.len())
  }

  /// Account for a handed-out value that will never be given back.
  pub fn forget(&mut self) {
    self.allocated = self.allocated.saturating_sub(1);
  }

  /// Drop every pooled value.
  pub fn clear(&mut self) {
    self.allocated = self.outstanding();
    self.free.clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_take_allocates_then_reuses() {
    let mut pool: Pool<Vec<u8>> = Pool::new(|| Vec::with_capacity(16));

    let mut buf = pool.take();
    assert_eq!(pool.allocated(), 1);
    assert_eq!(pool.outstanding(), 1);

    buf.push(7);
    pool.give(buf);
    assert_eq!(pool.available(), 1);
    assert_eq!(pool.outstanding(), 0);

    let again = pool.take();
    assert_eq!(again, vec![7], "Pool hands back the same buffer");
    assert_eq!(pool.allocated(), 1);
  }

  #[test]
  fn test_forget_lost_value() {
    let mut pool: Pool<u32> = Pool::new(|| 0);
    let _lost = pool.take();
    pool.forget();
    assert_eq!(pool.outstanding(), 0);
    assert_eq!(pool.allocated(), 0);
  }

  #[test]
  fn test_clear_keeps_outstanding_count() {
    let mut pool: Pool<u32> = Pool::new(|| 0);
    let a = pool.take();
    let _b = pool.take();
    pool.give(a);
    pool.clear();
    assert_eq!(pool.available(), 0);
    assert_eq!(pool.outstanding(), 1);
  }
}
