//! Background jobs on rayon's thread pool.
//!
//! Each job is fire-and-forget work submitted with `rayon::spawn`. Its
//! result comes back through a single-slot channel the owner polls once per
//! tick, or blocks on during synchronous force updates.
//!
//! ```ignore
//! let mut job = spawn_job(move || expensive_computation());
//!
//! // Each tick
//! match job.poll() {
//!   JobStatus::Done(result) => use_it(result),
//!   JobStatus::Pending => {}
//!   JobStatus::Lost => log_and_drop(),
//! }
//! ```

use std::panic::{self, AssertUnwindSafe};

use crossbeam_channel::{self as channel, Receiver, TryRecvError};
use tracing::error;

/// Outcome of a non-blocking poll.
#[derive(Debug)]
pub enum JobStatus<T> {
  /// Still running.
  Pending,
  /// Finished, result handed over.
  Done(T),
  /// The job panicked and produced no result.
  Lost,
}

/// Handle to a job running on the thread pool.
#[derive(Debug)]
pub struct JobHandle<T> {
  receiver: Option<Receiver<T>>,
  ready: Option<T>,
}

/// Spawn `work` on rayon's pool.
pub fn spawn_job<F, T>(work: F) -> JobHandle<T>
where
  F: FnOnce() -> T + Send + 'static,
  T: Send + 'static,
{
  let (sender, receiver) = channel::bounded(1);
  rayon::spawn(move || match panic::catch_unwind(AssertUnwindSafe(work)) {
    // Ignore send error (receiver dropped = cancelled)
    Ok(value) => {
      let _ = sender.send(value);
    }
    // Dropping the sender reports the job as lost
    Err(_) => error!("Background job panicked"),
  });
  JobHandle {
    receiver: Some(receiver),
    ready: None,
  }
}

impl<T> JobHandle<T> {
  /// A handle that is already complete.
  pub fn completed(value: T) -> Self {
    Self {
      receiver: None,
      ready: Some(value),
    }
  }

  /// Check completion without consuming the result.
  pub fn is_finished(&mut self) -> bool {
    if self.ready.is_some() {
      return true;
    }
    let Some(receiver) = self.receiver.as_ref() else {
      return true;
    };
    match receiver.try_recv() {
      Ok(value) => {
        self.ready = Some(value);
        self.receiver = None;
        true
      }
      Err(TryRecvError::Empty) => false,
      Err(TryRecvError::Disconnected) => {
        self.receiver = None;
        true
      }
    }
  }

  /// Poll for the result (non-blocking).
  pub fn poll(&mut self) -> JobStatus<T> {
    if !self.is_finished() {
      return JobStatus::Pending;
    }
    match self.ready.take() {
      Some(value) => JobStatus::Done(value),
      None => JobStatus::Lost,
    }
  }

  /// Block until the job finishes.
  ///
  /// Returns `None` if the worker died without producing a result.
  pub fn wait(mut self) -> Option<T> {
    if let Some(value) = self.ready.take() {
      return Some(value);
    }
    let receiver = self.receiver.take()?;
    match receiver.recv() {
      Ok(value) => Some(value),
      Err(_) => {
        error!("Background job ended without a result");
        None
      }
    }
  }
}

/// Number of worker threads in rayon's pool.
pub fn worker_count() -> usize {
  rayon::current_num_threads()
}
