//! Task scheduling primitives for quire.
//!
//! [`Scheduler`] owns the worker pool blocking work runs on and the Tokio runtime that drives
//! timers. [`KeyedWorkQueue`] builds the debounced, last-write-wins per-key queue on top of it.

mod scheduler;
mod task;
mod work_queue;

use thiserror::Error;

pub use scheduler::{Scheduler, SchedulerConfig, SchedulerError};
pub use task::BlockingTask;
pub use tokio_util::sync::CancellationToken;
pub use work_queue::KeyedWorkQueue;

/// Returned by cooperative work that observed its cancellation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

impl Cancelled {
    pub fn check(token: &CancellationToken) -> Result<(), Cancelled> {
        if token.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("task cancelled")]
    Cancelled,
    #[error("task panicked")]
    Panicked,
}

impl From<Cancelled> for TaskError {
    fn from(_: Cancelled) -> Self {
        TaskError::Cancelled
    }
}
