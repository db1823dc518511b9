use std::any::Any;
use std::io;
use std::sync::Arc;

use thiserror::Error;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::oneshot;

use crate::{task::BlockingTask, CancellationToken, Cancelled, TaskError};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to start the timer runtime: {0}")]
    TimerRuntime(#[source] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Threads recomputation work runs on.
    pub worker_threads: usize,
    /// Threads driving debounce timers.
    pub timer_threads: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            worker_threads: available.clamp(1, 2),
            timer_threads: 1,
        }
    }
}

/// Where jobs run. Falls back to the timer runtime's blocking threads when no worker thread
/// could be started.
enum Workers {
    Pool(rayon::ThreadPool),
    Runtime,
}

impl Workers {
    fn start(threads: usize) -> Self {
        let threads = threads.max(1);
        let built = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("quire-worker-{idx}"))
            .build()
            .or_else(|_| {
                // Thread creation can fail under a low RLIMIT_NPROC; retry with one thread.
                rayon::ThreadPoolBuilder::new()
                    .num_threads(1)
                    .thread_name(|idx| format!("quire-worker-{idx}"))
                    .build()
            });
        match built {
            Ok(pool) => Workers::Pool(pool),
            Err(err) => {
                tracing::warn!(
                    target: "quire.scheduler",
                    threads,
                    error = %err,
                    "failed to start worker threads; using the runtime's blocking threads"
                );
                Workers::Runtime
            }
        }
    }
}

struct Timers {
    /// `None` when the scheduler borrows a caller's runtime.
    owned: Option<Runtime>,
    handle: Handle,
}

impl Timers {
    fn start(threads: usize) -> Result<Self, SchedulerError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(threads.max(1))
            .enable_time()
            .thread_name("quire-timer")
            .build()
            .map_err(SchedulerError::TimerRuntime)?;
        Ok(Self {
            handle: runtime.handle().clone(),
            owned: Some(runtime),
        })
    }

    fn borrowed(handle: Handle) -> Self {
        Self {
            owned: None,
            handle,
        }
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        if let Some(runtime) = self.owned.take() {
            runtime.shutdown_background();
        }
    }
}

/// Runs cancellable blocking jobs on a worker pool and hands out the runtime timers live on.
///
/// Cloning is cheap; clones share the pool and the runtime.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    workers: Workers,
    timers: Timers,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let timers = Timers::start(config.timer_threads)?;
        Ok(Self::build(&config, timers))
    }

    /// Runs timers on `handle` instead of starting a dedicated runtime, e.g. from inside
    /// `#[tokio::main]` or `#[tokio::test]`.
    pub fn with_runtime(config: SchedulerConfig, handle: Handle) -> Self {
        Self::build(&config, Timers::borrowed(handle))
    }

    fn build(config: &SchedulerConfig, timers: Timers) -> Self {
        tracing::debug!(
            target: "quire.scheduler",
            worker_threads = config.worker_threads,
            owns_runtime = timers.owned.is_some(),
            "starting scheduler"
        );
        Self {
            inner: Arc::new(SchedulerInner {
                workers: Workers::start(config.worker_threads),
                timers,
            }),
        }
    }

    pub fn runtime_handle(&self) -> Handle {
        self.inner.timers.handle.clone()
    }

    /// Runs `f` on a worker thread unless `token` is already cancelled. A panic inside `f` is
    /// logged and surfaces as [`TaskError::Panicked`].
    pub fn spawn<T, F>(&self, token: CancellationToken, f: F) -> BlockingTask<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Result<T, Cancelled> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        if token.is_cancelled() {
            let _ = tx.send(Err(TaskError::Cancelled));
            return BlockingTask::new(token, rx);
        }

        let job_token = token.clone();
        let job = move || {
            let _ = tx.send(run_caught(f, job_token));
        };
        match &self.inner.workers {
            Workers::Pool(pool) => pool.spawn(job),
            Workers::Runtime => {
                self.inner.timers.handle.spawn_blocking(job);
            }
        }
        BlockingTask::new(token, rx)
    }
}

fn run_caught<T, F>(f: F, token: CancellationToken) -> Result<T, TaskError>
where
    F: FnOnce(CancellationToken) -> Result<T, Cancelled>,
{
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(token))) {
        Ok(result) => result.map_err(TaskError::from),
        Err(payload) => {
            tracing::error!(
                target: "quire.scheduler",
                panic = %panic_message(&*payload),
                "job panicked"
            );
            Err(TaskError::Panicked)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}
