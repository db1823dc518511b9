use std::{
    collections::{hash_map::Entry, HashMap},
    fmt::Debug,
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::{CancellationToken, Cancelled, Scheduler, TaskError};

type WorkItem = Box<dyn FnOnce(CancellationToken) -> Result<(), Cancelled> + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting for the quiet period to elapse.
    PendingDelay,
    /// An item is running; `pending` (if any) runs as soon as it finishes.
    Executing,
}

/// State of a non-idle key. Idle keys have no entry.
struct KeyState {
    generation: u64,
    phase: Phase,
    pending: Option<WorkItem>,
    timer: Option<tokio::task::JoinHandle<()>>,
}

struct WorkQueueInner<K> {
    scheduler: Scheduler,
    delay: Duration,
    shutdown: CancellationToken,
    next_generation: AtomicU64,
    completed: AtomicU64,
    keys: Mutex<HashMap<K, KeyState>>,
    /// Number of non-idle keys, published after every state transition.
    active: watch::Sender<usize>,
}

/// Debounced, key-addressable work queue.
///
/// Every [`enqueue`](Self::enqueue) for a key replaces that key's pending item and restarts its
/// quiet period. Once a key has been quiet for `delay`, its latest item runs on the scheduler's
/// worker pool; earlier items enqueued since the last execution are dropped without running.
/// Items for one key never run concurrently: an item enqueued while the key is executing runs
/// right after the in-flight one finishes. Distinct keys are fully independent.
#[derive(Clone)]
pub struct KeyedWorkQueue<K> {
    inner: Arc<WorkQueueInner<K>>,
}

impl<K> KeyedWorkQueue<K>
where
    K: Clone + Debug + Eq + Hash + Send + Sync + 'static,
{
    pub fn new(scheduler: Scheduler, delay: Duration) -> Self {
        let (active, _) = watch::channel(0);
        Self {
            inner: Arc::new(WorkQueueInner {
                scheduler,
                delay,
                shutdown: CancellationToken::new(),
                next_generation: AtomicU64::new(1),
                completed: AtomicU64::new(0),
                keys: Mutex::new(HashMap::new()),
                active,
            }),
        }
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    pub fn enqueue<F>(&self, key: K, f: F)
    where
        F: FnOnce(CancellationToken) -> Result<(), Cancelled> + Send + 'static,
    {
        if self.inner.shutdown.is_cancelled() {
            tracing::debug!(target: "quire.scheduler", ?key, "work queue shut down; dropping item");
            return;
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let item: WorkItem = Box::new(f);

        let mut keys = self.inner.keys.lock();
        match keys.entry(key.clone()) {
            Entry::Occupied(entry) => {
                let state = entry.into_mut();
                state.generation = generation;
                if state.pending.replace(item).is_some() {
                    tracing::trace!(target: "quire.scheduler", ?key, "superseded pending work item");
                }
                if state.phase == Phase::PendingDelay {
                    if let Some(timer) = state.timer.take() {
                        timer.abort();
                    }
                    state.timer = Some(WorkQueueInner::spawn_timer(
                        &self.inner,
                        key,
                        generation,
                    ));
                }
            }
            Entry::Vacant(entry) => {
                let timer = WorkQueueInner::spawn_timer(&self.inner, key, generation);
                entry.insert(KeyState {
                    generation,
                    phase: Phase::PendingDelay,
                    pending: Some(item),
                    timer: Some(timer),
                });
            }
        }
        self.inner.publish_active(&keys);
    }

    /// Drops the pending item for `key`, if any. An item that is already executing is not
    /// interrupted.
    pub fn cancel(&self, key: &K) -> bool {
        let mut keys = self.inner.keys.lock();
        let Some(state) = keys.get_mut(key) else {
            return false;
        };

        let cancelled = match state.phase {
            Phase::PendingDelay => {
                if let Some(timer) = state.timer.take() {
                    timer.abort();
                }
                keys.remove(key);
                true
            }
            Phase::Executing => state.pending.take().is_some(),
        };
        self.inner.publish_active(&keys);
        cancelled
    }

    /// Drops every pending item and refuses new ones. Executing items observe a cancelled
    /// token.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let mut keys = self.inner.keys.lock();
        for (_, state) in keys.drain() {
            if let Some(timer) = state.timer {
                timer.abort();
            }
        }
        self.inner.publish_active(&keys);
    }

    pub fn is_idle(&self) -> bool {
        self.inner.keys.lock().is_empty()
    }

    /// Keys that are waiting out their quiet period or executing.
    pub fn pending_keys(&self) -> Vec<K> {
        self.inner.keys.lock().keys().cloned().collect()
    }

    /// Number of items that have finished executing, successfully or not.
    pub fn completed(&self) -> u64 {
        self.inner.completed.load(Ordering::Acquire)
    }

    /// Resolves once every key is idle.
    pub async fn wait_until_idle(&self) {
        let mut rx = self.inner.active.subscribe();
        let _ = rx.wait_for(|active| *active == 0).await;
    }

    /// Blocking variant of [`wait_until_idle`](Self::wait_until_idle). Returns `false` if the
    /// queue did not settle within `timeout`.
    ///
    /// Must not be called from inside an async context.
    pub fn block_until_idle(&self, timeout: Duration) -> bool {
        self.inner.scheduler.runtime_handle().block_on(async {
            tokio::time::timeout(timeout, self.wait_until_idle())
                .await
                .is_ok()
        })
    }
}

impl<K> WorkQueueInner<K>
where
    K: Clone + Debug + Eq + Hash + Send + Sync + 'static,
{
    fn publish_active(&self, keys: &HashMap<K, KeyState>) {
        self.active.send_replace(keys.len());
    }

    fn spawn_timer(this: &Arc<Self>, key: K, generation: u64) -> tokio::task::JoinHandle<()> {
        let inner = Arc::clone(this);
        let delay = this.delay;
        this.scheduler.runtime_handle().spawn(async move {
            tokio::time::sleep(delay).await;
            Self::run_key(inner, key, generation).await;
        })
    }

    /// Fires when `key`'s quiet period elapses. Stale timers (a newer enqueue bumped the
    /// generation) do nothing.
    async fn run_key(this: Arc<Self>, key: K, generation: u64) {
        let mut item = {
            let mut keys = this.keys.lock();
            let Some(state) = keys.get_mut(&key) else {
                return;
            };
            if state.generation != generation || state.phase != Phase::PendingDelay {
                return;
            }
            state.phase = Phase::Executing;
            state.timer = None;
            state.pending.take()
        };

        while let Some(work) = item.take() {
            tracing::trace!(target: "quire.scheduler", ?key, "executing work item");
            let task = this.scheduler.spawn(this.shutdown.child_token(), work);
            match task.join().await {
                Ok(()) => {}
                Err(TaskError::Cancelled) => {
                    tracing::debug!(target: "quire.scheduler", ?key, "work item cancelled");
                }
                Err(TaskError::Panicked) => {
                    tracing::warn!(target: "quire.scheduler", ?key, "work item panicked");
                }
            }
            this.completed.fetch_add(1, Ordering::AcqRel);

            let mut keys = this.keys.lock();
            let Some(state) = keys.get_mut(&key) else {
                // Shut down while executing.
                return;
            };
            match state.pending.take() {
                Some(next) => item = Some(next),
                None => {
                    keys.remove(&key);
                    this.publish_active(&keys);
                }
            }
        }
    }
}
