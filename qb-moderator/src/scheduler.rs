//! Debounce scheduler
//!
//! Per identifier, holds at most one pending unit of work behind a quiet
//! period timer. Enqueuing again before the timer fires replaces the work
//! and restarts the timer, so a burst of edits produces a single run.
//!
//! A timer that fires while a run for the same identifier is still in
//! flight does not start a second run. It marks the in-flight run dirty
//! instead, and the run is repeated as soon as it completes. Hence:
//! - at most one execution per identifier at any time
//! - at least one execution starts after the last enqueue

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// A unit of work; may be invoked more than once
pub type Job = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as a [`Job`]
pub fn job<F, Fut>(f: F) -> Job
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

struct Pending {
    /// Distinguishes this timer from any that replaced it
    generation: u64,
    timer: JoinHandle<()>,
    job: Job,
}

#[derive(Default)]
struct SchedulerState {
    pending: HashMap<String, Pending>,
    /// In-flight identifiers; `Some` holds work that arrived during the run
    running: HashMap<String, Option<Job>>,
    next_generation: u64,
}

/// Per-identifier debouncing task runner
#[derive(Clone)]
pub struct DebounceScheduler {
    state: Arc<Mutex<SchedulerState>>,
    quiet_period: Duration,
}

impl DebounceScheduler {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(SchedulerState::default())),
            quiet_period,
        }
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Schedule `job` for `id` after the quiet period
    ///
    /// Replaces (and cancels) any work for `id` whose timer has not fired.
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, id: &str, job: Job) {
        let mut state = self.state();

        if let Some(previous) = state.pending.remove(id) {
            previous.timer.abort();
            debug!(record_id = %id, "Replaced pending debounced work");
        }

        state.next_generation += 1;
        let generation = state.next_generation;

        let scheduler = self.clone();
        let key = id.to_string();
        let quiet_period = self.quiet_period;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            scheduler.fire(&key, generation);
        });

        state.pending.insert(
            id.to_string(),
            Pending {
                generation,
                timer,
                job,
            },
        );
    }

    /// Quiet period elapsed for the timer identified by `generation`
    fn fire(&self, id: &str, generation: u64) {
        let job = {
            let mut state = self.state();

            // A newer enqueue replaced this timer after it woke up
            if state.pending.get(id).map(|p| p.generation) != Some(generation) {
                return;
            }
            let Some(pending) = state.pending.remove(id) else {
                return;
            };

            if let Some(dirty) = state.running.get_mut(id) {
                *dirty = Some(pending.job);
                debug!(record_id = %id, "Run in flight, marked dirty");
                return;
            }

            state.running.insert(id.to_string(), None);
            pending.job
        };

        let scheduler = self.clone();
        let key = id.to_string();
        tokio::spawn(async move {
            scheduler.run(key, job).await;
        });
    }

    /// Run `job`, repeating while new work arrived during the previous run
    async fn run(&self, id: String, mut job: Job) {
        loop {
            debug!(record_id = %id, "Running debounced work");
            if AssertUnwindSafe(job()).catch_unwind().await.is_err() {
                error!(record_id = %id, "Debounced work panicked");
            }

            let mut state = self.state();
            match state.running.get_mut(&id).and_then(Option::take) {
                Some(latest) => {
                    job = latest;
                    debug!(record_id = %id, "Work arrived during run, running again");
                }
                None => {
                    state.running.remove(&id);
                    return;
                }
            }
        }
    }

    /// Whether work for `id` is waiting for its quiet period
    pub fn is_pending(&self, id: &str) -> bool {
        self.state().pending.contains_key(id)
    }

    /// Whether work for `id` is executing
    pub fn is_running(&self, id: &str) -> bool {
        self.state().running.contains_key(id)
    }

    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    pub fn running_count(&self) -> usize {
        self.state().running.len()
    }

    /// Drop all work whose timer has not fired; running work is unaffected
    pub fn cancel_pending(&self) {
        let mut state = self.state();
        for (_, pending) in state.pending.drain() {
            pending.timer.abort();
        }
    }
}
