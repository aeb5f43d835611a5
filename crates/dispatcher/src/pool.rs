//! WorkerPool - bounded thread pool with caller-runs backpressure
//!
//! Jobs are never queued. A job goes to a parked idle worker, or to a new
//! worker while the pool is below `max_workers`; otherwise it runs on the
//! submitting thread. That last case is the only place a submitter blocks.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use contracts::DispatchPoolConfig;
use tracing::{debug, error, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Floor for `idle_timeout`; a zero timeout would spin parked core workers
const MIN_IDLE_TIMEOUT: Duration = Duration::from_millis(1);

/// How a job was accepted by the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Submission {
    /// Handed to a parked idle worker
    HandedOff,
    /// Started a new worker thread
    Spawned,
    /// Ran synchronously on the submitting thread
    CallerRan,
    /// Nothing to run
    Skipped,
}

impl Submission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Submission::HandedOff => "handed_off",
            Submission::Spawned => "spawned",
            Submission::CallerRan => "caller_ran",
            Submission::Skipped => "skipped",
        }
    }
}

/// Point-in-time worker counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatus {
    /// Worker threads alive
    pub live: usize,
    /// Workers parked waiting for a job
    pub idle: usize,
    /// Jobs accepted by workers and not yet finished
    pub busy: usize,
}

/// Pool sizing
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    pub idle_timeout: Duration,
    pub thread_name_prefix: String,
}

impl From<&DispatchPoolConfig> for PoolConfig {
    fn from(config: &DispatchPoolConfig) -> Self {
        Self {
            min_workers: config.min_workers,
            max_workers: config.max_workers,
            idle_timeout: config.idle_timeout(),
            thread_name_prefix: config.thread_name_prefix.clone(),
        }
    }
}

struct PoolState {
    live: usize,
    idle: usize,
    busy: usize,
    // Jobs handed off but not yet picked up; never longer than `idle` plus
    // the workers still starting up
    handoff: VecDeque<Job>,
    shutdown: bool,
}

struct Shared {
    config: PoolConfig,
    state: Mutex<PoolState>,
    job_ready: Condvar,
    drained: Condvar,
    next_id: AtomicUsize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Bounded worker pool
///
/// Workers beyond `min_workers` exit after `idle_timeout` without work.
/// Worker threads are detached and never block process exit.
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Create an empty pool; workers start lazily on first submissions
    pub fn new(mut config: PoolConfig) -> Self {
        config.max_workers = config.max_workers.max(1);
        config.idle_timeout = config.idle_timeout.max(MIN_IDLE_TIMEOUT);
        config.min_workers = config.min_workers.min(config.max_workers);

        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(PoolState {
                    live: 0,
                    idle: 0,
                    busy: 0,
                    handoff: VecDeque::new(),
                    shutdown: false,
                }),
                job_ready: Condvar::new(),
                drained: Condvar::new(),
                next_id: AtomicUsize::new(0),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Run `job` on the pool, or on the calling thread when saturated
    pub fn execute<F>(&self, job: F) -> Submission
    where
        F: FnOnce() + Send + 'static,
    {
        let job: Job = Box::new(job);
        let config = &self.shared.config;
        let mut state = self.shared.lock();

        if !state.shutdown {
            if state.live >= config.min_workers && state.idle > state.handoff.len() {
                state.busy += 1;
                state.handoff.push_back(job);
                drop(state);
                self.shared.job_ready.notify_one();
                return Submission::HandedOff;
            }

            if state.live < config.max_workers {
                match self.spawn_worker(&mut state, job) {
                    Ok(()) => return Submission::Spawned,
                    Err(job) => {
                        drop(state);
                        run_job(job);
                        return Submission::CallerRan;
                    }
                }
            }
        }

        drop(state);
        run_job(job);
        Submission::CallerRan
    }

    /// Start a worker that picks `job` up first
    ///
    /// Called with the pool lock held, so the new worker cannot observe the
    /// state before the job is queued. Returns the job back when the thread
    /// cannot be created.
    fn spawn_worker(&self, state: &mut PoolState, job: Job) -> Result<(), Job> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{}", self.shared.config.thread_name_prefix, id);

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_loop(shared));

        match spawned {
            Ok(_detached) => {
                state.live += 1;
                state.busy += 1;
                state.handoff.push_back(job);
                debug!(worker = %name, live = state.live, "Dispatch worker started");
                Ok(())
            }
            Err(e) => {
                warn!(worker = %name, error = %e, "Failed to spawn dispatch worker");
                Err(job)
            }
        }
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.shared.lock();
        PoolStatus {
            live: state.live,
            idle: state.idle,
            busy: state.busy,
        }
    }

    /// Block until no accepted job is running, or `timeout` elapses
    ///
    /// Returns `true` when the pool drained in time.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = deadline_after(timeout);
        let drained = &self.shared.drained;
        let mut state = self.shared.lock();
        while state.busy > 0 {
            state = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    drained
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => drained.wait(state).unwrap_or_else(PoisonError::into_inner),
            };
        }
        true
    }

    /// Stop accepting work; parked workers exit
    ///
    /// Jobs already handed off still run. Later submissions run on the caller.
    pub fn shutdown(&self) {
        let mut state = self.shared.lock();
        if state.shutdown {
            return;
        }
        state.shutdown = true;
        debug!(live = state.live, busy = state.busy, "Dispatch pool shutting down");
        drop(state);
        self.shared.job_ready.notify_all();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: Arc<Shared>) {
    let config = &shared.config;
    let mut state = shared.lock();

    loop {
        state.idle += 1;
        let mut deadline = deadline_after(config.idle_timeout);

        let job = loop {
            if let Some(job) = state.handoff.pop_front() {
                state.idle -= 1;
                break Some(job);
            }
            if state.shutdown {
                break None;
            }

            state = match deadline {
                Some(at) => {
                    let now = Instant::now();
                    if now >= at {
                        if state.live > config.min_workers {
                            break None;
                        }
                        deadline = deadline_after(config.idle_timeout);
                        continue;
                    }
                    shared
                        .job_ready
                        .wait_timeout(state, at - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                // Timeout beyond what `Instant` can represent: park until woken
                None => shared
                    .job_ready
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        };

        let Some(job) = job else {
            state.idle -= 1;
            state.live -= 1;
            debug!(live = state.live, "Dispatch worker exiting");
            return;
        };

        drop(state);
        run_job(job);

        state = shared.lock();
        state.busy -= 1;
        if state.busy == 0 {
            shared.drained.notify_all();
        }
    }
}

/// `None` when `timeout` runs past the range of `Instant`
fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

fn run_job(job: Job) {
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        error!("Dispatch job panicked");
    }
}
