//! # Worker Pool Module
//!
//! Runs deferred handler work (`AsyncTask`s) on `may` coroutines.
//!
//! ## Features
//!
//! - **Explicit lifecycle**: constructed from a [`WorkerPoolConfig`], stopped
//!   with [`WorkerPool::shutdown`]
//! - **Shared queue**: all workers pull from one multi-consumer channel;
//!   shutdown queues one stop message per live worker behind pending jobs
//! - **Bounded growth**: extra workers up to `max_workers` are spawned only
//!   when the queue is full; past that, jobs are rejected with
//!   [`PoolError::QueueFull`]
//! - **Metrics**: queue depth, dispatch/completion/rejection counts
//!
//! ## Configuration
//!
//! - `ROUTEBIND_CORE_WORKERS`: workers started with the pool (default: 4)
//! - `ROUTEBIND_MAX_WORKERS`: upper bound on workers (default: 16)
//! - `ROUTEBIND_QUEUE_BOUND`: queued jobs before growing/rejecting (default: 1024)
//! - `ROUTEBIND_STACK_SIZE`: coroutine stack size, decimal or `0x` hex (default: 64KB)

use may::sync::mpmc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Unit of work accepted by the pool.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    Stop,
}

/// Configuration for a worker pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Workers spawned at construction
    pub core_workers: usize,
    /// Hard upper bound on workers
    pub max_workers: usize,
    /// Maximum queued (not yet started) jobs
    pub queue_bound: usize,
    /// Stack size for worker coroutines
    pub stack_size: usize,
}

fn parse_stack_size(s: &str) -> Option<usize> {
    if let Some(hex) = s.strip_prefix("0x") {
        usize::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

impl WorkerPoolConfig {
    /// Load configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `ROUTEBIND_*` overrides on top of `self`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(n) = env_parse("ROUTEBIND_CORE_WORKERS") {
            self.core_workers = n;
        }
        if let Some(n) = env_parse("ROUTEBIND_MAX_WORKERS") {
            self.max_workers = n;
        }
        if let Some(n) = env_parse("ROUTEBIND_QUEUE_BOUND") {
            self.queue_bound = n;
        }
        if let Some(n) = std::env::var("ROUTEBIND_STACK_SIZE")
            .ok()
            .and_then(|s| parse_stack_size(&s))
        {
            self.stack_size = n;
        }
        self
    }

    /// Create a custom configuration
    #[must_use]
    pub fn new(core_workers: usize, max_workers: usize, queue_bound: usize, stack_size: usize) -> Self {
        Self {
            core_workers,
            max_workers,
            queue_bound,
            stack_size,
        }
    }
}

fn env_parse(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            core_workers: 4,
            max_workers: 16,
            queue_bound: 1024,
            stack_size: 0x10000, // 64KB
        }
    }
}

/// Why a job was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Queue full and no more workers may be added
    QueueFull { queue_bound: usize, workers: usize },
    /// The pool is shutting down or has shut down
    ShutDown,
    /// A worker coroutine could not be spawned
    Spawn(String),
}

impl PoolError {
    /// Every pool rejection surfaces to clients as 503.
    #[must_use]
    pub fn status(&self) -> u16 {
        503
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull {
                queue_bound,
                workers,
            } => write!(f, "worker pool saturated ({workers} workers, {queue_bound} queued jobs)"),
            Self::ShutDown => write!(f, "worker pool is shut down"),
            Self::Spawn(e) => write!(f, "failed to spawn worker coroutine: {e}"),
        }
    }
}

impl std::error::Error for PoolError {}

/// Metrics for a worker pool
#[derive(Debug, Default)]
pub struct WorkerPoolMetrics {
    /// Jobs rejected because the pool was saturated
    pub rejected_count: AtomicU64,
    /// Jobs queued but not yet picked up (approximate)
    pub queue_depth: AtomicUsize,
    /// Total jobs accepted
    pub dispatched_count: AtomicU64,
    /// Total jobs finished (including panicked ones)
    pub completed_count: AtomicU64,
    /// Jobs that panicked
    pub panicked_count: AtomicU64,
    /// Live worker coroutines
    pub workers: AtomicUsize,
}

impl WorkerPoolMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_rejected(&self) {
        self.rejected_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch(&self) {
        self.dispatched_count.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    fn record_dequeue(&self) {
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_completion(&self) {
        self.completed_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_rejected_count(&self) -> u64 {
        self.rejected_count.load(Ordering::Relaxed)
    }

    pub fn get_queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    pub fn get_dispatched_count(&self) -> u64 {
        self.dispatched_count.load(Ordering::Relaxed)
    }

    pub fn get_completed_count(&self) -> u64 {
        self.completed_count.load(Ordering::Relaxed)
    }

    pub fn get_panicked_count(&self) -> u64 {
        self.panicked_count.load(Ordering::Relaxed)
    }

    pub fn get_workers(&self) -> usize {
        self.workers.load(Ordering::Relaxed)
    }
}

/// Coroutine worker pool with a bounded queue.
///
/// Shared by `Arc` with whatever submits work to it. Workers added beyond
/// `core_workers` stay alive until shutdown.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    sender: Mutex<Option<mpmc::Sender<Message>>>,
    receiver: Mutex<mpmc::Receiver<Message>>,
    metrics: Arc<WorkerPoolMetrics>,
    shutting_down: AtomicBool,
    next_worker_id: AtomicUsize,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("workers", &self.metrics.get_workers())
            .field("queue_depth", &self.metrics.get_queue_depth())
            .finish()
    }
}

impl WorkerPool {
    /// Create a pool and start `core_workers` coroutines.
    ///
    /// `max_workers` is raised to `core_workers` when smaller, and a zero
    /// queue bound is treated as one.
    ///
    /// # Errors
    ///
    /// [`PoolError::Spawn`] when no core worker could be started.
    pub fn new(mut config: WorkerPoolConfig) -> Result<Arc<Self>, PoolError> {
        config.max_workers = config.max_workers.max(config.core_workers).max(1);
        config.queue_bound = config.queue_bound.max(1);
        let (tx, rx) = mpmc::channel::<Message>();

        info!(
            core_workers = config.core_workers,
            max_workers = config.max_workers,
            queue_bound = config.queue_bound,
            stack_size = config.stack_size,
            "Creating worker pool"
        );

        let pool = Arc::new(Self {
            config,
            sender: Mutex::new(Some(tx)),
            receiver: Mutex::new(rx),
            metrics: Arc::new(WorkerPoolMetrics::new()),
            shutting_down: AtomicBool::new(false),
            next_worker_id: AtomicUsize::new(0),
        });

        let mut last_error = None;
        for _ in 0..pool.config.core_workers {
            if let Err(e) = pool.spawn_worker() {
                last_error = Some(e);
            }
        }
        match last_error {
            Some(e) if pool.metrics.get_workers() == 0 && pool.config.core_workers > 0 => Err(e),
            _ => Ok(pool),
        }
    }

    /// Pool configured from `ROUTEBIND_*` environment variables.
    ///
    /// # Errors
    ///
    /// See [`WorkerPool::new`].
    pub fn from_env() -> Result<Arc<Self>, PoolError> {
        Self::new(WorkerPoolConfig::from_env())
    }

    fn spawn_worker(&self) -> Result<(), PoolError> {
        let worker_id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let rx = self.receiver.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let metrics = Arc::clone(&self.metrics);
        metrics.workers.fetch_add(1, Ordering::Relaxed);

        // SAFETY: may::coroutine::Builder::spawn() is marked unsafe by the may
        // runtime. The closure owns all of its state (Arc and receiver clones), is Send and
        // 'static, and catches panics from jobs so the coroutine never unwinds.
        let spawn_result = unsafe {
            may::coroutine::Builder::new()
                .stack_size(self.config.stack_size)
                .spawn(move || {
                    debug!(worker_id = worker_id, "Worker coroutine started");
                    // Each worker holds a receiver clone; jobs go to whichever is idle.
                    while let Ok(Message::Run(job)) = rx.recv() {
                        metrics.record_dequeue();
                        if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)) {
                            metrics.panicked_count.fetch_add(1, Ordering::Relaxed);
                            error!(
                                worker_id = worker_id,
                                panic_message = ?panic_message(&panic),
                                "Pool job panicked"
                            );
                        }
                        metrics.record_completion();
                    }
                    metrics.workers.fetch_sub(1, Ordering::Relaxed);
                    debug!(worker_id = worker_id, "Worker coroutine exiting");
                })
        };

        spawn_result.map(|_| ()).map_err(|e| {
            self.metrics.workers.fetch_sub(1, Ordering::Relaxed);
            error!(worker_id = worker_id, error = %e, "Failed to spawn worker coroutine");
            PoolError::Spawn(e.to_string())
        })
    }

    /// Queue a job.
    ///
    /// # Errors
    ///
    /// - [`PoolError::ShutDown`] once [`WorkerPool::shutdown`] has begun
    /// - [`PoolError::QueueFull`] when the queue is at its bound and the
    ///   pool already runs `max_workers`
    pub fn submit<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(PoolError::ShutDown);
        }

        if self.metrics.get_queue_depth() >= self.config.queue_bound {
            let workers = self.metrics.get_workers();
            if workers >= self.config.max_workers {
                self.metrics.record_rejected();
                warn!(
                    workers = workers,
                    queue_bound = self.config.queue_bound,
                    "Worker pool saturated - rejecting job"
                );
                return Err(PoolError::QueueFull {
                    queue_bound: self.config.queue_bound,
                    workers,
                });
            }
            info!(workers = workers + 1, "Queue full - growing worker pool");
            self.spawn_worker()?;
        }

        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            return Err(PoolError::ShutDown);
        };
        self.metrics.record_dispatch();
        sender.send(Message::Run(Box::new(job))).map_err(|_| {
            self.metrics.record_dequeue();
            PoolError::ShutDown
        })
    }

    /// Stop accepting jobs and wait up to `timeout` for queued and running
    /// jobs to finish. Returns `true` when every worker exited in time.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        self.shutting_down.store(true, Ordering::Release);
        // Stops queue behind pending jobs, so workers drain before exiting.
        if let Some(sender) = self.sender.lock().unwrap_or_else(PoisonError::into_inner).take() {
            for _ in 0..self.metrics.get_workers() {
                if sender.send(Message::Stop).is_err() {
                    break;
                }
            }
        }

        let deadline = Instant::now() + timeout;
        while self.metrics.get_workers() > 0 {
            if Instant::now() >= deadline {
                warn!(
                    remaining_workers = self.metrics.get_workers(),
                    queue_depth = self.metrics.get_queue_depth(),
                    "Worker pool shutdown timed out"
                );
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        info!(
            completed = self.metrics.get_completed_count(),
            "Worker pool shut down"
        );
        true
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Get metrics for this worker pool
    #[must_use]
    pub fn metrics(&self) -> &Arc<WorkerPoolMetrics> {
        &self.metrics
    }

    /// Get configuration for this worker pool
    #[must_use]
    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
