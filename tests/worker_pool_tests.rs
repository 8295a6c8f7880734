#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::runtime::small_pool;
use routebind::worker_pool::{PoolError, WorkerPoolConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// These tests read global env vars. Use a mutex to serialize access.
static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

#[test]
fn test_jobs_run_and_are_counted() {
    let pool = small_pool(2, 4, 64);
    let done = Arc::new(AtomicUsize::new(0));
    for _ in 0..20 {
        let done = Arc::clone(&done);
        pool.submit(move || {
            done.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }
    assert!(wait_until(Duration::from_secs(5), || done.load(Ordering::SeqCst) == 20));
    assert!(wait_until(Duration::from_secs(1), || pool.metrics().get_completed_count() == 20));
    assert_eq!(pool.metrics().get_dispatched_count(), 20);
    assert!(pool.shutdown(Duration::from_secs(5)));
}

#[test]
fn test_shutdown_stops_every_idle_worker() {
    let pool = small_pool(3, 3, 4);
    assert_eq!(pool.metrics().get_workers(), 3);
    assert!(pool.shutdown(Duration::from_secs(2)));
    assert_eq!(pool.metrics().get_workers(), 0);
}

#[test]
fn test_shutdown_drains_queued_jobs_across_workers() {
    let pool = small_pool(3, 3, 64);
    let done = Arc::new(AtomicUsize::new(0));
    for _ in 0..30 {
        let done = Arc::clone(&done);
        pool.submit(move || {
            std::thread::sleep(Duration::from_millis(1));
            done.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }
    assert!(pool.shutdown(Duration::from_secs(5)));
    assert_eq!(done.load(Ordering::SeqCst), 30);
    assert_eq!(pool.metrics().get_workers(), 0);
}

#[test]
fn test_full_queue_at_max_workers_rejects() {
    let pool = small_pool(1, 1, 1);
    let (release_tx, release_rx) = may::sync::mpsc::channel::<()>();
    let started = Arc::new(AtomicUsize::new(0));

    let s = Arc::clone(&started);
    pool.submit(move || {
        s.fetch_add(1, Ordering::SeqCst);
        let _ = release_rx.recv();
    })
    .unwrap();
    assert!(wait_until(Duration::from_secs(5), || started.load(Ordering::SeqCst) == 1));

    // Occupies the single queue slot.
    pool.submit(|| {}).unwrap();
    match pool.submit(|| {}) {
        Err(PoolError::QueueFull { queue_bound, workers }) => {
            assert_eq!(queue_bound, 1);
            assert_eq!(workers, 1);
        }
        other => panic!("expected QueueFull, got {other:?}"),
    }
    assert_eq!(pool.metrics().get_rejected_count(), 1);

    release_tx.send(()).unwrap();
    assert!(pool.shutdown(Duration::from_secs(5)));
}

#[test]
fn test_pool_grows_beyond_core_when_queue_full() {
    let pool = small_pool(1, 3, 1);
    let (release_tx, release_rx) = may::sync::mpsc::channel::<()>();
    let started = Arc::new(AtomicUsize::new(0));

    let s = Arc::clone(&started);
    pool.submit(move || {
        s.fetch_add(1, Ordering::SeqCst);
        let _ = release_rx.recv();
    })
    .unwrap();
    assert!(wait_until(Duration::from_secs(5), || started.load(Ordering::SeqCst) == 1));

    pool.submit(|| {}).unwrap();
    // Queue is at its bound: this submission adds a worker instead of failing.
    pool.submit(|| {}).unwrap();
    assert_eq!(pool.metrics().get_workers(), 2);

    release_tx.send(()).unwrap();
    assert!(pool.shutdown(Duration::from_secs(5)));
}

#[test]
fn test_shutdown_drains_and_stops_intake() {
    let pool = small_pool(2, 2, 64);
    let done = Arc::new(AtomicUsize::new(0));
    for _ in 0..10 {
        let done = Arc::clone(&done);
        pool.submit(move || {
            may::coroutine::sleep(Duration::from_millis(5));
            done.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }
    assert!(pool.shutdown(Duration::from_secs(10)));
    assert_eq!(done.load(Ordering::SeqCst), 10);
    assert!(pool.is_shut_down());
    assert!(matches!(pool.submit(|| {}), Err(PoolError::ShutDown)));
}

#[test]
fn test_panicking_job_does_not_kill_worker() {
    let pool = small_pool(1, 1, 8);
    pool.submit(|| panic!("job failure")).unwrap();
    let done = Arc::new(AtomicUsize::new(0));
    let d = Arc::clone(&done);
    pool.submit(move || {
        d.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    assert!(wait_until(Duration::from_secs(5), || done.load(Ordering::SeqCst) == 1));
    assert_eq!(pool.metrics().get_panicked_count(), 1);
    assert!(pool.shutdown(Duration::from_secs(5)));
}

#[test]
fn test_config_env_overrides() {
    let _guard = ENV_MUTEX.lock().unwrap();
    std::env::set_var("ROUTEBIND_CORE_WORKERS", "3");
    std::env::set_var("ROUTEBIND_STACK_SIZE", "0x4000");
    std::env::set_var("ROUTEBIND_QUEUE_BOUND", "not-a-number");
    let config = WorkerPoolConfig::from_env();
    std::env::remove_var("ROUTEBIND_CORE_WORKERS");
    std::env::remove_var("ROUTEBIND_STACK_SIZE");
    std::env::remove_var("ROUTEBIND_QUEUE_BOUND");

    assert_eq!(config.core_workers, 3);
    assert_eq!(config.stack_size, 0x4000);
    assert_eq!(config.queue_bound, WorkerPoolConfig::default().queue_bound);
}
