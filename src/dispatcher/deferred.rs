//! Asynchronous return values.
//!
//! A handler returns a [`DeferredResult`] when some other thread will
//! produce the value, or an [`AsyncTask`] to have the work run on the
//! injected [`WorkerPool`]. Either way the dispatcher waits, bounded by a
//! timeout, and a completion that arrives after the timeout is dropped.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

use super::returns::ReturnValue;
use crate::worker_pool::{panic_message, PoolError, WorkerPool};

/// Wait granularity for noticing client disconnects.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Cooperative cancellation flag shared between a request and its work.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

type TimeoutCallback = Box<dyn FnOnce() + Send + 'static>;

enum DeferredState {
    Pending,
    Ready(anyhow::Result<ReturnValue>),
    Taken,
    Expired,
}

struct Shared {
    state: Mutex<DeferredState>,
    ready: Condvar,
    timeout: Option<Duration>,
    timeout_result: Mutex<Option<ReturnValue>>,
    on_timeout: Mutex<Option<TimeoutCallback>>,
}

/// How a wait on a [`DeferredResult`] ended.
#[derive(Debug)]
pub enum WaitOutcome {
    Completed(anyhow::Result<ReturnValue>),
    TimedOut,
    Disconnected,
}

/// A value some other thread will set later.
///
/// Clones share the same slot. The first `set_result`/`set_error` wins; once
/// the dispatcher has given up waiting, setters return `false`.
#[derive(Clone)]
pub struct DeferredResult {
    shared: Arc<Shared>,
}

impl fmt::Debug for DeferredResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.lock_state() {
            DeferredState::Pending => "pending",
            DeferredState::Ready(_) => "ready",
            DeferredState::Taken => "taken",
            DeferredState::Expired => "expired",
        };
        f.debug_struct("DeferredResult")
            .field("state", &state)
            .field("timeout", &self.shared.timeout)
            .finish()
    }
}

impl Default for DeferredResult {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredResult {
    /// Deferred result using the dispatcher's default timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Some(timeout))
    }

    fn build(timeout: Option<Duration>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(DeferredState::Pending),
                ready: Condvar::new(),
                timeout,
                timeout_result: Mutex::new(None),
                on_timeout: Mutex::new(None),
            }),
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.shared.timeout
    }

    /// Value to send instead when the wait times out.
    pub fn set_timeout_result(&self, value: ReturnValue) {
        *self
            .shared
            .timeout_result
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(value);
    }

    /// Callback run once if the wait times out, before the fallback is sent.
    pub fn on_timeout<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self
            .shared
            .on_timeout
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(callback));
    }

    /// Complete with a value. Returns `false` if already completed or expired.
    pub fn set_result(&self, value: ReturnValue) -> bool {
        self.complete(Ok(value))
    }

    /// Complete with a failure, handled like a handler error.
    pub fn set_error(&self, error: anyhow::Error) -> bool {
        self.complete(Err(error))
    }

    fn complete(&self, outcome: anyhow::Result<ReturnValue>) -> bool {
        let mut state = self.lock_state();
        match *state {
            DeferredState::Pending => {
                *state = DeferredState::Ready(outcome);
                self.shared.ready.notify_all();
                true
            }
            DeferredState::Expired => {
                debug!("Late completion of expired deferred result ignored");
                false
            }
            _ => false,
        }
    }

    /// Whether a value was set or the wait already expired.
    #[must_use]
    pub fn is_set_or_expired(&self) -> bool {
        !matches!(*self.lock_state(), DeferredState::Pending)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, DeferredState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until completion, `timeout`, or `disconnect` is cancelled.
    ///
    /// A timed-out or disconnected wait marks the slot expired so later
    /// completions are rejected.
    pub fn wait(&self, timeout: Duration, disconnect: &CancellationToken) -> WaitOutcome {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock_state();
        loop {
            if let DeferredState::Ready(_) = *state {
                if let DeferredState::Ready(outcome) = std::mem::replace(&mut *state, DeferredState::Taken) {
                    return WaitOutcome::Completed(outcome);
                }
            }
            if matches!(*state, DeferredState::Taken | DeferredState::Expired) {
                return WaitOutcome::TimedOut;
            }
            if disconnect.is_cancelled() {
                *state = DeferredState::Expired;
                return WaitOutcome::Disconnected;
            }
            let now = Instant::now();
            if now >= deadline {
                *state = DeferredState::Expired;
                return WaitOutcome::TimedOut;
            }
            let slice = (deadline - now).min(POLL_INTERVAL);
            let (guard, _) = self
                .shared
                .ready
                .wait_timeout(state, slice)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    /// Run the timeout callback (once) and hand back the timeout value.
    pub(crate) fn expire(&self) -> Option<ReturnValue> {
        let callback = self
            .shared
            .on_timeout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(callback) = callback {
            if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback)) {
                tracing::error!(panic_message = %panic_message(&panic), "Timeout callback panicked");
            }
        }
        self.shared
            .timeout_result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

type TaskFn = Box<dyn FnOnce(CancellationToken) -> anyhow::Result<ReturnValue> + Send + 'static>;

/// Work to run on the worker pool; the result is dispatched when it
/// completes within its timeout.
///
/// The task receives a [`CancellationToken`] that is cancelled when the
/// wait times out or the client disconnects.
pub struct AsyncTask {
    job: TaskFn,
    timeout: Option<Duration>,
    timeout_result: Option<Box<ReturnValue>>,
    on_timeout: Option<TimeoutCallback>,
}

impl fmt::Debug for AsyncTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncTask")
            .field("timeout", &self.timeout)
            .field("has_timeout_result", &self.timeout_result.is_some())
            .finish_non_exhaustive()
    }
}

impl AsyncTask {
    pub fn new<F>(job: F) -> Self
    where
        F: FnOnce(CancellationToken) -> anyhow::Result<ReturnValue> + Send + 'static,
    {
        Self {
            job: Box::new(job),
            timeout: None,
            timeout_result: None,
            on_timeout: None,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn timeout_result(mut self, value: ReturnValue) -> Self {
        self.timeout_result = Some(Box::new(value));
        self
    }

    #[must_use]
    pub fn on_timeout<F>(mut self, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_timeout = Some(Box::new(callback));
        self
    }

    /// Submit to `pool`, returning the slot the result lands in and the
    /// token that cancels the task.
    ///
    /// # Errors
    ///
    /// The pool rejected the job.
    pub fn start(self, pool: &WorkerPool) -> Result<(DeferredResult, CancellationToken), PoolError> {
        let deferred = DeferredResult::build(self.timeout);
        if let Some(value) = self.timeout_result {
            deferred.set_timeout_result(*value);
        }
        if let Some(callback) = self.on_timeout {
            deferred.on_timeout(callback);
        }

        let token = CancellationToken::new();
        let slot = deferred.clone();
        let task_token = token.clone();
        let job = self.job;
        pool.submit(move || {
            if task_token.is_cancelled() {
                debug!("Async task cancelled before start");
                return;
            }
            match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| job(task_token))) {
                Ok(outcome) => {
                    slot.complete(outcome);
                }
                Err(panic) => {
                    slot.set_error(anyhow::anyhow!("async task panicked: {}", panic_message(&panic)));
                }
            }
        })?;
        Ok((deferred, token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_completion_wins() {
        let d = DeferredResult::new();
        assert!(d.set_result(ReturnValue::Body(json!(1))));
        assert!(!d.set_result(ReturnValue::Body(json!(2))));
        match d.wait(Duration::from_millis(10), &CancellationToken::new()) {
            WaitOutcome::Completed(Ok(ReturnValue::Body(v))) => assert_eq!(v, json!(1)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_late_completion_rejected() {
        let d = DeferredResult::with_timeout(Duration::from_millis(5));
        assert!(matches!(
            d.wait(Duration::from_millis(5), &CancellationToken::new()),
            WaitOutcome::TimedOut
        ));
        assert!(d.is_set_or_expired());
        assert!(!d.set_result(ReturnValue::Empty));
    }

    #[test]
    fn test_completion_from_other_thread() {
        let d = DeferredResult::new();
        let writer = d.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            writer.set_result(ReturnValue::Body(json!("done")))
        });
        let outcome = d.wait(Duration::from_secs(2), &CancellationToken::new());
        assert!(handle.join().unwrap());
        assert!(matches!(outcome, WaitOutcome::Completed(Ok(_))));
    }

    #[test]
    fn test_disconnect_stops_wait() {
        let d = DeferredResult::new();
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            d.wait(Duration::from_secs(5), &token),
            WaitOutcome::Disconnected
        ));
    }

    #[test]
    fn test_expire_runs_callback_once() {
        use std::sync::atomic::AtomicUsize;
        let d = DeferredResult::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        d.on_timeout(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        d.set_timeout_result(ReturnValue::Body(json!("fallback")));
        assert!(matches!(d.expire(), Some(ReturnValue::Body(_))));
        assert!(d.expire().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
