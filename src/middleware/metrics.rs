use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use super::Middleware;
use crate::dispatcher::HandlerResponse;
use crate::request::RequestContext;
use crate::router::MatchResult;

/// Request counters for matched requests.
///
/// All counters use atomic operations; per-handler counts live in a
/// concurrent map keyed by handler name.
#[derive(Debug, Default)]
pub struct MetricsMiddleware {
    request_count: AtomicUsize,
    total_latency_ns: AtomicU64,
    client_errors: AtomicUsize,
    server_errors: AtomicUsize,
    per_handler: DashMap<String, usize>,
}

impl MetricsMiddleware {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the total number of requests processed
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Mean processing time, zero before the first request.
    pub fn average_latency(&self) -> Duration {
        let count = self.request_count.load(Ordering::Relaxed) as u64;
        if count == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / count)
        }
    }

    pub fn client_errors(&self) -> usize {
        self.client_errors.load(Ordering::Relaxed)
    }

    pub fn server_errors(&self) -> usize {
        self.server_errors.load(Ordering::Relaxed)
    }

    pub fn handler_count(&self, handler: &str) -> usize {
        self.per_handler.get(handler).map_or(0, |c| *c)
    }
}

impl Middleware for MetricsMiddleware {
    fn after(&self, _req: &RequestContext, matched: &MatchResult, res: &mut HandlerResponse, latency: Duration) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ns.fetch_add(
            u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
        match res.status {
            400..=499 => {
                self.client_errors.fetch_add(1, Ordering::Relaxed);
            }
            500..=599 => {
                self.server_errors.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        *self.per_handler.entry(matched.handler_name().to_string()).or_insert(0) += 1;
    }
}
