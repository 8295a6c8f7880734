use std::time::Duration;

use tracing::{info, warn};

use super::Middleware;
use crate::dispatcher::HandlerResponse;
use crate::request::RequestContext;
use crate::router::MatchResult;

/// Logs one line per handled request: method, path, handler, status and
/// latency. Server errors are logged at `warn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestLoggingMiddleware;

impl Middleware for RequestLoggingMiddleware {
    fn after(&self, req: &RequestContext, matched: &MatchResult, res: &mut HandlerResponse, latency: Duration) {
        let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        if res.status >= 500 {
            warn!(
                request_id = %req.request_id,
                method = %req.method,
                path = %req.path,
                handler_name = %matched.handler_name(),
                status = res.status,
                latency_ms = latency_ms,
                "Request failed"
            );
        } else {
            info!(
                request_id = %req.request_id,
                method = %req.method,
                path = %req.path,
                handler_name = %matched.handler_name(),
                status = res.status,
                latency_ms = latency_ms,
                "Request completed"
            );
        }
    }
}
