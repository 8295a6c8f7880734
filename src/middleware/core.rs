use std::time::Duration;

use crate::dispatcher::HandlerResponse;
use crate::request::RequestContext;
use crate::router::MatchResult;

/// Interceptor around handler invocation.
///
/// `before` runs in registration order once a route has matched; the first
/// `Some` response short-circuits binding and the handler, but every
/// middleware's `before` is still called. `after` runs for every matched
/// request, including short-circuited and failed ones.
pub trait Middleware: Send + Sync {
    fn before(&self, _req: &RequestContext, _matched: &MatchResult) -> Option<HandlerResponse> {
        None
    }
    fn after(&self, _req: &RequestContext, _matched: &MatchResult, _res: &mut HandlerResponse, _latency: Duration) {}
}
