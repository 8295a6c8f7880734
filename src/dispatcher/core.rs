//! Dispatcher core module - hot path for request dispatch.
//!
//! `dispatch` runs the whole pipeline for one request: body limit, flash
//! restore, matching, middleware, argument binding, handler invocation
//! (with panic recovery) and return-value handling.

use http::{Method, StatusCode};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::flash::FlashMapManager;
use super::response::HandlerResponse;
use super::returns::{DispatchOutcome, ResponseDispatcher};
use crate::binding::{default_converters, ArgumentBinder, ResolverRegistry};
use crate::error::{MatchError, RegistrationError};
use crate::ids::RouteId;
use crate::mapping::RouteDescriptor;
use crate::middleware::Middleware;
use crate::request::RequestContext;
use crate::router::{MatchResult, RequestMatcher, RouteTable};
use crate::worker_pool::panic_message;

/// Default request body limit (10 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
/// Default bound on chained `forward:` views.
pub const DEFAULT_MAX_FORWARD_DEPTH: usize = 8;

/// Ties the route table, matcher, binder and response handling together.
///
/// Cheap to share behind an `Arc`; routes can be registered and removed
/// while requests are being dispatched.
pub struct Dispatcher {
    table: Arc<RouteTable>,
    matcher: RequestMatcher,
    binder: ArgumentBinder,
    responses: ResponseDispatcher,
    /// Ordered list of middleware to apply to requests/responses
    middlewares: Vec<Arc<dyn Middleware>>,
    max_body_bytes: usize,
    max_forward_depth: usize,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.table.len())
            .field("middlewares", &self.middlewares.len())
            .field("responses", &self.responses)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("max_forward_depth", &self.max_forward_depth)
            .finish()
    }
}

impl Dispatcher {
    /// Dispatcher with an empty route table, the default resolvers and
    /// converters, and no worker pool.
    #[must_use]
    pub fn new() -> Self {
        let registry = Arc::new(ResolverRegistry::with_defaults(default_converters()));
        Self::with_parts(
            Arc::new(RouteTable::new()),
            ArgumentBinder::new(registry),
            ResponseDispatcher::new(Arc::new(FlashMapManager::default())),
        )
    }

    #[must_use]
    pub fn with_parts(table: Arc<RouteTable>, binder: ArgumentBinder, responses: ResponseDispatcher) -> Self {
        Self {
            matcher: RequestMatcher::new(Arc::clone(&table)),
            table,
            binder,
            responses,
            middlewares: Vec::new(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_forward_depth: DEFAULT_MAX_FORWARD_DEPTH,
        }
    }

    #[must_use]
    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    #[must_use]
    pub fn with_max_forward_depth(mut self, depth: usize) -> Self {
        self.max_forward_depth = depth;
        self
    }

    /// Add middleware to the processing pipeline; runs in insertion order.
    pub fn add_middleware(&mut self, mw: Arc<dyn Middleware>) {
        self.middlewares.push(mw);
    }

    /// Check that every parameter has a resolver, then register.
    ///
    /// # Errors
    ///
    /// `NoResolverFound`, or the table's `DuplicateRoute`/`AmbiguousMapping`.
    pub fn register(&self, route: RouteDescriptor) -> Result<RouteId, RegistrationError> {
        self.binder.check_route(&route)?;
        self.table.register(route)
    }

    /// Remove a route; unknown ids are ignored.
    pub fn unregister(&self, id: RouteId) -> bool {
        self.table.unregister(id)
    }

    #[must_use]
    pub fn table(&self) -> &Arc<RouteTable> {
        &self.table
    }

    #[must_use]
    pub fn matcher(&self) -> &RequestMatcher {
        &self.matcher
    }

    #[must_use]
    pub fn binder(&self) -> &ArgumentBinder {
        &self.binder
    }

    #[must_use]
    pub fn responses(&self) -> &ResponseDispatcher {
        &self.responses
    }

    #[must_use]
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Run the full pipeline for one request.
    pub fn dispatch(&self, mut request: RequestContext) -> HandlerResponse {
        // D1: Request received
        debug!(
            request_id = %request.request_id,
            method = %request.method,
            path = %request.path,
            body_bytes = request.body.len(),
            "Dispatching request"
        );

        if request.body.len() > self.max_body_bytes {
            warn!(
                request_id = %request.request_id,
                body_bytes = request.body.len(),
                limit = self.max_body_bytes,
                "Request body exceeds limit"
            );
            return HandlerResponse::status_error(
                StatusCode::PAYLOAD_TOO_LARGE,
                &format!("request body exceeds {} bytes", self.max_body_bytes),
                &request.path,
            );
        }

        if let Some(flash_id) = request.flash_id() {
            if let Some(attributes) = self.responses.flash_manager().take(&flash_id, &request.path) {
                request.model.extend(attributes);
            }
        }

        let mut response = self.dispatch_at_depth(&request, 0);
        if request.method == Method::HEAD {
            response.body = super::response::ResponseBody::Empty;
        }
        response
    }

    fn dispatch_at_depth(&self, request: &RequestContext, depth: usize) -> HandlerResponse {
        let matched = match self.matcher.match_request(request) {
            Ok(m) => m,
            Err(e) => return self.match_failure(request, &e),
        };

        // D4: Middleware before execution
        let mut early: Option<HandlerResponse> = None;
        for (idx, mw) in self.middlewares.iter().enumerate() {
            let resp = mw.before(request, &matched);
            if early.is_none() && resp.is_some() {
                debug!(
                    request_id = %request.request_id,
                    middleware_idx = idx,
                    "Middleware returned early response"
                );
                early = resp;
            }
        }

        let start = Instant::now();
        let mut response = match early {
            Some(r) => r,
            None => self.invoke(request, &matched, depth),
        };
        let latency = start.elapsed();

        // D5: Middleware after execution
        for mw in &self.middlewares {
            mw.after(request, &matched, &mut response, latency);
        }
        response
    }

    fn invoke(&self, request: &RequestContext, matched: &MatchResult, depth: usize) -> HandlerResponse {
        let handler_name = matched.handler_name();
        let args = match self.binder.bind_arguments(&matched.route, matched, request) {
            Ok(args) => args,
            Err(e) => {
                return HandlerResponse::status_error(e.status(), &e.to_string(), &request.path);
            }
        };

        // D3: Request dispatched to handler
        info!(
            request_id = %request.request_id,
            handler_name = %handler_name,
            method = %request.method,
            path = %request.path,
            "Request dispatched to handler"
        );
        let handler = matched.route.handler();
        let outcome = catch_unwind(AssertUnwindSafe(|| handler.invoke(args, request)));
        let value = match outcome {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => return HandlerResponse::from_handler_error(&e, request, handler_name),
            Err(panic) => {
                // H3: Handler panic
                error!(
                    request_id = %request.request_id,
                    handler_name = %handler_name,
                    panic_message = %panic_message(&panic),
                    "Handler panicked - CRITICAL"
                );
                return HandlerResponse::status_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred",
                    &request.path,
                );
            }
        };

        match self
            .responses
            .dispatch(value, matched.route.return_kind(), request, matched)
        {
            DispatchOutcome::Response(r) => r,
            DispatchOutcome::Forward(target) => {
                if depth >= self.max_forward_depth {
                    error!(
                        request_id = %request.request_id,
                        handler_name = %handler_name,
                        target = %target,
                        depth = depth,
                        "Forward depth exceeded"
                    );
                    return HandlerResponse::status_error(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Too many internal forwards",
                        &request.path,
                    );
                }
                let forwarded = request.forwarded_to(&target);
                self.dispatch_at_depth(&forwarded, depth + 1)
            }
        }
    }

    fn match_failure(&self, request: &RequestContext, err: &MatchError) -> HandlerResponse {
        if let MatchError::MethodNotAllowed { allowed, .. } = err {
            let implicit_options = (!allowed.contains(&Method::OPTIONS)).then_some(&Method::OPTIONS);
            let allow = allowed
                .iter()
                .chain(implicit_options)
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            if request.method == Method::OPTIONS {
                let mut response = HandlerResponse::empty(200);
                response.set_header("Allow", allow);
                return response;
            }
            let mut response = HandlerResponse::status_error(err.status(), &err.to_string(), &request.path);
            response.set_header("Allow", allow);
            return response;
        }
        if err.is_fatal() {
            // Already logged by the matcher as a configuration error.
            return HandlerResponse::status_error(
                err.status(),
                "Ambiguous handler mapping",
                &request.path,
            );
        }
        debug!(
            request_id = %request.request_id,
            method = %request.method,
            path = %request.path,
            status = err.status().as_u16(),
            error = %err,
            "Request not matched"
        );
        HandlerResponse::status_error(err.status(), &err.to_string(), &request.path)
    }

    /// Wait for in-flight async work to finish, then stop the worker pool.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        match self.responses.pool() {
            Some(pool) => pool.shutdown(timeout),
            None => true,
        }
    }
}
