//! Handler return values and how each kind becomes a response.

use http::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::deferred::{AsyncTask, CancellationToken, DeferredResult, WaitOutcome};
use super::flash::FlashMapManager;
use super::response::{HandlerResponse, ResponseBody};
use crate::binding::{JsonMessageConverter, MessageConverter, StringMessageConverter};
use crate::media::MediaType;
use crate::request::{RequestContext, FLASH_ID_COOKIE};
use crate::router::MatchResult;
use crate::worker_pool::WorkerPool;

/// Default bound on waiting for deferred and async results.
pub const DEFAULT_ASYNC_TIMEOUT: Duration = Duration::from_secs(30);

const REDIRECT_PREFIX: &str = "redirect:";
const FORWARD_PREFIX: &str = "forward:";

/// What a handler hands back.
#[derive(Debug)]
pub enum ReturnValue {
    /// Logical view name plus model. `redirect:` and `forward:` prefixes
    /// are honoured.
    View { name: String, model: Map<String, Value> },
    /// 302 to `target` carrying `flash` attributes to the next request.
    Redirect { target: String, flash: Map<String, Value> },
    /// Structured body written through content negotiation.
    Body(Value),
    /// Response sent as is.
    Raw(HandlerResponse),
    Deferred(DeferredResult),
    Task(AsyncTask),
    Empty,
}

/// Declared return kind of a route, when it should override inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
    View,
    Redirect,
    Body,
    Raw,
    Deferred,
    Task,
    Empty,
}

impl ReturnValue {
    #[must_use]
    pub fn view(name: &str) -> Self {
        Self::View {
            name: name.to_string(),
            model: Map::new(),
        }
    }

    #[must_use]
    pub fn view_with(name: &str, model: Map<String, Value>) -> Self {
        Self::View {
            name: name.to_string(),
            model,
        }
    }

    #[must_use]
    pub fn redirect(target: &str) -> Self {
        Self::Redirect {
            target: target.to_string(),
            flash: Map::new(),
        }
    }

    #[must_use]
    pub fn redirect_with_flash(target: &str, flash: Map<String, Value>) -> Self {
        Self::Redirect {
            target: target.to_string(),
            flash,
        }
    }

    /// Serialize `value` into a [`ReturnValue::Body`].
    ///
    /// # Errors
    ///
    /// `value` cannot be represented as JSON.
    pub fn body<T: Serialize>(value: &T) -> anyhow::Result<Self> {
        Ok(Self::Body(serde_json::to_value(value)?))
    }

    #[must_use]
    pub fn kind(&self) -> ReturnKind {
        match self {
            Self::View { .. } => ReturnKind::View,
            Self::Redirect { .. } => ReturnKind::Redirect,
            Self::Body(_) => ReturnKind::Body,
            Self::Raw(_) => ReturnKind::Raw,
            Self::Deferred(_) => ReturnKind::Deferred,
            Self::Task(_) => ReturnKind::Task,
            Self::Empty => ReturnKind::Empty,
        }
    }
}

/// Renders logical view names.
pub trait ViewRenderer: Send + Sync {
    /// # Errors
    ///
    /// Rendering failed; handled like a handler error.
    fn render(&self, view: &str, model: &Map<String, Value>, request: &RequestContext) -> anyhow::Result<HandlerResponse>;
}

/// Renders `{"view": name, "model": {...}}` as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonViewRenderer;

impl ViewRenderer for JsonViewRenderer {
    fn render(&self, view: &str, model: &Map<String, Value>, _request: &RequestContext) -> anyhow::Result<HandlerResponse> {
        Ok(HandlerResponse::json(
            200,
            serde_json::json!({ "view": view, "model": model }),
        ))
    }
}

/// Result of handling a return value.
#[derive(Debug)]
pub enum DispatchOutcome {
    Response(HandlerResponse),
    /// Re-dispatch the request internally to this path.
    Forward(String),
}

impl DispatchOutcome {
    /// The response, treating an unresolved forward as a server error.
    #[must_use]
    pub fn into_response(self, request: &RequestContext) -> HandlerResponse {
        match self {
            Self::Response(r) => r,
            Self::Forward(target) => HandlerResponse::status_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("unresolved forward to {target}"),
                &request.path,
            ),
        }
    }
}

/// Turns [`ReturnValue`]s into responses.
pub struct ResponseDispatcher {
    writers: Vec<Arc<dyn MessageConverter>>,
    views: Arc<dyn ViewRenderer>,
    flash: Arc<FlashMapManager>,
    pool: Option<Arc<WorkerPool>>,
    async_timeout: Duration,
    async_fallback: Option<Value>,
}

impl std::fmt::Debug for ResponseDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseDispatcher")
            .field("writers", &self.writers.iter().map(|w| w.name()).collect::<Vec<_>>())
            .field("has_pool", &self.pool.is_some())
            .field("async_timeout", &self.async_timeout)
            .field("async_fallback", &self.async_fallback)
            .finish_non_exhaustive()
    }
}

impl ResponseDispatcher {
    #[must_use]
    pub fn new(flash: Arc<FlashMapManager>) -> Self {
        Self {
            writers: vec![Arc::new(StringMessageConverter), Arc::new(JsonMessageConverter)],
            views: Arc::new(JsonViewRenderer),
            flash,
            pool: None,
            async_timeout: DEFAULT_ASYNC_TIMEOUT,
            async_fallback: None,
        }
    }

    /// Pool that runs [`AsyncTask`]s. Without one, tasks are answered 503.
    #[must_use]
    pub fn with_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    #[must_use]
    pub fn with_view_renderer(mut self, views: Arc<dyn ViewRenderer>) -> Self {
        self.views = views;
        self
    }

    /// Body writers, tried in order.
    #[must_use]
    pub fn with_writers(mut self, writers: Vec<Arc<dyn MessageConverter>>) -> Self {
        self.writers = writers;
        self
    }

    #[must_use]
    pub fn with_async_timeout(mut self, timeout: Duration) -> Self {
        self.async_timeout = timeout;
        self
    }

    /// Body sent when an async wait times out without its own timeout value.
    #[must_use]
    pub fn with_async_fallback(mut self, fallback: Option<Value>) -> Self {
        self.async_fallback = fallback;
        self
    }

    #[must_use]
    pub fn flash_manager(&self) -> &Arc<FlashMapManager> {
        &self.flash
    }

    #[must_use]
    pub fn pool(&self) -> Option<&Arc<WorkerPool>> {
        self.pool.as_ref()
    }

    /// Handle a handler's return value.
    pub fn dispatch(
        &self,
        value: ReturnValue,
        declared: Option<ReturnKind>,
        request: &RequestContext,
        matched: &MatchResult,
    ) -> DispatchOutcome {
        let handler = matched.handler_name();
        match value {
            ReturnValue::View { name, model } => {
                if let Some(target) = name.strip_prefix(REDIRECT_PREFIX) {
                    return DispatchOutcome::Response(self.redirect(target, model, request, matched));
                }
                if let Some(target) = name.strip_prefix(FORWARD_PREFIX) {
                    debug!(request_id = %request.request_id, target = %target, "Forwarding request");
                    return DispatchOutcome::Forward(target.to_string());
                }
                if matches!(declared, Some(ReturnKind::Body | ReturnKind::Raw)) {
                    return DispatchOutcome::Response(HandlerResponse::text(200, name));
                }
                let mut merged = request.model.clone();
                merged.extend(model);
                DispatchOutcome::Response(
                    self.views
                        .render(&name, &merged, request)
                        .unwrap_or_else(|e| HandlerResponse::from_handler_error(&e, request, handler)),
                )
            }
            ReturnValue::Redirect { target, flash } => {
                DispatchOutcome::Response(self.redirect(&target, flash, request, matched))
            }
            ReturnValue::Body(value) => DispatchOutcome::Response(self.write_body(&value, request, matched)),
            ReturnValue::Raw(response) => DispatchOutcome::Response(response),
            ReturnValue::Empty => DispatchOutcome::Response(HandlerResponse::empty(200)),
            ReturnValue::Deferred(deferred) => {
                let timeout = deferred.timeout().unwrap_or(self.async_timeout);
                self.await_deferred(&deferred, timeout, None, request, matched)
            }
            ReturnValue::Task(task) => {
                let Some(pool) = &self.pool else {
                    warn!(request_id = %request.request_id, handler_name = %handler, "Async task returned but no worker pool configured");
                    return DispatchOutcome::Response(HandlerResponse::status_error(
                        StatusCode::SERVICE_UNAVAILABLE,
                        "Asynchronous processing is not available",
                        &request.path,
                    ));
                };
                match task.start(pool) {
                    Ok((deferred, token)) => {
                        let timeout = deferred.timeout().unwrap_or(self.async_timeout);
                        self.await_deferred(&deferred, timeout, Some(&token), request, matched)
                    }
                    Err(e) => {
                        warn!(request_id = %request.request_id, handler_name = %handler, error = %e, "Async task rejected");
                        DispatchOutcome::Response(HandlerResponse::error(
                            e.status(),
                            "Service Unavailable",
                            &e.to_string(),
                            &request.path,
                        ))
                    }
                }
            }
        }
    }

    fn await_deferred(
        &self,
        deferred: &DeferredResult,
        timeout: Duration,
        token: Option<&CancellationToken>,
        request: &RequestContext,
        matched: &MatchResult,
    ) -> DispatchOutcome {
        // A1: Waiting for async result
        debug!(
            request_id = %request.request_id,
            handler_name = %matched.handler_name(),
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "Waiting for async result"
        );
        match deferred.wait(timeout, &request.disconnect) {
            WaitOutcome::Completed(Ok(value)) => self.dispatch(value, None, request, matched),
            WaitOutcome::Completed(Err(e)) => DispatchOutcome::Response(HandlerResponse::from_handler_error(
                &e,
                request,
                matched.handler_name(),
            )),
            WaitOutcome::TimedOut => {
                if let Some(token) = token {
                    token.cancel();
                }
                // A2: Async timeout
                warn!(
                    request_id = %request.request_id,
                    handler_name = %matched.handler_name(),
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "Async result timed out"
                );
                if let Some(value) = deferred.expire() {
                    return self.dispatch(value, None, request, matched);
                }
                match &self.async_fallback {
                    Some(fallback) => DispatchOutcome::Response(self.write_body(fallback, request, matched)),
                    None => DispatchOutcome::Response(HandlerResponse::status_error(
                        StatusCode::SERVICE_UNAVAILABLE,
                        "Request processing timed out",
                        &request.path,
                    )),
                }
            }
            WaitOutcome::Disconnected => {
                if let Some(token) = token {
                    token.cancel();
                }
                info!(request_id = %request.request_id, "Client disconnected during async processing");
                DispatchOutcome::Response(HandlerResponse::status_error(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Client disconnected",
                    &request.path,
                ))
            }
        }
    }

    fn redirect(
        &self,
        target: &str,
        flash: Map<String, Value>,
        request: &RequestContext,
        matched: &MatchResult,
    ) -> HandlerResponse {
        let location = expand_placeholders(target, matched);
        let mut response = HandlerResponse::empty(302);
        if !flash.is_empty() {
            let id = self.flash.save(&location, flash);
            let cookie_path = location.split('?').next().unwrap_or("/");
            response.append_header(
                "Set-Cookie",
                format!(
                    "{FLASH_ID_COOKIE}={id}; Path={cookie_path}; Max-Age={}; HttpOnly",
                    self.flash.timeout().as_secs()
                ),
            );
        }
        // R1: Redirect issued
        debug!(
            request_id = %request.request_id,
            location = %location,
            "Redirect issued"
        );
        response.set_header("Location", location);
        response
    }

    /// Content negotiation over the route's `produces`, the accept list
    /// and the body writers.
    fn write_body(&self, value: &Value, request: &RequestContext, matched: &MatchResult) -> HandlerResponse {
        let produces = matched.route.produces();
        let any = [MediaType::all()];
        let producible: &[MediaType] = if produces.is_empty() { &any } else { produces };

        for accepted in request.accept.iter().filter(|a| a.quality() > 0.0) {
            for offered in producible.iter().filter(|p| p.is_compatible_with(accepted)) {
                let media = accepted.most_specific(offered);
                for writer in &self.writers {
                    if !writer.can_write(value, media) {
                        continue;
                    }
                    let content_type = if media.is_concrete() {
                        media.clone()
                    } else {
                        match writer
                            .supported_media_types()
                            .into_iter()
                            .find(|m| m.is_concrete() && media.includes(m))
                        {
                            Some(m) => m,
                            None => continue,
                        }
                    };
                    return match writer.write(value, &content_type) {
                        Ok(body) => {
                            let mut response = HandlerResponse::new(200, Default::default(), ResponseBody::Empty);
                            response.set_header("content-type", content_type.to_string());
                            response.body = body;
                            response
                        }
                        Err(e) => HandlerResponse::from_handler_error(&e, request, matched.handler_name()),
                    };
                }
            }
        }
        HandlerResponse::status_error(
            StatusCode::NOT_ACCEPTABLE,
            "No acceptable representation for the response body",
            &request.path,
        )
    }
}

/// Replace `{name}` with path variables from the match; unknown names are
/// left as they are.
fn expand_placeholders(target: &str, matched: &MatchResult) -> String {
    let mut out = String::with_capacity(target.len());
    let mut rest = target;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match matched.path_variable(name) {
                    Some(value) => out.push_str(&urlencoding::encode(value)),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
