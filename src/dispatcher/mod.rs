//! # Dispatcher Module
//!
//! Runs a request through matching, binding, the handler and response
//! handling, and turns every failure into a structured error response.
//!
//! ## Request Flow
//!
//! 1. Bodies above the configured limit are rejected with 413
//! 2. Flash attributes stored by a previous redirect are restored into the
//!    request model
//! 3. [`crate::router::RequestMatcher`] selects the route; match failures
//!    map to 404/405/400/415/406 (405 and `OPTIONS` carry an `Allow` header)
//! 4. Middleware `before` hooks run and may short-circuit
//! 5. [`crate::binding::ArgumentBinder`] resolves the handler's arguments
//! 6. The handler runs under panic recovery
//! 7. [`ResponseDispatcher`] turns the [`ReturnValue`] into a response:
//!    redirects, forwards, views, negotiated bodies, raw responses and
//!    deferred/async results
//! 8. Middleware `after` hooks run; `HEAD` responses lose their body
//!
//! ## Error Handling
//!
//! - [`crate::error::ClientError`] and [`crate::error::BindingError`] keep
//!   their status and message
//! - any other handler error or panic becomes a generic 500; the details
//!   are logged, never sent
//!
//! ## Asynchronous Results
//!
//! [`DeferredResult`] and [`AsyncTask`] are awaited up to their own timeout
//! or the dispatcher default (30 s). On timeout the task is cancelled, its
//! timeout callback runs, and the timeout value, the configured fallback,
//! or a 503 is sent. Completions after that point are ignored.

mod core;
mod deferred;
mod flash;
mod response;
mod returns;

pub use core::{Dispatcher, DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_FORWARD_DEPTH};
pub use deferred::{AsyncTask, CancellationToken, DeferredResult, WaitOutcome};
pub use flash::{FlashMapManager, DEFAULT_FLASH_TIMEOUT};
pub use response::{HandlerResponse, ResponseBody};
pub use returns::{
    DispatchOutcome, JsonViewRenderer, ResponseDispatcher, ReturnKind, ReturnValue, ViewRenderer,
    DEFAULT_ASYNC_TIMEOUT,
};
