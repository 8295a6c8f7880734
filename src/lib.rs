//! # routebind
//!
//! **routebind** is the request-mapping and argument-binding core of an
//! MVC-style web framework: it decides which handler serves a request, turns
//! the request into that handler's typed arguments, and turns whatever the
//! handler returns into a response. It has no socket layer of its own; a
//! transport builds a [`request::RequestContext`] and hands it to a
//! [`dispatcher::Dispatcher`].
//!
//! ## Architecture
//!
//! - **[`mapping`]** - Route descriptors, parameter metadata, handler refs and
//!   declarative route files
//! - **[`router`]** - Path patterns, conditions, the copy-on-write
//!   [`router::RouteTable`] and the most-specific-match [`router::RequestMatcher`]
//! - **[`binding`]** - Argument resolvers, type conversion, message converters
//!   and validation
//! - **[`dispatcher`]** - The request pipeline and return-value handling
//!   (views, redirects with flash attributes, negotiated bodies, deferred and
//!   async results)
//! - **[`worker_pool`]** - Bounded `may` coroutine pool for async handler work
//! - **[`middleware`]** - `before`/`after` interceptors (logging, metrics)
//! - **[`admin`]** - Runtime route generation and unloading
//! - **[`typed`]** - Type-safe handler traits
//! - **[`config`]**, **[`telemetry`]**, **[`cli`]** - Configuration, logging
//!   setup and the `routebind` binary
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Transport
//!     participant Dispatcher
//!     participant Matcher as RequestMatcher
//!     participant MW as Middleware
//!     participant Binder as ArgumentBinder
//!     participant Handler
//!     participant Responses as ResponseDispatcher
//!
//!     Transport->>Dispatcher: dispatch(RequestContext)
//!     Dispatcher->>Dispatcher: body limit (413), flash restore
//!     Dispatcher->>Matcher: match_request
//!     alt no route
//!         Matcher-->>Dispatcher: MatchError (404/405/400/415/406)
//!         Dispatcher-->>Transport: JSON error body
//!     end
//!     Matcher-->>Dispatcher: MatchResult (route, path variables)
//!     Dispatcher->>MW: before
//!     Dispatcher->>Binder: bind_arguments
//!     alt binding failure
//!         Binder-->>Dispatcher: BindingError (400/415)
//!     end
//!     Dispatcher->>Handler: invoke(args, request)
//!     Handler-->>Dispatcher: ReturnValue
//!     Dispatcher->>Responses: dispatch(value)
//!     Responses-->>Dispatcher: response, or forward to another path
//!     Dispatcher->>MW: after
//!     Dispatcher-->>Transport: HandlerResponse
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use http::Method;
//! use routebind::dispatcher::{Dispatcher, ReturnValue};
//! use routebind::mapping::{DeclaredType, ParameterDescriptor, RouteDescriptor};
//! use routebind::request::RequestContext;
//!
//! let dispatcher = Dispatcher::new();
//! dispatcher.register(
//!     RouteDescriptor::builder("/items/{id}")
//!         .method(Method::GET)
//!         .parameter(ParameterDescriptor::path_variable("id", DeclaredType::Integer))
//!         .handler("get_item", |args, _req| {
//!             Ok(ReturnValue::Body(serde_json::json!({ "id": args.i64("id") })))
//!         })
//!         .build()?,
//! )?;
//!
//! let response = dispatcher.dispatch(RequestContext::builder(Method::GET, "/items/42").build());
//! assert_eq!(response.status, 200);
//! ```
//!
//! ## Logging
//!
//! Every stage logs through `tracing` with structured fields. Call
//! [`telemetry::init_logging`] once at startup; see that module for the
//! `ROUTEBIND_LOG_*` variables.

pub mod admin;
pub mod binding;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod ids;
pub mod mapping;
pub mod media;
pub mod middleware;
pub mod multipart;
pub mod request;
pub mod router;
pub mod session;
pub mod telemetry;
pub mod typed;
pub mod worker_pool;

pub use admin::AdminEndpoints;
pub use config::AppConfig;
pub use dispatcher::{Dispatcher, HandlerResponse, ReturnValue};
pub use error::{BindingError, ClientError, MatchError, RegistrationError};
pub use mapping::{load_routes, RouteDescriptor};
pub use request::RequestContext;
pub use router::{RequestMatcher, RouteTable};
pub use worker_pool::{WorkerPool, WorkerPoolConfig};
