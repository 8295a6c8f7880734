//! Interceptors run around handler invocation.

mod core;
mod logging;
mod metrics;

pub use core::Middleware;
pub use logging::RequestLoggingMiddleware;
pub use metrics::MetricsMiddleware;
