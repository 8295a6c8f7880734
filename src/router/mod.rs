//! # Router Module
//!
//! Request-mapping resolution: which registered route, if any, handles a
//! request.
//!
//! ## Overview
//!
//! - [`PathPattern`] parses `/items/{id:\d+}/**`-style templates into
//!   literal, variable, wildcard and catch-all segments
//! - [`NameValueExpression`] and [`MediaTypeExpression`] are the
//!   param/header and consumes conditions a route can declare
//! - [`RouteTable`] stores registered routes as copy-on-write snapshots and
//!   rejects duplicate or ambiguous mappings
//! - [`RequestMatcher`] filters candidates stage by stage and ranks the
//!   survivors by [`Specificity`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use routebind::router::{RequestMatcher, RouteTable};
//!
//! let table = Arc::new(RouteTable::new());
//! table.register(route)?;
//! let matcher = RequestMatcher::new(Arc::clone(&table));
//! let matched = matcher.match_request(&request)?;
//! println!("{} {:?}", matched.handler_name(), matched.path_variables);
//! ```
//!
//! ## Performance
//!
//! Matching is a linear scan over the current snapshot. Literal segments are
//! compared before any regex constraint runs, and path variables are
//! collected into an inline `SmallVec`.

mod conditions;
mod matcher;
mod pattern;
mod table;
#[cfg(test)]
mod tests;

pub use conditions::{consumes_matches, produces_matches, MediaTypeExpression, NameValueExpression};
pub use matcher::{MatchResult, RequestMatcher, Specificity};
pub use pattern::{split_path, PathPattern, Segment};
pub use table::{RegisteredRoute, RouteTable, Routes};
