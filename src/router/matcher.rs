//! Request matching hot path.
//!
//! Candidates are filtered in stages (path, method, param/header
//! conditions, consumes, produces) and the survivors ranked by
//! [`Specificity`]. When every candidate is rejected, the error comes from
//! the furthest stage any candidate reached.

use http::Method;
use std::cmp::Reverse;
use std::sync::Arc;
use tracing::{debug, error};

use super::conditions::{consumes_matches, produces_matches};
use super::pattern::split_path;
use super::table::{RegisteredRoute, RouteTable};
use crate::error::MatchError;
use crate::ids::RouteId;
use crate::mapping::RouteDescriptor;
use crate::media::MediaType;
use crate::request::{ParamVec, RequestContext};

/// Ordering key for matching candidates; greater is more specific.
///
/// Fields compare in declaration order: fewer catch-alls, fewer variable
/// and wildcard segments, longer literal prefix, more literal segments,
/// more regex-constrained variables, explicit method, more param/header
/// conditions, explicit consumes, explicit produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Specificity {
    pub catch_alls: Reverse<usize>,
    pub dynamic_segments: Reverse<usize>,
    pub literal_prefix: usize,
    pub literal_segments: usize,
    pub constrained: usize,
    /// 2 = declared method, 1 = `HEAD` served by `GET`, 0 = any method.
    pub method: u8,
    pub conditions: usize,
    pub explicit_consumes: bool,
    pub explicit_produces: bool,
}

impl Specificity {
    fn of(route: &RouteDescriptor, method_rank: u8) -> Self {
        let pattern = route.pattern();
        Self {
            catch_alls: Reverse(pattern.catch_all_count()),
            dynamic_segments: Reverse(pattern.dynamic_count()),
            literal_prefix: pattern.literal_prefix_len(),
            literal_segments: pattern.literal_count(),
            constrained: pattern.constrained_count(),
            method: method_rank,
            conditions: route.condition_count(),
            explicit_consumes: !route.consumes().is_empty(),
            explicit_produces: !route.produces().is_empty(),
        }
    }
}

/// The single route selected for a request.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub route: Arc<RouteDescriptor>,
    pub route_id: RouteId,
    /// Decoded path variables in positional order.
    pub path_variables: ParamVec,
    pub specificity: Specificity,
}

impl MatchResult {
    #[must_use]
    pub fn handler_name(&self) -> &str {
        self.route.handler().name()
    }

    #[must_use]
    pub fn path_variable(&self, name: &str) -> Option<&str> {
        self.path_variables
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// How a route's method set accepts the request method, if at all.
fn method_rank(methods: &[Method], requested: &Method) -> Option<u8> {
    if methods.is_empty() {
        Some(0)
    } else if methods.contains(requested) {
        Some(2)
    } else if *requested == Method::HEAD && methods.contains(&Method::GET) {
        Some(1)
    } else {
        None
    }
}

fn conditions_met(route: &RouteDescriptor, request: &RequestContext) -> bool {
    route
        .params()
        .iter()
        .all(|c| c.matches(&request.param_values(c.name())))
        && route
            .headers()
            .iter()
            .all(|c| c.matches(&request.header_values(c.name())))
}

fn condition_summary(route: &RouteDescriptor) -> String {
    route
        .params()
        .iter()
        .map(ToString::to_string)
        .chain(route.headers().iter().map(|h| format!("header {h}")))
        .collect::<Vec<_>>()
        .join(", ")
}

fn push_unique<T: PartialEq + Clone>(into: &mut Vec<T>, items: &[T]) {
    for item in items {
        if !into.contains(item) {
            into.push(item.clone());
        }
    }
}

/// Selects exactly one route (or none) for a request.
#[derive(Debug, Clone)]
pub struct RequestMatcher {
    table: Arc<RouteTable>,
}

impl RequestMatcher {
    #[must_use]
    pub fn new(table: Arc<RouteTable>) -> Self {
        Self { table }
    }

    #[must_use]
    pub fn table(&self) -> &Arc<RouteTable> {
        &self.table
    }

    /// Find the best route for `request`.
    ///
    /// # Errors
    ///
    /// See [`MatchError`]; `AmbiguousMapping` is also logged as a
    /// configuration error.
    pub fn match_request(&self, request: &RequestContext) -> Result<MatchResult, MatchError> {
        let routes = self.table.all_routes();
        let segments = split_path(&request.path);

        // M1: Match attempt
        debug!(
            request_id = %request.request_id,
            method = %request.method,
            path = %request.path,
            candidates = routes.len(),
            "Route match attempt"
        );

        // Stage 1: path
        let path_matches: Vec<(&RegisteredRoute, ParamVec)> = routes
            .iter()
            .filter_map(|r| r.route.pattern().matches(&segments).map(|vars| (r, vars)))
            .collect();
        if path_matches.is_empty() {
            debug!(request_id = %request.request_id, path = %request.path, "No route matched path");
            return Err(MatchError::NotFound {
                path: request.path.clone(),
            });
        }

        // Stage 2: method
        let mut allowed: Vec<Method> = Vec::new();
        let mut method_matches = Vec::with_capacity(path_matches.len());
        for (r, vars) in path_matches {
            push_unique(&mut allowed, r.route.methods());
            if let Some(rank) = method_rank(r.route.methods(), &request.method) {
                method_matches.push((r, vars, rank));
            }
        }
        if method_matches.is_empty() {
            if allowed.contains(&Method::GET) && !allowed.contains(&Method::HEAD) {
                allowed.push(Method::HEAD);
            }
            allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
            debug!(
                request_id = %request.request_id,
                method = %request.method,
                allowed = ?allowed,
                "Method not allowed"
            );
            return Err(MatchError::MethodNotAllowed {
                method: request.method.clone(),
                allowed,
            });
        }

        // Stage 3: param/header conditions
        let mut unmet = Vec::new();
        let condition_matches: Vec<_> = method_matches
            .into_iter()
            .filter(|(r, _, _)| {
                let ok = conditions_met(&r.route, request);
                if !ok {
                    unmet.push(condition_summary(&r.route));
                }
                ok
            })
            .collect();
        if condition_matches.is_empty() {
            return Err(MatchError::UnsatisfiedConditions { conditions: unmet });
        }

        // Stage 4: consumes
        let content_type = request.effective_content_type();
        let mut supported: Vec<MediaType> = Vec::new();
        let consumes_ok: Vec<_> = condition_matches
            .into_iter()
            .filter(|(r, _, _)| {
                let ok = consumes_matches(r.route.consumes(), &content_type);
                if !ok {
                    let declared: Vec<MediaType> = r
                        .route
                        .consumes()
                        .iter()
                        .filter(|e| !e.is_negated())
                        .map(|e| e.media().clone())
                        .collect();
                    push_unique(&mut supported, &declared);
                }
                ok
            })
            .collect();
        if consumes_ok.is_empty() {
            return Err(MatchError::UnsupportedMediaType {
                content_type: request.content_type.clone(),
                supported,
            });
        }

        // Stage 5: produces
        let mut producible: Vec<MediaType> = Vec::new();
        let mut survivors: Vec<_> = consumes_ok
            .into_iter()
            .filter(|(r, _, _)| {
                let ok = produces_matches(r.route.produces(), &request.accept);
                if !ok {
                    push_unique(&mut producible, r.route.produces());
                }
                ok
            })
            .map(|(r, vars, rank)| (Specificity::of(&r.route, rank), r, vars))
            .collect();
        if survivors.is_empty() {
            return Err(MatchError::NotAcceptable {
                acceptable: producible,
            });
        }

        // Stage 6: rank
        survivors.sort_by(|a, b| b.0.cmp(&a.0));
        let best = survivors[0].0;
        let tied: Vec<String> = survivors
            .iter()
            .take_while(|(s, _, _)| *s == best)
            .map(|(_, r, _)| r.route.to_string())
            .collect();
        if tied.len() > 1 {
            // M3: Ambiguous match - configuration bug
            error!(
                request_id = %request.request_id,
                method = %request.method,
                path = %request.path,
                handlers = ?tied,
                "Ambiguous handler mapping - CONFIGURATION ERROR"
            );
            return Err(MatchError::AmbiguousMapping {
                path: request.path.clone(),
                handlers: tied,
            });
        }

        let (specificity, registered, path_variables) = survivors.swap_remove(0);
        // M2: Route matched
        debug!(
            request_id = %request.request_id,
            route_id = %registered.id,
            handler = %registered.route.handler(),
            path_variables = ?path_variables,
            "Route matched"
        );
        Ok(MatchResult {
            route: Arc::clone(&registered.route),
            route_id: registered.id,
            path_variables,
            specificity,
        })
    }

    /// Methods a path accepts, for `Allow` headers. Empty when no route
    /// matches the path; `None` inside means a route accepts any method.
    #[must_use]
    pub fn allowed_methods(&self, path: &str) -> Option<Vec<Method>> {
        let routes = self.table.all_routes();
        let segments = split_path(path);
        let mut allowed = Vec::new();
        let mut any_path = false;
        for r in &routes {
            if r.route.pattern().matches(&segments).is_some() {
                any_path = true;
                if r.route.methods().is_empty() {
                    return None;
                }
                push_unique(&mut allowed, r.route.methods());
            }
        }
        if !any_path {
            return Some(Vec::new());
        }
        if allowed.contains(&Method::GET) && !allowed.contains(&Method::HEAD) {
            allowed.push(Method::HEAD);
        }
        allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Some(allowed)
    }
}
