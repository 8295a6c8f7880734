//! # Admin Endpoints
//!
//! Runtime route management, served ahead of normal routing:
//!
//! - `POST <prefix>/generate` with a JSON [`RouteDefinition`] builds a
//!   template handler and registers it. `200 {"id", "mapping"}` on success,
//!   `409` when the mapping is a duplicate or ambiguous, `400` when the
//!   definition is invalid.
//! - `DELETE <prefix>/unload?name=<route name>` unregisters the named route.
//!   Unknown names still answer `200`.
//!
//! Other methods on those two paths get `405`; any other path falls through
//! to the dispatcher.

use http::{Method, StatusCode};
use serde_json::json;
use tracing::{info, warn};

use crate::dispatcher::{Dispatcher, HandlerResponse};
use crate::error::RegistrationError;
use crate::mapping::RouteDefinition;
use crate::request::RequestContext;

#[derive(Debug, Clone)]
pub struct AdminEndpoints {
    prefix: String,
}

impl Default for AdminEndpoints {
    fn default() -> Self {
        Self::new("/admin")
    }
}

impl AdminEndpoints {
    /// `prefix` is normalized to a leading slash and no trailing slash.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        let trimmed = prefix.trim().trim_matches('/');
        Self {
            prefix: format!("/{trimmed}"),
        }
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn subpath<'a>(&self, path: &'a str) -> Option<&'a str> {
        let path = path.split('?').next().unwrap_or(path);
        let rest = path.strip_prefix(self.prefix.as_str())?;
        let rest = rest.strip_prefix('/')?;
        Some(rest.trim_end_matches('/'))
    }

    /// Handle an admin request, or `None` when the path is not an admin path.
    #[must_use]
    pub fn handle(&self, dispatcher: &Dispatcher, request: &RequestContext) -> Option<HandlerResponse> {
        let response = match (self.subpath(&request.path)?, &request.method) {
            ("generate", &Method::POST) => self.generate(dispatcher, request),
            ("unload", &Method::DELETE) => self.unload(dispatcher, request),
            ("generate", _) => method_not_allowed(request, "POST"),
            ("unload", _) => method_not_allowed(request, "DELETE"),
            _ => return None,
        };
        Some(response)
    }

    /// Admin endpoints first, then the regular pipeline.
    #[must_use]
    pub fn dispatch(&self, dispatcher: &Dispatcher, request: RequestContext) -> HandlerResponse {
        match self.handle(dispatcher, &request) {
            Some(response) => response,
            None => dispatcher.dispatch(request),
        }
    }

    fn generate(&self, dispatcher: &Dispatcher, request: &RequestContext) -> HandlerResponse {
        let definition: RouteDefinition = match serde_json::from_slice(&request.body) {
            Ok(d) => d,
            Err(e) => {
                warn!(request_id = %request.request_id, error = %e, "Rejected malformed route definition");
                return HandlerResponse::status_error(
                    StatusCode::BAD_REQUEST,
                    &format!("invalid route definition: {e}"),
                    &request.path,
                );
            }
        };

        let registered = definition
            .to_descriptor()
            .and_then(|route| {
                let mapping = route.describe();
                dispatcher.register(route).map(|id| (id, mapping))
            });
        match registered {
            Ok((id, mapping)) => {
                // A1: Route generated
                info!(
                    request_id = %request.request_id,
                    route_id = %id,
                    mapping = %mapping,
                    name = ?definition.name,
                    "Route generated"
                );
                HandlerResponse::json(200, json!({ "id": id, "mapping": mapping }))
            }
            Err(e) => {
                let status = match e {
                    RegistrationError::DuplicateRoute { .. } | RegistrationError::AmbiguousMapping { .. } => {
                        StatusCode::CONFLICT
                    }
                    _ => StatusCode::BAD_REQUEST,
                };
                warn!(
                    request_id = %request.request_id,
                    status = status.as_u16(),
                    error = %e,
                    "Route generation rejected"
                );
                HandlerResponse::status_error(status, &e.to_string(), &request.path)
            }
        }
    }

    fn unload(&self, dispatcher: &Dispatcher, request: &RequestContext) -> HandlerResponse {
        let Some(name) = request.param("name").filter(|n| !n.is_empty()) else {
            return HandlerResponse::status_error(
                StatusCode::BAD_REQUEST,
                "missing required parameter 'name'",
                &request.path,
            );
        };
        let removed = match dispatcher.table().find_by_name(name) {
            Some(route) => dispatcher.unregister(route.id),
            None => false,
        };
        // A1: Route unloaded (or already absent)
        info!(request_id = %request.request_id, name = %name, removed = removed, "Route unload");
        HandlerResponse::json(200, json!({ "name": name, "removed": removed }))
    }
}

fn method_not_allowed(request: &RequestContext, allowed: &str) -> HandlerResponse {
    let mut response = HandlerResponse::status_error(
        StatusCode::METHOD_NOT_ALLOWED,
        &format!("{} not supported here", request.method),
        &request.path,
    );
    response.set_header("Allow", allowed.to_string());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate(admin: &AdminEndpoints, d: &Dispatcher, body: serde_json::Value) -> HandlerResponse {
        let req = RequestContext::builder(Method::POST, "/admin/generate").json(&body).build();
        admin.handle(d, &req).unwrap()
    }

    #[test]
    fn test_prefix_normalized() {
        assert_eq!(AdminEndpoints::new("ops/").prefix(), "/ops");
        assert_eq!(AdminEndpoints::new("/admin").prefix(), "/admin");
    }

    #[test]
    fn test_non_admin_paths_fall_through() {
        let admin = AdminEndpoints::default();
        let d = Dispatcher::new();
        let req = RequestContext::builder(Method::GET, "/administrator/generate").build();
        assert!(admin.handle(&d, &req).is_none());
        let req = RequestContext::builder(Method::GET, "/admin/other").build();
        assert!(admin.handle(&d, &req).is_none());
    }

    #[test]
    fn test_generate_then_conflict() {
        let admin = AdminEndpoints::default();
        let d = Dispatcher::new();
        let def = json!({"name": "hello", "path": "/hello", "method": "GET", "response": {"body": "hi"}});
        let resp = generate(&admin, &d, def.clone());
        assert_eq!(resp.status, 200);
        assert_eq!(d.table().len(), 1);
        assert_eq!(generate(&admin, &d, def).status, 409);
    }

    #[test]
    fn test_generate_invalid() {
        let admin = AdminEndpoints::default();
        let d = Dispatcher::new();
        let resp = generate(&admin, &d, json!({"path": "/x", "method": "NOT A METHOD"}));
        assert_eq!(resp.status, 400);
        let req = RequestContext::builder(Method::POST, "/admin/generate").body("{").build();
        assert_eq!(admin.handle(&d, &req).unwrap().status, 400);
    }

    #[test]
    fn test_wrong_method() {
        let admin = AdminEndpoints::default();
        let d = Dispatcher::new();
        let req = RequestContext::builder(Method::GET, "/admin/generate").build();
        let resp = admin.handle(&d, &req).unwrap();
        assert_eq!(resp.status, 405);
        assert_eq!(resp.get_header("Allow"), Some("POST"));
    }

    #[test]
    fn test_unload_is_idempotent() {
        let admin = AdminEndpoints::default();
        let d = Dispatcher::new();
        generate(&admin, &d, json!({"name": "bye", "path": "/bye", "method": "GET"}));
        for _ in 0..2 {
            let req = RequestContext::builder(Method::DELETE, "/admin/unload?name=bye").build();
            assert_eq!(admin.handle(&d, &req).unwrap().status, 200);
        }
        assert!(d.table().is_empty());
    }
}
