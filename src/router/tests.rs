use super::{RequestMatcher, RouteTable};
use crate::binding::BoundArguments;
use crate::dispatcher::ReturnValue;
use crate::error::{MatchError, RegistrationError};
use crate::mapping::{RouteBuilder, RouteDescriptor};
use crate::request::RequestContext;
use http::Method;
use std::sync::Arc;

fn noop(_args: BoundArguments, _req: &RequestContext) -> anyhow::Result<ReturnValue> {
    Ok(ReturnValue::Empty)
}

fn other(_args: BoundArguments, _req: &RequestContext) -> anyhow::Result<ReturnValue> {
    Ok(ReturnValue::Empty)
}

fn route(builder: RouteBuilder, handler: &str) -> RouteDescriptor {
    builder.handler(handler, noop).build().unwrap()
}

fn matcher_with(routes: Vec<RouteDescriptor>) -> (Arc<RouteTable>, RequestMatcher) {
    let table = Arc::new(RouteTable::new());
    for r in routes {
        table.register(r).unwrap();
    }
    let matcher = RequestMatcher::new(Arc::clone(&table));
    (table, matcher)
}

fn get(uri: &str) -> RequestContext {
    RequestContext::builder(Method::GET, uri).build()
}

#[test]
fn test_path_variable_extracted() {
    let (_t, m) = matcher_with(vec![route(
        RouteDescriptor::builder("/items/{id}").method(Method::GET),
        "get_item",
    )]);
    let matched = m.match_request(&get("/items/42")).unwrap();
    assert_eq!(matched.handler_name(), "get_item");
    assert_eq!(matched.path_variable("id"), Some("42"));
}

#[test]
fn test_percent_decoded_variable() {
    let (_t, m) = matcher_with(vec![route(
        RouteDescriptor::builder("/files/{name}").method(Method::GET),
        "file",
    )]);
    let matched = m.match_request(&get("/files/a%20b.txt")).unwrap();
    assert_eq!(matched.path_variable("name"), Some("a b.txt"));
}

#[test]
fn test_method_mismatch_is_405_with_allowed_set() {
    let (_t, m) = matcher_with(vec![
        route(RouteDescriptor::builder("/items").method(Method::GET), "list"),
        route(RouteDescriptor::builder("/items").method(Method::POST), "create"),
    ]);
    let req = RequestContext::builder(Method::DELETE, "/items").build();
    match m.match_request(&req) {
        Err(MatchError::MethodNotAllowed { allowed, .. }) => {
            assert_eq!(allowed, vec![Method::GET, Method::HEAD, Method::POST]);
        }
        other => panic!("expected 405, got {other:?}"),
    }
}

#[test]
fn test_unknown_path_is_404() {
    let (_t, m) = matcher_with(vec![route(RouteDescriptor::builder("/items"), "list")]);
    assert!(matches!(
        m.match_request(&get("/nope")),
        Err(MatchError::NotFound { .. })
    ));
}

#[test]
fn test_head_served_by_get() {
    let (_t, m) = matcher_with(vec![route(
        RouteDescriptor::builder("/items").method(Method::GET),
        "list",
    )]);
    let req = RequestContext::builder(Method::HEAD, "/items").build();
    let matched = m.match_request(&req).unwrap();
    assert_eq!(matched.specificity.method, 1);
}

#[test]
fn test_literal_beats_variable() {
    let (_t, m) = matcher_with(vec![
        route(RouteDescriptor::builder("/items/{id}").method(Method::GET), "by_id"),
        route(RouteDescriptor::builder("/items/new").method(Method::GET), "new_form"),
    ]);
    assert_eq!(m.match_request(&get("/items/new")).unwrap().handler_name(), "new_form");
    assert_eq!(m.match_request(&get("/items/7")).unwrap().handler_name(), "by_id");
}

#[test]
fn test_catch_all_loses_to_variable() {
    let (_t, m) = matcher_with(vec![
        route(RouteDescriptor::builder("/static/{*rest}"), "assets"),
        route(RouteDescriptor::builder("/static/{file}"), "single"),
    ]);
    assert_eq!(m.match_request(&get("/static/a.css")).unwrap().handler_name(), "single");
    let deep = m.match_request(&get("/static/css/a.css")).unwrap();
    assert_eq!(deep.handler_name(), "assets");
    assert_eq!(deep.path_variable("rest"), Some("css/a.css"));
}

#[test]
fn test_constrained_variable() {
    let (_t, m) = matcher_with(vec![
        route(RouteDescriptor::builder("/users/{id:\\d+}"), "by_id"),
        route(RouteDescriptor::builder("/users/{login}"), "by_login"),
    ]);
    assert_eq!(m.match_request(&get("/users/12")).unwrap().handler_name(), "by_id");
    assert_eq!(m.match_request(&get("/users/bob")).unwrap().handler_name(), "by_login");
}

#[test]
fn test_param_condition_narrows() {
    let (_t, m) = matcher_with(vec![
        route(RouteDescriptor::builder("/search").method(Method::GET), "plain"),
        route(
            RouteDescriptor::builder("/search").method(Method::GET).param("mode=advanced"),
            "advanced",
        ),
    ]);
    assert_eq!(m.match_request(&get("/search?mode=advanced")).unwrap().handler_name(), "advanced");
    assert_eq!(m.match_request(&get("/search")).unwrap().handler_name(), "plain");
}

#[test]
fn test_unsatisfied_conditions() {
    let (_t, m) = matcher_with(vec![route(
        RouteDescriptor::builder("/report").header("X-Api-Version=2"),
        "report",
    )]);
    let err = m.match_request(&get("/report")).unwrap_err();
    assert!(matches!(err, MatchError::UnsatisfiedConditions { .. }));
    assert_eq!(err.status(), 400);
}

#[test]
fn test_consumes_and_produces_failures() {
    let (_t, m) = matcher_with(vec![route(
        RouteDescriptor::builder("/items")
            .method(Method::POST)
            .consumes("application/json")
            .produces("application/json"),
        "create",
    )]);
    let text = RequestContext::builder(Method::POST, "/items")
        .header("Content-Type", "text/plain")
        .body("x")
        .build();
    assert_eq!(m.match_request(&text).unwrap_err().status(), 415);

    let wants_xml = RequestContext::builder(Method::POST, "/items")
        .header("Content-Type", "application/json")
        .header("Accept", "application/xml")
        .body("{}")
        .build();
    assert_eq!(m.match_request(&wants_xml).unwrap_err().status(), 406);
}

#[test]
fn test_ambiguous_at_match_time() {
    let (_t, m) = matcher_with(vec![
        route(RouteDescriptor::builder("/a/{x}/c"), "first"),
        route(RouteDescriptor::builder("/a/b/{y}"), "second"),
    ]);
    // Same literal counts but different prefixes: /a/b/{y} wins on prefix.
    assert_eq!(m.match_request(&get("/a/b/c")).unwrap().handler_name(), "second");

    let (_t, m) = matcher_with(vec![
        route(RouteDescriptor::builder("/x/{a}").param("p"), "p_route"),
        route(RouteDescriptor::builder("/x/{b}").param("q"), "q_route"),
    ]);
    match m.match_request(&get("/x/1?p=1&q=1")) {
        Err(MatchError::AmbiguousMapping { handlers, .. }) => assert_eq!(handlers.len(), 2),
        other => panic!("expected ambiguity, got {other:?}"),
    }
}

#[test]
fn test_duplicate_registration() {
    let table = RouteTable::new();
    let a = RouteDescriptor::builder("/items/{id}")
        .method(Method::GET)
        .handler("a", noop)
        .build()
        .unwrap();
    let b = RouteDescriptor::builder("/items/{key}")
        .method(Method::GET)
        .handler("b", other)
        .build()
        .unwrap();
    table.register(a).unwrap();
    assert!(matches!(
        table.register(b),
        Err(RegistrationError::DuplicateRoute { .. })
    ));
}

#[test]
fn test_overlapping_methods_rejected() {
    let table = RouteTable::new();
    table
        .register(route(
            RouteDescriptor::builder("/items").methods([Method::GET, Method::POST]),
            "a",
        ))
        .unwrap();
    let err = table
        .register(route(RouteDescriptor::builder("/items").method(Method::GET), "b"))
        .unwrap_err();
    assert!(matches!(err, RegistrationError::AmbiguousMapping { .. }));
    // Disjoint method sets coexist.
    table
        .register(route(RouteDescriptor::builder("/items").method(Method::DELETE), "c"))
        .unwrap();
    assert_eq!(table.len(), 2);
}

#[test]
fn test_unregister_twice() {
    let table = RouteTable::new();
    let id = table.register(route(RouteDescriptor::builder("/a"), "a")).unwrap();
    assert!(table.unregister(id));
    assert!(!table.unregister(id));
    assert!(table.is_empty());
}

#[test]
fn test_snapshot_is_stable() {
    let table = RouteTable::new();
    table.register(route(RouteDescriptor::builder("/a"), "a")).unwrap();
    let snapshot = table.all_routes();
    table.register(route(RouteDescriptor::builder("/b"), "b")).unwrap();
    assert_eq!(snapshot.iter().count(), 1);
    assert_eq!(snapshot.iter().count(), 1);
    assert_eq!(table.all_routes().len(), 2);
}

#[test]
fn test_allowed_methods() {
    let (_t, m) = matcher_with(vec![route(
        RouteDescriptor::builder("/items").method(Method::GET),
        "list",
    )]);
    assert_eq!(m.allowed_methods("/items"), Some(vec![Method::GET, Method::HEAD]));
    assert_eq!(m.allowed_methods("/other"), Some(vec![]));
}

#[test]
fn test_concurrent_registration_never_exposes_partial_table() {
    let (table, m) = matcher_with(vec![route(
        RouteDescriptor::builder("/stable").method(Method::GET),
        "stable",
    )]);
    let m = Arc::new(m);
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let m = Arc::clone(&m);
            let table = Arc::clone(&table);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let mut hits = 0usize;
                while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                    assert_eq!(m.match_request(&get("/stable")).unwrap().handler_name(), "stable");
                    match m.match_request(&get("/dyn/7")) {
                        Ok(matched) => {
                            assert_eq!(matched.handler_name(), "dyn");
                            assert_eq!(matched.path_variable("n"), Some("7"));
                            hits += 1;
                        }
                        Err(MatchError::NotFound { .. }) => {}
                        Err(e) => panic!("unexpected match error during update: {e}"),
                    }
                    let snapshot = table.all_routes();
                    assert!(matches!(snapshot.len(), 1 | 2));
                    assert!(snapshot.iter().any(|r| r.route.handler().name() == "stable"));
                }
                hits
            })
        })
        .collect();

    for _ in 0..500 {
        let id = table
            .register(route(RouteDescriptor::builder("/dyn/{n}").method(Method::GET), "dyn"))
            .unwrap();
        assert!(table.unregister(id));
    }
    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(table.len(), 1);
}
