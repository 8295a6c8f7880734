#![allow(clippy::unwrap_used, clippy::expect_used)]

use http::Method;
use routebind::admin::AdminEndpoints;
use routebind::config::AppConfig;
use routebind::dispatcher::{Dispatcher, HandlerResponse};
use routebind::request::RequestContext;
use serde_json::json;

fn generate(admin: &AdminEndpoints, d: &Dispatcher, definition: serde_json::Value) -> HandlerResponse {
    let path = format!("{}/generate", admin.prefix());
    admin.dispatch(d, RequestContext::builder(Method::POST, &path).json(&definition).build())
}

fn unload(admin: &AdminEndpoints, d: &Dispatcher, name: &str) -> HandlerResponse {
    let path = format!("{}/unload?name={name}", admin.prefix());
    admin.dispatch(d, RequestContext::builder(Method::DELETE, &path).build())
}

#[test]
fn test_generate_dispatch_unload_cycle() {
    let admin = AdminEndpoints::default();
    let d = Dispatcher::new();

    let resp = generate(
        &admin,
        &d,
        json!({
            "name": "greet",
            "path": "/greet/{name}",
            "method": "GET",
            "produces": "text/plain",
            "parameters": [
                {"name": "name", "in": "path"},
                {"name": "times", "in": "query", "type": "integer", "default": 1}
            ],
            "response": {"body": "Hello ${name} x${times}"}
        }),
    );
    assert_eq!(resp.status, 200);
    assert!(resp.body.as_json().unwrap()["id"].is_number());

    let hello = admin.dispatch(&d, RequestContext::builder(Method::GET, "/greet/ada?times=2").build());
    assert_eq!(hello.status, 200);
    assert_eq!(hello.body.as_text(), Some("Hello ada x2"));
    assert_eq!(hello.get_header("content-type"), Some("text/plain"));

    let bad = admin.dispatch(&d, RequestContext::builder(Method::GET, "/greet/ada?times=many").build());
    assert_eq!(bad.status, 400);

    assert_eq!(unload(&admin, &d, "greet").status, 200);
    let gone = admin.dispatch(&d, RequestContext::builder(Method::GET, "/greet/ada").build());
    assert_eq!(gone.status, 404);

    // Unknown names are a no-op.
    let again = unload(&admin, &d, "greet");
    assert_eq!(again.status, 200);
    assert_eq!(again.body.as_json().unwrap()["removed"], false);
}

#[test]
fn test_generate_conflicts_and_invalid() {
    let admin = AdminEndpoints::new("/ops");
    let d = Dispatcher::new();
    let def = json!({"name": "a", "path": "/a", "methods": ["GET", "POST"]});
    assert_eq!(generate(&admin, &d, def).status, 200);

    // Same mapping, different (fresh) handler.
    let dup = generate(&admin, &d, json!({"name": "b", "path": "/a", "methods": ["POST", "GET"]}));
    assert_eq!(dup.status, 409);

    // Overlapping method sets.
    let overlap = generate(&admin, &d, json!({"name": "c", "path": "/a", "method": "GET"}));
    assert_eq!(overlap.status, 409);

    let invalid = generate(&admin, &d, json!({"path": "/b/{", "method": "GET"}));
    assert_eq!(invalid.status, 400);

    let unknown_field = generate(&admin, &d, json!({"path": "/b", "verb": "GET"}));
    assert_eq!(unknown_field.status, 400);

    assert_eq!(d.table().len(), 1);
}

#[test]
fn test_admin_prefix_from_config() {
    let config = AppConfig {
        admin_prefix: "/manage/".into(),
        ..AppConfig::default()
    };
    let admin = AdminEndpoints::new(&config.admin_prefix);
    assert_eq!(admin.prefix(), "/manage");
    let d = Dispatcher::new();
    let resp = generate(&admin, &d, json!({"name": "x", "path": "/x"}));
    assert_eq!(resp.status, 200);
}
