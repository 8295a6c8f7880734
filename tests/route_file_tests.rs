#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::temp_files::{cleanup_temp_files, create_temp_json, create_temp_yaml};
use http::Method;
use routebind::binding::BoundArguments;
use routebind::dispatcher::{Dispatcher, ReturnValue};
use routebind::mapping::{load_routes, DeclaredType, ParameterDescriptor, RouteDescriptor};
use routebind::request::RequestContext;
use serde_json::json;

const ROUTES_YAML: &str = r#"
routes:
  - name: search
    path: /search
    method: GET
    params: ["q"]
    parameters:
      - { name: q, in: query }
      - { name: limit, in: query, type: integer, default: 10 }
      - { name: tags, in: query, type: "list<string>", required: false }
  - name: signup
    path: /signup
    method: POST
    consumes: application/x-www-form-urlencoded
    parameters:
      - name: email
        in: query
        validate: true
        constraints: { email: true }
    response:
      status: 201
      body: "welcome ${email}"
"#;

fn dispatcher_from(path: &std::path::Path) -> Dispatcher {
    let d = Dispatcher::new();
    for def in load_routes(path).unwrap() {
        d.register(def.to_descriptor().unwrap()).unwrap();
    }
    d
}

#[test]
fn test_yaml_routes_bind_and_echo() {
    let path = create_temp_yaml(ROUTES_YAML);
    let d = dispatcher_from(&path);

    let resp = d.dispatch(RequestContext::builder(Method::GET, "/search?q=rust&tags=a&tags=b").build());
    assert_eq!(resp.status, 200);
    assert_eq!(
        resp.body.as_json(),
        Some(&json!({"q": "rust", "limit": 10, "tags": ["a", "b"]}))
    );

    // Missing `q` fails the param condition before binding.
    let resp = d.dispatch(RequestContext::builder(Method::GET, "/search").build());
    assert_eq!(resp.status, 400);

    cleanup_temp_files(&[path]);
}

#[test]
fn test_form_validation() {
    let path = create_temp_yaml(ROUTES_YAML);
    let d = dispatcher_from(&path);

    let ok = d.dispatch(
        RequestContext::builder(Method::POST, "/signup")
            .form(&[("email", "ada@example.com")])
            .build(),
    );
    assert_eq!(ok.status, 201);
    assert_eq!(ok.body.as_text(), Some("welcome ada@example.com"));

    let bad = d.dispatch(
        RequestContext::builder(Method::POST, "/signup")
            .form(&[("email", "not-an-email")])
            .build(),
    );
    assert_eq!(bad.status, 400);
    assert!(bad.body.as_json().unwrap()["message"]
        .as_str()
        .unwrap()
        .contains("Validation"));

    cleanup_temp_files(&[path]);
}

#[test]
fn test_json_route_file() {
    let path = create_temp_json(r#"{"routes": [{"name": "ping", "path": "/ping", "response": {"body": "pong"}}]}"#);
    let d = dispatcher_from(&path);
    let resp = d.dispatch(RequestContext::builder(Method::GET, "/ping").build());
    assert_eq!(resp.body.as_text(), Some("pong"));
    cleanup_temp_files(&[path]);
}

#[test]
fn test_multipart_upload_and_transfer() {
    let dir = tempfile::tempdir().unwrap();
    let dest_root = dir.path().to_path_buf();
    let d = Dispatcher::new();
    d.register(
        RouteDescriptor::builder("/upload")
            .method(Method::POST)
            .consumes("multipart/form-data")
            .parameter(ParameterDescriptor::implicit("file", DeclaredType::File))
            .parameter(ParameterDescriptor::implicit("title", DeclaredType::String))
            .handler("upload", move |args: BoundArguments, _req: &RequestContext| {
                let file = args.file("file").ok_or_else(|| anyhow::anyhow!("no file bound"))?;
                let dest = dest_root.join("nested/dir").join(file.original_filename().unwrap_or("upload"));
                file.transfer_to(&dest)?;
                Ok(ReturnValue::Body(json!({
                    "title": args.str("title"),
                    "size": file.size(),
                    "content_type": file.content_type(),
                })))
            })
            .build()
            .unwrap(),
    )
    .unwrap();

    let body = "--XyZ\r\n\
        Content-Disposition: form-data; name=\"title\"\r\n\r\n\
        Holiday\r\n\
        --XyZ\r\n\
        Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
        Content-Type: text/plain\r\n\r\n\
        hello world\r\n\
        --XyZ--\r\n";
    let resp = d.dispatch(
        RequestContext::builder(Method::POST, "/upload")
            .header("Content-Type", "multipart/form-data; boundary=XyZ")
            .body(body)
            .build(),
    );
    assert_eq!(resp.status, 200, "{:?}", resp.body);
    assert_eq!(
        resp.body.as_json(),
        Some(&json!({"title": "Holiday", "size": 11, "content_type": "text/plain"}))
    );
    let written = std::fs::read_to_string(dir.path().join("nested/dir/a.txt")).unwrap();
    assert_eq!(written, "hello world");
}
