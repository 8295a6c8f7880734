#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::runtime::dispatcher_with_pool;
use http::Method;
use routebind::binding::BoundArguments;
use routebind::dispatcher::{AsyncTask, CancellationToken, DeferredResult, Dispatcher, ReturnValue};
use routebind::mapping::RouteDescriptor;
use routebind::request::RequestContext;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn route<F>(d: &Dispatcher, path: &str, handler: F)
where
    F: Fn(BoundArguments, &RequestContext) -> anyhow::Result<ReturnValue> + Send + Sync + 'static,
{
    d.register(
        RouteDescriptor::builder(path)
            .method(Method::GET)
            .handler(path.trim_start_matches('/'), handler)
            .build()
            .unwrap(),
    )
    .unwrap();
}

fn get(d: &Dispatcher, path: &str) -> routebind::HandlerResponse {
    d.dispatch(RequestContext::builder(Method::GET, path).build())
}

#[test]
fn test_task_within_timeout_returns_value() {
    let d = dispatcher_with_pool(Duration::from_secs(5), None);
    route(&d, "/quick", |_args, _req| {
        Ok(ReturnValue::Task(AsyncTask::new(|_token| {
            may::coroutine::sleep(Duration::from_millis(10));
            Ok(ReturnValue::Body(json!({"result": 42})))
        })))
    });
    let resp = get(&d, "/quick");
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body.as_json(), Some(&json!({"result": 42})));
    assert!(d.shutdown(Duration::from_secs(5)));
}

#[test]
fn test_task_timeout_uses_fallback_and_cancels() {
    let d = dispatcher_with_pool(Duration::from_millis(100), Some(json!({"status": "pending"})));
    let cancelled = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&cancelled);
    route(&d, "/slow", move |_args, _req| {
        let seen = Arc::clone(&seen);
        Ok(ReturnValue::Task(AsyncTask::new(move |token: CancellationToken| {
            for _ in 0..100 {
                if token.is_cancelled() {
                    seen.store(true, Ordering::SeqCst);
                    return Ok(ReturnValue::Empty);
                }
                may::coroutine::sleep(Duration::from_millis(10));
            }
            Ok(ReturnValue::Body(json!({"status": "done"})))
        })))
    });
    let resp = get(&d, "/slow");
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body.as_json(), Some(&json!({"status": "pending"})));
    assert!(d.shutdown(Duration::from_secs(5)));
    assert!(cancelled.load(Ordering::SeqCst));
}

#[test]
fn test_task_timeout_without_fallback_is_503() {
    let d = dispatcher_with_pool(Duration::from_millis(50), None);
    route(&d, "/stuck", |_args, _req| {
        Ok(ReturnValue::Task(AsyncTask::new(|_token| {
            may::coroutine::sleep(Duration::from_millis(300));
            Ok(ReturnValue::Empty)
        })))
    });
    assert_eq!(get(&d, "/stuck").status, 503);
    assert!(d.shutdown(Duration::from_secs(5)));
}

#[test]
fn test_per_task_timeout_result() {
    let d = dispatcher_with_pool(Duration::from_secs(5), None);
    route(&d, "/own-timeout", |_args, _req| {
        Ok(ReturnValue::Task(
            AsyncTask::new(|_token| {
                may::coroutine::sleep(Duration::from_millis(300));
                Ok(ReturnValue::Empty)
            })
            .with_timeout(Duration::from_millis(30))
            .timeout_result(ReturnValue::Body(json!("too slow"))),
        ))
    });
    let resp = get(&d, "/own-timeout");
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body.as_text(), Some("too slow"));
    assert!(d.shutdown(Duration::from_secs(5)));
}

#[test]
fn test_deferred_completed_elsewhere() {
    let d = dispatcher_with_pool(Duration::from_secs(5), None);
    route(&d, "/deferred", |_args, _req| {
        let deferred = DeferredResult::new();
        let slot = deferred.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            slot.set_result(ReturnValue::Body(json!({"from": "thread"})));
        });
        Ok(ReturnValue::Deferred(deferred))
    });
    let resp = get(&d, "/deferred");
    assert_eq!(resp.body.as_json(), Some(&json!({"from": "thread"})));
}

#[test]
fn test_late_completion_does_not_change_response() {
    let d = dispatcher_with_pool(Duration::from_millis(30), Some(json!("fallback")));
    let (tx, rx) = std::sync::mpsc::channel::<DeferredResult>();
    let tx = std::sync::Mutex::new(tx);
    route(&d, "/late", move |_args, _req| {
        let deferred = DeferredResult::new();
        tx.lock().unwrap().send(deferred.clone()).unwrap();
        Ok(ReturnValue::Deferred(deferred))
    });
    let resp = get(&d, "/late");
    assert_eq!(resp.body.as_text(), Some("fallback"));
    let deferred = rx.recv().unwrap();
    assert!(!deferred.set_result(ReturnValue::Body(json!("late"))));
}

#[test]
fn test_disconnect_during_wait() {
    let d = dispatcher_with_pool(Duration::from_secs(5), None);
    route(&d, "/hang", |_args, _req| Ok(ReturnValue::Deferred(DeferredResult::new())));
    let token = CancellationToken::new();
    let cancel = token.clone();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        cancel.cancel();
    });
    let req = RequestContext::builder(Method::GET, "/hang")
        .disconnect_token(token)
        .build();
    assert_eq!(d.dispatch(req).status, 503);
}

#[test]
fn test_task_without_pool_is_503() {
    let d = Dispatcher::new();
    route(&d, "/nopool", |_args, _req| {
        Ok(ReturnValue::Task(AsyncTask::new(|_token| Ok(ReturnValue::Empty))))
    });
    assert_eq!(get(&d, "/nopool").status, 503);
}
