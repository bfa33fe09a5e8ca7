use async_trait::async_trait;
use lsp_client_protocol::{ServerRequestHandler, ServerRequestRouter};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower_lsp::jsonrpc::{Error, ErrorCode, Request, Result};

#[derive(Default)]
struct ShowDocument {
    calls: AtomicUsize,
}

#[async_trait]
impl ServerRequestHandler for ShowDocument {
    fn method(&self) -> &'static str {
        "window/showDocument"
    }

    async fn handle(&self, params: Option<Value>) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match params {
            Some(params) if params.get("uri").is_some() => Ok(json!({"success": true})),
            _ => Err(Error::invalid_params("uri is required")),
        }
    }
}

fn request(value: Value) -> Request {
    serde_json::from_value(value).unwrap()
}

/// Test: Request for a registered method
/// Purpose: The handler result is returned under the request id
#[tokio::test]
async fn test_dispatch_to_handler() {
    let handler = Arc::new(ShowDocument::default());
    let mut router = ServerRequestRouter::new();
    router.register(handler.clone()).unwrap();

    let response = router
        .dispatch(request(json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "window/showDocument",
            "params": {"uri": "file:///tmp/a.txt"}
        })))
        .await
        .unwrap();

    assert_eq!(response.result(), Some(&json!({"success": true})));
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
}

/// Test: Handler returns a JSON-RPC error
/// Purpose: The error is passed through unchanged
#[tokio::test]
async fn test_dispatch_handler_error() {
    let mut router = ServerRequestRouter::new();
    router.register(Arc::new(ShowDocument::default())).unwrap();

    let response = router
        .dispatch(request(json!({
            "jsonrpc": "2.0",
            "id": 8,
            "method": "window/showDocument",
            "params": {}
        })))
        .await
        .unwrap();

    assert_eq!(response.error().unwrap().code, ErrorCode::InvalidParams);
}

/// Test: Request for a method nobody handles
/// Purpose: The router answers MethodNotFound
#[tokio::test]
async fn test_unknown_method() {
    let router = ServerRequestRouter::new();

    let response = router
        .dispatch(request(json!({
            "jsonrpc": "2.0",
            "id": "abc",
            "method": "workspace/configuration",
            "params": {"items": []}
        })))
        .await
        .unwrap();

    assert_eq!(response.error().unwrap().code, ErrorCode::MethodNotFound);
}

/// Test: Notifications carry no id
/// Purpose: No response is produced, whether or not a handler exists
#[tokio::test]
async fn test_notifications_produce_no_response() {
    let handler = Arc::new(ShowDocument::default());
    let mut router = ServerRequestRouter::new();
    router.register(handler.clone()).unwrap();

    let handled = router
        .dispatch(request(json!({
            "jsonrpc": "2.0",
            "method": "window/showDocument",
            "params": {"uri": "file:///tmp/a.txt"}
        })))
        .await;
    let unhandled = router
        .dispatch(request(json!({
            "jsonrpc": "2.0",
            "method": "$/progress",
            "params": {"token": 1, "value": {}}
        })))
        .await;

    assert!(handled.is_none());
    assert!(unhandled.is_none());
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
}
