use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tower_lsp::jsonrpc::{Error, Request, Response, Result};
use tracing::{debug, warn};

/// Handles one server-to-client request method
#[async_trait]
pub trait ServerRequestHandler: Send + Sync {
    /// The JSON-RPC method this handler answers, e.g. `workspace/applyEdit`
    fn method(&self) -> &'static str;

    async fn handle(&self, params: Option<Value>) -> Result<Value>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("A handler for {0} is already registered")]
    DuplicateHandler(String),
}

/// Dispatches requests sent by the server to the registered handlers
#[derive(Default, Clone)]
pub struct ServerRequestRouter {
    handlers: HashMap<&'static str, Arc<dyn ServerRequestHandler>>,
}

impl ServerRequestRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        handler: Arc<dyn ServerRequestHandler>,
    ) -> std::result::Result<(), RouterError> {
        let method = handler.method();
        if self.handlers.contains_key(method) {
            return Err(RouterError::DuplicateHandler(method.to_string()));
        }

        debug!("Registered server request handler for {}", method);
        self.handlers.insert(method, handler);
        Ok(())
    }

    pub fn handles(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    pub fn methods(&self) -> Vec<&'static str> {
        let mut methods: Vec<_> = self.handlers.keys().copied().collect();
        methods.sort_unstable();
        methods
    }

    /// Route `request` to its handler.
    ///
    /// Notifications carry no id and never produce a response.
    pub async fn dispatch(&self, request: Request) -> Option<Response> {
        let method = request.method().to_string();
        let params = request.params().cloned();

        let Some(id) = request.id().cloned() else {
            if let Some(handler) = self.handlers.get(method.as_str()) {
                if let Err(e) = handler.handle(params).await {
                    warn!("Notification {} failed: {}", method, e);
                }
            } else {
                debug!("Ignoring unhandled notification {}", method);
            }
            return None;
        };

        let Some(handler) = self.handlers.get(method.as_str()) else {
            warn!("No handler for server request {}", method);
            return Some(Response::from_error(id, Error::method_not_found()));
        };

        debug!("Dispatching server request {} ({:?})", method, id);
        Some(match handler.handle(params).await {
            Ok(result) => Response::from_ok(id, result),
            Err(error) => Response::from_error(id, error),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl ServerRequestHandler for Echo {
        fn method(&self) -> &'static str {
            "test/echo"
        }

        async fn handle(&self, params: Option<Value>) -> Result<Value> {
            Ok(params.unwrap_or(Value::Null))
        }
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut router = ServerRequestRouter::new();
        router.register(Arc::new(Echo)).unwrap();

        assert_eq!(
            router.register(Arc::new(Echo)),
            Err(RouterError::DuplicateHandler("test/echo".to_string()))
        );
        assert_eq!(router.methods(), vec!["test/echo"]);
    }

    #[test]
    fn test_handles() {
        let mut router = ServerRequestRouter::new();
        assert!(!router.handles("test/echo"));

        router.register(Arc::new(Echo)).unwrap();
        assert!(router.handles("test/echo"));
    }
}
