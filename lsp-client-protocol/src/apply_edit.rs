use crate::router::ServerRequestHandler;
use async_trait::async_trait;
use lsp_client_core::{DocumentIo, DocumentLocks, DocumentStateManager, WorkspaceEditApplicator};
use lsp_types::request::{ApplyWorkspaceEdit, Request as LspRequest};
use lsp_types::{ApplyWorkspaceEditParams, ApplyWorkspaceEditResponse};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_lsp::jsonrpc::{Error, Result};
use tracing::{debug, info};

/// Answers `workspace/applyEdit` requests from the server.
///
/// Apply failures are reported in the response body with `applied: false`;
/// only unparseable params become a JSON-RPC error.
pub struct ApplyEditResponder<F: DocumentIo + ?Sized> {
    io: Arc<F>,
    documents: Arc<RwLock<DocumentStateManager>>,
    locks: DocumentLocks,
}

impl<F: DocumentIo + ?Sized> ApplyEditResponder<F> {
    pub fn new(
        io: Arc<F>,
        documents: Arc<RwLock<DocumentStateManager>>,
        locks: DocumentLocks,
    ) -> Self {
        Self {
            io,
            documents,
            locks,
        }
    }

    pub async fn respond(&self, params: ApplyWorkspaceEditParams) -> ApplyWorkspaceEditResponse {
        match params.label.as_deref() {
            Some(label) => info!("Applying workspace edit: {}", label),
            None => info!("Applying workspace edit"),
        }

        let outcome = WorkspaceEditApplicator::new(self.io.as_ref(), &self.documents, &self.locks)
            .apply(&params.edit)
            .await;

        ApplyWorkspaceEditResponse {
            applied: outcome.applied,
            failure_reason: outcome.failure_reason,
            failed_change: None,
        }
    }
}

#[async_trait]
impl<F: DocumentIo + ?Sized + 'static> ServerRequestHandler for ApplyEditResponder<F> {
    fn method(&self) -> &'static str {
        ApplyWorkspaceEdit::METHOD
    }

    async fn handle(&self, params: Option<Value>) -> Result<Value> {
        let params = params.ok_or_else(|| Error::invalid_params("Missing applyEdit params"))?;
        let params: ApplyWorkspaceEditParams = serde_json::from_value(params).map_err(|e| {
            debug!("Rejecting malformed applyEdit params: {}", e);
            Error::invalid_params(e.to_string())
        })?;

        let response = self.respond(params).await;
        serde_json::to_value(response).map_err(|_| Error::internal_error())
    }
}
