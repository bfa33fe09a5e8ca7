use crate::document_state::{DocumentLocks, DocumentStateManager};
use crate::error::EditError;
use crate::file_io::DocumentIo;
use crate::resource_ops::ResourceOperationExecutor;
use crate::text_edit::{apply_text_edits, TextReplacement};
use lsp_types::{
    DocumentChangeOperation, DocumentChanges, ResourceOp, TextDocumentEdit, TextEdit, Url,
    WorkspaceEdit,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

type Result<T> = std::result::Result<T, EditError>;

/// Result of applying a workspace edit, shaped like the
/// `workspace/applyEdit` response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub applied: bool,
    pub failure_reason: Option<String>,
}

impl ApplyOutcome {
    pub fn applied() -> Self {
        Self {
            applied: true,
            failure_reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            applied: false,
            failure_reason: Some(reason.into()),
        }
    }
}

/// Applies workspace edits to files on disk with document version validation.
///
/// Sub-changes run strictly in order. The first failing sub-change stops the
/// batch; sub-changes applied before it are not rolled back.
pub struct WorkspaceEditApplicator<'a, F: DocumentIo + ?Sized> {
    io: &'a F,
    documents: &'a RwLock<DocumentStateManager>,
    locks: &'a DocumentLocks,
}

impl<'a, F: DocumentIo + ?Sized> WorkspaceEditApplicator<'a, F> {
    pub fn new(
        io: &'a F,
        documents: &'a RwLock<DocumentStateManager>,
        locks: &'a DocumentLocks,
    ) -> Self {
        Self {
            io,
            documents,
            locks,
        }
    }

    /// Apply `edit`, folding any failure into the returned outcome
    pub async fn apply(&self, edit: &WorkspaceEdit) -> ApplyOutcome {
        match self.try_apply(edit).await {
            Ok(()) => ApplyOutcome::applied(),
            Err(e) => {
                error!("Failed to apply workspace edit: {}", e);
                ApplyOutcome::failed(e.to_string())
            }
        }
    }

    /// Apply `edit`, returning the error of the first failing sub-change
    pub async fn try_apply(&self, edit: &WorkspaceEdit) -> Result<()> {
        match edit.document_changes.as_ref() {
            Some(changes) if !is_empty(changes) => self.apply_document_changes(changes).await,
            _ => match edit.changes.as_ref() {
                Some(changes) => self.apply_changes(changes).await,
                None => {
                    debug!("Workspace edit carries no changes");
                    Ok(())
                }
            },
        }
    }

    async fn apply_document_changes(&self, changes: &DocumentChanges) -> Result<()> {
        match changes {
            DocumentChanges::Edits(edits) => {
                info!("Applying {} text document edits", edits.len());
                for (index, edit) in edits.iter().enumerate() {
                    self.apply_text_document_edit(edit)
                        .await
                        .inspect_err(|e| debug!("Change {} failed: {}", index, e))?;
                }
            }
            DocumentChanges::Operations(operations) => {
                info!("Applying {} document change operations", operations.len());
                for (index, operation) in operations.iter().enumerate() {
                    let result = match operation {
                        DocumentChangeOperation::Edit(edit) => self.apply_text_document_edit(edit).await,
                        DocumentChangeOperation::Op(op) => self.apply_resource_op(op).await,
                    };
                    result.inspect_err(|e| debug!("Change {} failed: {}", index, e))?;
                }
            }
        }
        Ok(())
    }

    async fn apply_text_document_edit(&self, edit: &TextDocumentEdit) -> Result<()> {
        let uri = &edit.text_document.uri;
        let _guard = self.locks.lock(uri).await;

        if let Some(expected) = edit.text_document.version {
            let actual = self
                .documents
                .read()
                .await
                .get_version(uri)
                .map_err(|_| EditError::DocumentNotOpen { uri: uri.clone() })?;

            if actual != expected {
                return Err(EditError::VersionMismatch {
                    uri: uri.clone(),
                    expected,
                    actual,
                });
            }
        }

        let new_content = self.rewrite(uri, &edit.edits).await?;

        let mut documents = self.documents.write().await;
        if edit.text_document.version.is_some() {
            let version = documents.update_content(uri, new_content)?;
            debug!("Applied {} edits to {} (now version {})", edit.edits.len(), uri, version);
        } else if documents.is_registered(uri) {
            documents.update_content(uri, new_content)?;
        }

        Ok(())
    }

    /// Legacy `changes` map: no versions to validate
    async fn apply_changes(&self, changes: &HashMap<Url, Vec<TextEdit>>) -> Result<()> {
        let mut uris: Vec<&Url> = changes.keys().collect();
        uris.sort();
        info!("Applying text edits to {} documents", uris.len());

        for uri in uris {
            let _guard = self.locks.lock(uri).await;
            let new_content = self.rewrite(uri, &changes[uri]).await?;

            let mut documents = self.documents.write().await;
            if documents.is_registered(uri) {
                documents.update_content(uri, new_content)?;
            }
        }

        Ok(())
    }

    async fn apply_resource_op(&self, op: &ResourceOp) -> Result<()> {
        let executor = ResourceOperationExecutor::new(self.io, self.documents);
        let _guards = match op {
            ResourceOp::Create(create) => vec![self.locks.lock(&create.uri).await],
            ResourceOp::Rename(rename) => self.locks.lock_pair(&rename.old_uri, &rename.new_uri).await,
            ResourceOp::Delete(delete) => vec![self.locks.lock(&delete.uri).await],
        };
        executor.execute(op).await
    }

    /// Read the file behind `uri`, apply `edits` and write the result back
    async fn rewrite<E: TextReplacement>(&self, uri: &Url, edits: &[E]) -> Result<String> {
        if uri.scheme() != "file" {
            return Err(EditError::Unsupported(format!("text edits on non-file URI {}", uri)));
        }

        let path = self.io.from_uri(uri, false)?;
        let content = self.io.read_file(&path).await?;
        let new_content = apply_text_edits(&content, edits);
        self.io.write_file(uri, &new_content).await?;

        Ok(new_content)
    }
}

fn is_empty(changes: &DocumentChanges) -> bool {
    match changes {
        DocumentChanges::Edits(edits) => edits.is_empty(),
        DocumentChanges::Operations(operations) => operations.is_empty(),
    }
}
