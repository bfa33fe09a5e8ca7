use crate::settings::Settings;
use lsp_client_core::{
    DocumentIo, DocumentLocks, DocumentStateError, DocumentStateManager, FileError,
    LocalFileSystem, WorkspaceEditApplicator,
};
use lsp_client_protocol::{
    ApplyEditResponder, Capability, CapabilitySet, FileOperationFlows, FileOperationServer,
    RouterError, ServerRequestRouter,
};
use lsp_types::{ClientCapabilities, Url, WorkspaceEdit};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tower_lsp::jsonrpc::{Request, Response};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Workspace edit rejected: {0}")]
    EditRejected(String),

    #[error("Workspace edit did not finish within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    File(#[from] FileError),

    #[error(transparent)]
    State(#[from] DocumentStateError),

    #[error(transparent)]
    Router(#[from] RouterError),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// The client side of a language server session: tracks open documents,
/// applies workspace edits and answers server-initiated requests.
pub struct LanguageClient<F: DocumentIo + 'static = LocalFileSystem> {
    workspace_root: PathBuf,
    io: Arc<F>,
    documents: Arc<RwLock<DocumentStateManager>>,
    locks: DocumentLocks,
    capabilities: CapabilitySet,
    router: ServerRequestRouter,
    apply_timeout: Duration,
    request_timeout: Duration,
}

impl LanguageClient<LocalFileSystem> {
    /// A client over the local filesystem rooted at `settings.workspace`
    pub fn from_settings(settings: &Settings, capabilities: CapabilitySet) -> Result<Self> {
        let io = Arc::new(LocalFileSystem::new(settings.workspace.clone()));
        Ok(Self::new(settings.workspace.clone(), io, capabilities)?
            .with_apply_timeout(settings.apply_timeout())
            .with_request_timeout(settings.request_timeout()))
    }
}

impl<F: DocumentIo + 'static> LanguageClient<F> {
    pub fn new(
        workspace_root: impl Into<PathBuf>,
        io: Arc<F>,
        capabilities: CapabilitySet,
    ) -> Result<Self> {
        let documents = Arc::new(RwLock::new(DocumentStateManager::new()));
        let locks = DocumentLocks::default();

        let mut router = ServerRequestRouter::new();
        if capabilities.contains(Capability::ApplyEdit) {
            router.register(Arc::new(ApplyEditResponder::new(
                io.clone(),
                documents.clone(),
                locks.clone(),
            )))?;
        }

        Ok(Self {
            workspace_root: workspace_root.into(),
            io,
            documents,
            locks,
            capabilities,
            router,
            apply_timeout: Settings::default().apply_timeout(),
            request_timeout: Settings::default().request_timeout(),
        })
    }

    pub fn with_apply_timeout(mut self, timeout: Duration) -> Self {
        self.apply_timeout = timeout;
        self
    }

    /// Bound how long the server may take to answer a `will*` file request
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Shared document store, for callers that drive the core directly
    pub fn documents(&self) -> Arc<RwLock<DocumentStateManager>> {
        self.documents.clone()
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn client_capabilities(&self) -> ClientCapabilities {
        self.capabilities.client_capabilities()
    }

    /// Read a file and start tracking it at version 0
    pub async fn open_document(&self, path: impl AsRef<Path>) -> Result<Url> {
        let path = self.absolute(path.as_ref());
        let uri = Url::from_file_path(&path)
            .map_err(|_| FileError::InvalidUri(path.display().to_string()))?;

        let _guard = self.locks.lock(&uri).await;
        let content = self.io.read_file(&path).await?;
        self.documents.write().await.register(uri.clone(), content, 0)?;

        info!("Document opened: {}", uri);
        Ok(uri)
    }

    pub async fn close_document(&self, uri: &Url) -> Result<()> {
        let _guard = self.locks.lock(uri).await;
        self.documents.write().await.unregister(uri)?;
        info!("Document closed: {}", uri);
        Ok(())
    }

    /// Record that a tracked document changed outside of a workspace edit
    pub async fn notify_external_change(&self, uri: &Url) -> Result<i32> {
        let _guard = self.locks.lock(uri).await;
        let version = self.documents.write().await.increment_version(uri)?;
        debug!("External change to {} (now version {})", uri, version);
        Ok(version)
    }

    pub async fn document_version(&self, uri: &Url) -> Result<i32> {
        Ok(self.documents.read().await.get_version(uri)?)
    }

    pub async fn document_content(&self, uri: &Url) -> Result<String> {
        Ok(self.documents.read().await.get_content(uri)?.to_string())
    }

    /// Apply `edit`, failing with [`ClientError::EditRejected`] if any
    /// sub-change fails. Sub-changes before the failing one stay applied.
    pub async fn apply_workspace_edit(&self, edit: &WorkspaceEdit) -> Result<()> {
        let outcome = WorkspaceEditApplicator::new(self.io.as_ref(), &self.documents, &self.locks)
            .apply(edit)
            .await;

        if outcome.applied {
            Ok(())
        } else {
            Err(ClientError::EditRejected(
                outcome.failure_reason.unwrap_or_default(),
            ))
        }
    }

    /// Like [`Self::apply_workspace_edit`] but bounded by the apply timeout.
    /// A batch that times out may have been partially applied.
    pub async fn apply_workspace_edit_with_timeout(&self, edit: &WorkspaceEdit) -> Result<()> {
        match tokio::time::timeout(self.apply_timeout, self.apply_workspace_edit(edit)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Workspace edit timed out after {:?}", self.apply_timeout);
                Err(ClientError::Timeout(self.apply_timeout))
            }
        }
    }

    /// Entry point for requests and notifications sent by the server
    pub async fn handle_server_request(&self, request: Request) -> Option<Response> {
        self.router.dispatch(request).await
    }

    pub async fn create_files<S: FileOperationServer + ?Sized>(
        &self,
        server: &S,
        uris: &[Url],
    ) -> anyhow::Result<()> {
        self.file_operations(server).create_files_with_server(uris).await
    }

    pub async fn rename_files<S: FileOperationServer + ?Sized>(
        &self,
        server: &S,
        renames: &[(Url, Url)],
    ) -> anyhow::Result<()> {
        self.file_operations(server).rename_files_with_server(renames).await
    }

    pub async fn delete_files<S: FileOperationServer + ?Sized>(
        &self,
        server: &S,
        uris: &[Url],
    ) -> anyhow::Result<()> {
        self.file_operations(server).delete_files_with_server(uris).await
    }

    fn file_operations<'a, S: FileOperationServer + ?Sized>(
        &'a self,
        server: &'a S,
    ) -> FileOperationFlows<'a, F, S> {
        FileOperationFlows::new(
            self.io.as_ref(),
            &self.documents,
            &self.locks,
            &self.capabilities,
            server,
        )
        .with_request_timeout(self.request_timeout)
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        }
    }
}
