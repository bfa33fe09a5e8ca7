use crate::capabilities::{Capability, CapabilitySet};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lsp_client_core::{
    DocumentIo, DocumentLocks, DocumentStateManager, ResourceOperationExecutor,
    WorkspaceEditApplicator,
};
use lsp_types::{
    CreateFilesParams, DeleteFilesParams, FileCreate, FileDelete, FileRename, RenameFilesParams,
    Url, WorkspaceEdit,
};
use std::future::Future;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// The server side of the `workspace/*Files` protocol
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileOperationServer: Send + Sync {
    async fn will_create_files(&self, params: CreateFilesParams) -> Result<Option<WorkspaceEdit>>;
    async fn did_create_files(&self, params: CreateFilesParams) -> Result<()>;
    async fn will_rename_files(&self, params: RenameFilesParams) -> Result<Option<WorkspaceEdit>>;
    async fn did_rename_files(&self, params: RenameFilesParams) -> Result<()>;
    async fn will_delete_files(&self, params: DeleteFilesParams) -> Result<Option<WorkspaceEdit>>;
    async fn did_delete_files(&self, params: DeleteFilesParams) -> Result<()>;
}

/// Creates, renames and deletes files on behalf of the user while keeping the
/// server informed: `will*` edits are applied before touching the
/// filesystem and `did*` notifications are sent afterwards, each only when
/// the matching capability is enabled.
pub struct FileOperationFlows<'a, F: DocumentIo + ?Sized, S: FileOperationServer + ?Sized> {
    io: &'a F,
    documents: &'a RwLock<DocumentStateManager>,
    locks: &'a DocumentLocks,
    capabilities: &'a CapabilitySet,
    server: &'a S,
    request_timeout: Option<Duration>,
}

impl<'a, F: DocumentIo + ?Sized, S: FileOperationServer + ?Sized> FileOperationFlows<'a, F, S> {
    pub fn new(
        io: &'a F,
        documents: &'a RwLock<DocumentStateManager>,
        locks: &'a DocumentLocks,
        capabilities: &'a CapabilitySet,
        server: &'a S,
    ) -> Self {
        Self {
            io,
            documents,
            locks,
            capabilities,
            server,
            request_timeout: None,
        }
    }

    /// Bound how long each `will*` request may take
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub async fn create_files_with_server(&self, uris: &[Url]) -> Result<()> {
        let params = CreateFilesParams {
            files: uris
                .iter()
                .map(|uri| FileCreate {
                    uri: uri.to_string(),
                })
                .collect(),
        };

        if self.capabilities.contains(Capability::WillCreateFiles) {
            let edit = self
                .request("willCreateFiles", self.server.will_create_files(params.clone()))
                .await?;
            self.apply_server_edit(edit, "willCreateFiles").await?;
        }

        let executor = ResourceOperationExecutor::new(self.io, self.documents);
        for uri in uris {
            let _guard = self.locks.lock(uri).await;
            executor
                .create_file(uri, false, true)
                .await
                .with_context(|| format!("Failed to create {}", uri))?;
        }
        info!("Created {} files", uris.len());

        if self.capabilities.contains(Capability::DidCreateFiles) {
            self.server.did_create_files(params).await?;
        }
        Ok(())
    }

    /// Rename each `(old, new)` pair, replacing existing targets. Sources
    /// that do not exist are skipped.
    pub async fn rename_files_with_server(&self, renames: &[(Url, Url)]) -> Result<()> {
        let params = RenameFilesParams {
            files: renames
                .iter()
                .map(|(old_uri, new_uri)| FileRename {
                    old_uri: old_uri.to_string(),
                    new_uri: new_uri.to_string(),
                })
                .collect(),
        };

        if self.capabilities.contains(Capability::WillRenameFiles) {
            let edit = self
                .request("willRenameFiles", self.server.will_rename_files(params.clone()))
                .await?;
            self.apply_server_edit(edit, "willRenameFiles").await?;
        }

        let executor = ResourceOperationExecutor::new(self.io, self.documents);
        for (old_uri, new_uri) in renames {
            if !self.exists(old_uri).await? {
                debug!("Skipping rename of missing {}", old_uri);
                continue;
            }
            let _guards = self.locks.lock_pair(old_uri, new_uri).await;
            executor
                .rename_file(old_uri, new_uri, true, false)
                .await
                .with_context(|| format!("Failed to rename {} to {}", old_uri, new_uri))?;
        }
        info!("Renamed {} files", renames.len());

        if self.capabilities.contains(Capability::DidRenameFiles) {
            self.server.did_rename_files(params).await?;
        }
        Ok(())
    }

    /// Delete files and directory trees. Missing paths are ignored.
    pub async fn delete_files_with_server(&self, uris: &[Url]) -> Result<()> {
        let params = DeleteFilesParams {
            files: uris
                .iter()
                .map(|uri| FileDelete {
                    uri: uri.to_string(),
                })
                .collect(),
        };

        if self.capabilities.contains(Capability::WillDeleteFiles) {
            let edit = self
                .request("willDeleteFiles", self.server.will_delete_files(params.clone()))
                .await?;
            self.apply_server_edit(edit, "willDeleteFiles").await?;
        }

        let executor = ResourceOperationExecutor::new(self.io, self.documents);
        for uri in uris {
            let _guard = self.locks.lock(uri).await;
            executor
                .delete_file(uri, true, true)
                .await
                .with_context(|| format!("Failed to delete {}", uri))?;
        }
        info!("Deleted {} files", uris.len());

        if self.capabilities.contains(Capability::DidDeleteFiles) {
            self.server.did_delete_files(params).await?;
        }
        Ok(())
    }

    async fn request<T>(&self, method: &str, response: impl Future<Output = Result<T>>) -> Result<T> {
        let Some(timeout) = self.request_timeout else {
            return response.await;
        };

        tokio::time::timeout(timeout, response)
            .await
            .map_err(|_| anyhow!("Server did not answer {} within {:?}", method, timeout))?
    }

    async fn apply_server_edit(&self, edit: Option<WorkspaceEdit>, request: &str) -> Result<()> {
        let Some(edit) = edit else {
            return Ok(());
        };

        debug!("Applying {} edit from server", request);
        WorkspaceEditApplicator::new(self.io, self.documents, self.locks)
            .try_apply(&edit)
            .await
            .with_context(|| format!("Failed to apply {} edit", request))
    }

    async fn exists(&self, uri: &Url) -> Result<bool> {
        let path = self.io.from_uri(uri, false)?;
        match tokio::fs::symlink_metadata(&path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_client_core::LocalFileSystem;
    use mockall::predicate::function;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        io: LocalFileSystem,
        documents: RwLock<DocumentStateManager>,
        locks: DocumentLocks,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let io = LocalFileSystem::new(dir.path().to_path_buf());
            Self {
                dir,
                io,
                documents: RwLock::new(DocumentStateManager::new()),
                locks: DocumentLocks::default(),
            }
        }

        fn uri(&self, name: &str) -> Url {
            Url::from_file_path(self.dir.path().join(name)).unwrap()
        }

        fn flows<'a>(
            &'a self,
            capabilities: &'a CapabilitySet,
            server: &'a MockFileOperationServer,
        ) -> FileOperationFlows<'a, LocalFileSystem, MockFileOperationServer> {
            FileOperationFlows::new(&self.io, &self.documents, &self.locks, capabilities, server)
        }
    }

    /// Test: Creating files with no file-operation capabilities
    /// Purpose: The server is never contacted and the file is tracked at version 0
    #[tokio::test]
    async fn test_create_without_capabilities() {
        let fixture = Fixture::new();
        let server = MockFileOperationServer::new();
        let capabilities = CapabilitySet::new();
        let uri = fixture.uri("src/new.txt");

        fixture
            .flows(&capabilities, &server)
            .create_files_with_server(&[uri.clone()])
            .await
            .unwrap();

        assert!(fixture.dir.path().join("src/new.txt").exists());
        assert_eq!(fixture.documents.write().await.get_version(&uri).unwrap(), 0);
    }

    /// Test: Creating files with will/did enabled
    /// Purpose: Both hooks are called once with the created URI
    #[tokio::test]
    async fn test_create_calls_hooks() {
        let fixture = Fixture::new();
        let uri = fixture.uri("new.txt");
        let expected = uri.to_string();

        let mut server = MockFileOperationServer::new();
        let will_expected = expected.clone();
        server
            .expect_will_create_files()
            .with(function(move |params: &CreateFilesParams| {
                params.files.len() == 1 && params.files[0].uri == will_expected
            }))
            .times(1)
            .returning(|_| Ok(None));
        server
            .expect_did_create_files()
            .with(function(move |params: &CreateFilesParams| {
                params.files[0].uri == expected
            }))
            .times(1)
            .returning(|_| Ok(()));

        let capabilities = CapabilitySet::new()
            .with(Capability::WillCreateFiles)
            .with(Capability::DidCreateFiles);

        fixture
            .flows(&capabilities, &server)
            .create_files_with_server(&[uri])
            .await
            .unwrap();
    }

    /// Test: willRenameFiles returns an edit for an open document
    /// Purpose: The edit is applied before the rename, and the renamed document keeps its bumped version
    #[tokio::test]
    async fn test_rename_applies_will_edit() {
        let fixture = Fixture::new();
        fs::write(fixture.dir.path().join("a.txt"), "import b\n").unwrap();
        let old_uri = fixture.uri("a.txt");
        let new_uri = fixture.uri("c.txt");
        fixture
            .documents
            .write()
            .await
            .register(old_uri.clone(), "import b\n", 1)
            .unwrap();

        let edit: WorkspaceEdit = serde_json::from_value(serde_json::json!({
            "documentChanges": [{
                "textDocument": {"uri": old_uri.as_str(), "version": 1},
                "edits": [{
                    "range": {"start": {"line": 0, "character": 7}, "end": {"line": 0, "character": 8}},
                    "newText": "d"
                }]
            }]
        }))
        .unwrap();

        let mut server = MockFileOperationServer::new();
        server
            .expect_will_rename_files()
            .times(1)
            .returning(move |_| Ok(Some(edit.clone())));
        let capabilities = CapabilitySet::new().with(Capability::WillRenameFiles);

        fixture
            .flows(&capabilities, &server)
            .rename_files_with_server(&[(old_uri.clone(), new_uri.clone())])
            .await
            .unwrap();

        assert_eq!(
            fs::read_to_string(fixture.dir.path().join("c.txt")).unwrap(),
            "import d\n"
        );
        let documents = fixture.documents.read().await;
        assert!(!documents.is_registered(&old_uri));
        assert_eq!(documents.get_version(&new_uri).unwrap(), 2);
    }

    /// Test: willDeleteFiles edit fails to apply
    /// Purpose: The flow aborts and the file is left on disk
    #[tokio::test]
    async fn test_failed_will_edit_aborts_delete() {
        let fixture = Fixture::new();
        fs::write(fixture.dir.path().join("a.txt"), "x").unwrap();
        let uri = fixture.uri("a.txt");
        let untracked = fixture.uri("other.txt");

        let edit: WorkspaceEdit = serde_json::from_value(serde_json::json!({
            "documentChanges": [{
                "textDocument": {"uri": untracked.as_str(), "version": 3},
                "edits": []
            }]
        }))
        .unwrap();

        let mut server = MockFileOperationServer::new();
        server
            .expect_will_delete_files()
            .times(1)
            .returning(move |_| Ok(Some(edit.clone())));
        server.expect_did_delete_files().never();
        let capabilities = CapabilitySet::new()
            .with(Capability::WillDeleteFiles)
            .with(Capability::DidDeleteFiles);

        let result = fixture
            .flows(&capabilities, &server)
            .delete_files_with_server(&[uri])
            .await;

        assert!(result.is_err());
        assert!(fixture.dir.path().join("a.txt").exists());
    }

    /// Test: Deleting a directory tree and a missing path
    /// Purpose: The tree is removed recursively, missing paths are ignored, and didDeleteFiles fires
    #[tokio::test]
    async fn test_delete_tree_and_missing() {
        let fixture = Fixture::new();
        fs::create_dir_all(fixture.dir.path().join("pkg/sub")).unwrap();
        fs::write(fixture.dir.path().join("pkg/sub/mod.txt"), "x").unwrap();
        let tracked = fixture.uri("pkg/sub/mod.txt");
        fixture
            .documents
            .write()
            .await
            .register(tracked.clone(), "x", 0)
            .unwrap();

        let mut server = MockFileOperationServer::new();
        server
            .expect_did_delete_files()
            .with(function(|params: &DeleteFilesParams| params.files.len() == 2))
            .times(1)
            .returning(|_| Ok(()));
        let capabilities = CapabilitySet::new().with(Capability::DidDeleteFiles);

        fixture
            .flows(&capabilities, &server)
            .delete_files_with_server(&[fixture.uri("pkg"), fixture.uri("missing.txt")])
            .await
            .unwrap();

        assert!(!fixture.dir.path().join("pkg").exists());
        assert!(!fixture.documents.write().await.is_registered(&tracked));
    }

    /// Test: Renaming a source that does not exist
    /// Purpose: The pair is skipped without error
    #[tokio::test]
    async fn test_rename_missing_source_skipped() {
        let fixture = Fixture::new();
        let server = MockFileOperationServer::new();
        let capabilities = CapabilitySet::new();

        fixture
            .flows(&capabilities, &server)
            .rename_files_with_server(&[(fixture.uri("gone.txt"), fixture.uri("new.txt"))])
            .await
            .unwrap();

        assert!(!fixture.dir.path().join("new.txt").exists());
    }

    /// Test: Renaming onto a path that already exists
    /// Purpose: The target is replaced and its tracked state gives way to the moved document
    #[tokio::test]
    async fn test_rename_replaces_existing_target() {
        let fixture = Fixture::new();
        fs::write(fixture.dir.path().join("a.txt"), "new body").unwrap();
        fs::write(fixture.dir.path().join("b.txt"), "old body").unwrap();
        let old_uri = fixture.uri("a.txt");
        let new_uri = fixture.uri("b.txt");
        {
            let mut documents = fixture.documents.write().await;
            documents.register(old_uri.clone(), "new body", 4).unwrap();
            documents.register(new_uri.clone(), "old body", 9).unwrap();
        }

        let server = MockFileOperationServer::new();
        let capabilities = CapabilitySet::new();
        fixture
            .flows(&capabilities, &server)
            .rename_files_with_server(&[(old_uri.clone(), new_uri.clone())])
            .await
            .unwrap();

        assert_eq!(
            fs::read_to_string(fixture.dir.path().join("b.txt")).unwrap(),
            "new body"
        );
        let documents = fixture.documents.read().await;
        assert!(!documents.is_registered(&old_uri));
        assert_eq!(documents.get_version(&new_uri).unwrap(), 4);
    }

    struct SlowServer;

    #[async_trait]
    impl FileOperationServer for SlowServer {
        async fn will_create_files(&self, _params: CreateFilesParams) -> Result<Option<WorkspaceEdit>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        }
        async fn did_create_files(&self, _params: CreateFilesParams) -> Result<()> {
            Ok(())
        }
        async fn will_rename_files(&self, _params: RenameFilesParams) -> Result<Option<WorkspaceEdit>> {
            Ok(None)
        }
        async fn did_rename_files(&self, _params: RenameFilesParams) -> Result<()> {
            Ok(())
        }
        async fn will_delete_files(&self, _params: DeleteFilesParams) -> Result<Option<WorkspaceEdit>> {
            Ok(None)
        }
        async fn did_delete_files(&self, _params: DeleteFilesParams) -> Result<()> {
            Ok(())
        }
    }

    /// Test: willCreateFiles takes longer than the request timeout
    /// Purpose: The flow fails before touching the filesystem
    #[tokio::test]
    async fn test_will_request_timeout() {
        let fixture = Fixture::new();
        let capabilities = CapabilitySet::new().with(Capability::WillCreateFiles);

        let result = FileOperationFlows::new(
            &fixture.io,
            &fixture.documents,
            &fixture.locks,
            &capabilities,
            &SlowServer,
        )
        .with_request_timeout(Duration::from_millis(20))
        .create_files_with_server(&[fixture.uri("new.txt")])
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("willCreateFiles"), "unexpected error: {}", err);
        assert!(!fixture.dir.path().join("new.txt").exists());
    }
}
