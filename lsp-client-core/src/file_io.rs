use crate::error::FileError;
use async_trait::async_trait;
use lsp_types::Url;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

type Result<T> = std::result::Result<T, FileError>;

/// File access used when applying workspace edits.
///
/// Reads go by local path, writes go by URI, and `from_uri` maps one to the
/// other.
#[async_trait]
pub trait DocumentIo: Send + Sync {
    /// Read the current content of a file. Fails with [`FileError::NotFound`]
    /// when the file is absent.
    async fn read_file(&self, path: &Path) -> Result<String>;

    /// Replace the content of the file behind `uri`
    async fn write_file(&self, uri: &Url, content: &str) -> Result<()>;

    /// Resolve a `file:` URI to a local path, optionally relative to the
    /// workspace root
    fn from_uri(&self, uri: &Url, relative: bool) -> Result<PathBuf>;
}

/// [`DocumentIo`] backed by the local filesystem
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    workspace_root: PathBuf,
}

impl LocalFileSystem {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Build a `file:` URI for a path, resolving relative paths against the
    /// workspace root
    pub fn to_uri(&self, path: &Path) -> Result<Url> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        };
        Url::from_file_path(&absolute).map_err(|_| FileError::InvalidUri(absolute.display().to_string()))
    }
}

#[async_trait]
impl DocumentIo for LocalFileSystem {
    async fn read_file(&self, path: &Path) -> Result<String> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        };

        debug!("Reading {}", path.display());
        fs::read_to_string(&path)
            .await
            .map_err(|e| FileError::from_io(&path, e))
    }

    async fn write_file(&self, uri: &Url, content: &str) -> Result<()> {
        let path = self.from_uri(uri, false)?;

        debug!("Writing {} bytes to {}", content.len(), path.display());
        fs::write(&path, content)
            .await
            .map_err(|e| FileError::from_io(&path, e))
    }

    fn from_uri(&self, uri: &Url, relative: bool) -> Result<PathBuf> {
        let path = uri_to_path(uri)?;
        if !relative {
            return Ok(path);
        }

        Ok(pathdiff::diff_paths(&path, &self.workspace_root).unwrap_or(path))
    }
}

/// Convert a `file:` URI into an absolute local path
pub fn uri_to_path(uri: &Url) -> Result<PathBuf> {
    if uri.scheme() != "file" {
        return Err(FileError::InvalidUri(uri.to_string()));
    }
    uri.to_file_path()
        .map_err(|_| FileError::InvalidUri(uri.to_string()))
}
