use crate::document_state::DocumentStateManager;
use crate::error::EditError;
use crate::file_io::DocumentIo;
use lsp_types::{ResourceOp, Url};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

type Result<T> = std::result::Result<T, EditError>;

/// Performs create/rename/delete resource operations on disk and keeps the
/// document state store in line with what happened on disk.
///
/// The filesystem change and the store update are two separate steps; a
/// failure between them leaves the store stale.
pub struct ResourceOperationExecutor<'a, F: DocumentIo + ?Sized> {
    io: &'a F,
    documents: &'a RwLock<DocumentStateManager>,
}

impl<'a, F: DocumentIo + ?Sized> ResourceOperationExecutor<'a, F> {
    pub fn new(io: &'a F, documents: &'a RwLock<DocumentStateManager>) -> Self {
        Self { io, documents }
    }

    pub async fn execute(&self, op: &ResourceOp) -> Result<()> {
        match op {
            ResourceOp::Create(create) => {
                let options = create.options.as_ref();
                self.create_file(
                    &create.uri,
                    options.is_some_and(|o| o.overwrite == Some(true)),
                    options.is_some_and(|o| o.ignore_if_exists == Some(true)),
                )
                .await
            }
            ResourceOp::Rename(rename) => {
                let options = rename.options.as_ref();
                self.rename_file(
                    &rename.old_uri,
                    &rename.new_uri,
                    options.is_some_and(|o| o.overwrite == Some(true)),
                    options.is_some_and(|o| o.ignore_if_exists == Some(true)),
                )
                .await
            }
            ResourceOp::Delete(delete) => {
                let options = delete.options.as_ref();
                self.delete_file(
                    &delete.uri,
                    options.is_some_and(|o| o.recursive == Some(true)),
                    options.is_some_and(|o| o.ignore_if_not_exists == Some(true)),
                )
                .await
            }
        }
    }

    /// Create an empty file. `overwrite` wins over `ignore_if_exists`.
    pub async fn create_file(&self, uri: &Url, overwrite: bool, ignore_if_exists: bool) -> Result<()> {
        let path = self.local_path(uri, "create")?;

        if metadata(&path).await.map_err(|e| EditError::io(uri, e))?.is_some() {
            if ignore_if_exists && !overwrite {
                debug!("Create skipped, {} already exists", uri);
                return Ok(());
            }
            if !overwrite {
                return Err(EditError::AlreadyExists { uri: uri.clone() });
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| EditError::io(uri, e))?;
        }
        fs::write(&path, b"").await.map_err(|e| EditError::io(uri, e))?;
        info!("Created file {}", path.display());

        let mut documents = self.documents.write().await;
        if documents.is_registered(uri) {
            documents.update_content(uri, "")?;
        } else {
            documents.register(uri.clone(), "", 0)?;
        }

        Ok(())
    }

    /// Rename a file or directory, moving tracked document state along with it
    pub async fn rename_file(
        &self,
        old_uri: &Url,
        new_uri: &Url,
        overwrite: bool,
        ignore_if_exists: bool,
    ) -> Result<()> {
        let old_path = self.local_path(old_uri, "rename")?;
        let new_path = self.local_path(new_uri, "rename")?;

        if metadata(&old_path).await.map_err(|e| EditError::io(old_uri, e))?.is_none() {
            return Err(EditError::SourceNotFound { uri: old_uri.clone() });
        }
        if old_path == new_path {
            debug!("Rename of {} onto itself", old_uri);
            return Ok(());
        }

        if let Some(target) = metadata(&new_path).await.map_err(|e| EditError::io(new_uri, e))? {
            if ignore_if_exists && !overwrite {
                debug!("Rename skipped, {} already exists", new_uri);
                return Ok(());
            }
            if !overwrite {
                return Err(EditError::AlreadyExists { uri: new_uri.clone() });
            }

            remove_path(&new_path, &target, true)
                .await
                .map_err(|e| EditError::io(new_uri, e))?;
            self.documents.write().await.remove_under(new_uri);
        }

        if let Some(parent) = new_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| EditError::io(new_uri, e))?;
        }
        fs::rename(&old_path, &new_path)
            .await
            .map_err(|e| EditError::io(old_uri, e))?;
        info!("Renamed {} -> {}", old_path.display(), new_path.display());

        self.documents.write().await.rename_tree(old_uri, new_uri);
        Ok(())
    }

    /// Delete a file or directory, dropping tracked state for everything removed.
    ///
    /// Empty directories may be removed without `recursive`.
    pub async fn delete_file(&self, uri: &Url, recursive: bool, ignore_if_not_exists: bool) -> Result<()> {
        let path = self.local_path(uri, "delete")?;

        let target = match metadata(&path).await.map_err(|e| EditError::io(uri, e))? {
            Some(target) => target,
            None if ignore_if_not_exists => {
                debug!("Delete skipped, {} does not exist", uri);
                return Ok(());
            }
            None => return Err(EditError::TargetNotFound { uri: uri.clone() }),
        };

        if target.is_dir() && !recursive && !is_empty_dir(&path).await.map_err(|e| EditError::io(uri, e))? {
            return Err(EditError::DirectoryNotEmptyOrNotRecursive { uri: uri.clone() });
        }

        remove_path(&path, &target, recursive)
            .await
            .map_err(|e| EditError::io(uri, e))?;
        info!("Deleted {}", path.display());

        let dropped = self.documents.write().await.remove_under(uri);
        if !dropped.is_empty() {
            debug!("Dropped {} tracked documents under {}", dropped.len(), uri);
        }
        Ok(())
    }

    fn local_path(&self, uri: &Url, operation: &str) -> Result<PathBuf> {
        if uri.scheme() != "file" {
            return Err(EditError::Unsupported(format!(
                "{} on non-file URI {}",
                operation, uri
            )));
        }
        Ok(self.io.from_uri(uri, false)?)
    }
}

/// Metadata of the path itself; symlinks are not followed
async fn metadata(path: &Path) -> std::io::Result<Option<Metadata>> {
    match fs::symlink_metadata(path).await {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

async fn is_empty_dir(path: &Path) -> std::io::Result<bool> {
    let mut entries = fs::read_dir(path).await?;
    Ok(entries.next_entry().await?.is_none())
}

async fn remove_path(path: &Path, metadata: &Metadata, recursive: bool) -> std::io::Result<()> {
    // Links are removed themselves, never their target
    if metadata.file_type().is_symlink() || !metadata.is_dir() {
        fs::remove_file(path).await
    } else if recursive {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_dir(path).await
    }
}
