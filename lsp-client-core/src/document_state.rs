use crate::error::DocumentStateError;
use lsp_types::Url;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

type Result<T> = std::result::Result<T, DocumentStateError>;

/// Snapshot of what the client believes an open document contains
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentState {
    pub content: String,
    pub version: i32,
}

impl DocumentState {
    pub fn new(content: impl Into<String>, version: i32) -> Self {
        Self {
            content: content.into(),
            version,
        }
    }
}

/// Tracks the content and version of every document the client has open.
///
/// A URI is either absent or has exactly one [`DocumentState`]. Versions only
/// move forward while a URI stays registered.
#[derive(Debug, Default)]
pub struct DocumentStateManager {
    documents: HashMap<Url, DocumentState>,
}

impl DocumentStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a document. Fails if the URI is already tracked.
    pub fn register(&mut self, uri: Url, content: impl Into<String>, version: i32) -> Result<()> {
        if self.documents.contains_key(&uri) {
            return Err(DocumentStateError::AlreadyRegistered(uri));
        }

        info!("Registering document: {} (version {})", uri, version);
        self.documents.insert(uri, DocumentState::new(content, version));
        Ok(())
    }

    /// Stop tracking a document, returning its last known state
    pub fn unregister(&mut self, uri: &Url) -> Result<DocumentState> {
        info!("Unregistering document: {}", uri);
        self.documents
            .remove(uri)
            .ok_or_else(|| DocumentStateError::NotFound(uri.clone()))
    }

    pub fn get(&self, uri: &Url) -> Result<&DocumentState> {
        self.documents
            .get(uri)
            .ok_or_else(|| DocumentStateError::NotFound(uri.clone()))
    }

    pub fn get_version(&self, uri: &Url) -> Result<i32> {
        self.get(uri).map(|state| state.version)
    }

    pub fn get_content(&self, uri: &Url) -> Result<&str> {
        self.get(uri).map(|state| state.content.as_str())
    }

    /// Replace the content of a document and bump its version by one
    pub fn update_content(&mut self, uri: &Url, content: impl Into<String>) -> Result<i32> {
        let state = self.get_mut(uri)?;
        let version = state.version + 1;
        *state = DocumentState::new(content, version);

        debug!("Updated content of {} (version {})", uri, version);
        Ok(version)
    }

    /// Bump the version of a document without touching its content
    pub fn increment_version(&mut self, uri: &Url) -> Result<i32> {
        let state = self.get_mut(uri)?;
        state.version += 1;

        debug!("Incremented version of {} to {}", uri, state.version);
        Ok(state.version)
    }

    /// Move the state tracked for `old_uri` to `new_uri`.
    ///
    /// Version and content are carried over unchanged. Any state already
    /// tracked at `new_uri` is replaced.
    pub fn rename(&mut self, old_uri: &Url, new_uri: Url) -> Result<()> {
        let state = self
            .documents
            .remove(old_uri)
            .ok_or_else(|| DocumentStateError::NotFound(old_uri.clone()))?;

        info!("Moving document state: {} -> {} (version {})", old_uri, new_uri, state.version);
        self.documents.insert(new_uri, state);
        Ok(())
    }

    /// Move `old_uri` and every tracked document beneath it to the matching
    /// location under `new_uri`. Used when a file or a whole directory is
    /// renamed on disk.
    ///
    /// Returns the `(old, new)` pairs that were moved.
    pub fn rename_tree(&mut self, old_uri: &Url, new_uri: &Url) -> Vec<(Url, Url)> {
        let old_prefix = dir_prefix(old_uri);
        let new_prefix = dir_prefix(new_uri);

        let mut sources: Vec<Url> = self
            .documents
            .keys()
            .filter(|tracked| *tracked == old_uri || tracked.as_str().starts_with(&old_prefix))
            .cloned()
            .collect();
        sources.sort();

        let mut moved = Vec::with_capacity(sources.len());
        for source in sources {
            let target = if &source == old_uri {
                new_uri.clone()
            } else {
                let suffix = &source.as_str()[old_prefix.len()..];
                match Url::parse(&format!("{}{}", new_prefix, suffix)) {
                    Ok(target) => target,
                    Err(e) => {
                        warn!("Dropping state for {}: cannot rebase onto {}: {}", source, new_uri, e);
                        self.documents.remove(&source);
                        continue;
                    }
                }
            };

            if let Some(state) = self.documents.remove(&source) {
                info!("Moving document state: {} -> {} (version {})", source, target, state.version);
                self.documents.insert(target.clone(), state);
                moved.push((source, target));
            }
        }

        moved
    }

    /// Remove `uri` and every tracked document located beneath it.
    ///
    /// Returns the URIs that were dropped, sorted.
    pub fn remove_under(&mut self, uri: &Url) -> Vec<Url> {
        let prefix = dir_prefix(uri);

        let mut removed: Vec<Url> = self
            .documents
            .keys()
            .filter(|tracked| *tracked == uri || tracked.as_str().starts_with(&prefix))
            .cloned()
            .collect();
        removed.sort();

        for tracked in &removed {
            self.documents.remove(tracked);
            debug!("Dropped document state for {}", tracked);
        }

        removed
    }

    pub fn is_registered(&self, uri: &Url) -> bool {
        self.documents.contains_key(uri)
    }

    /// All tracked URIs, sorted
    pub fn uris(&self) -> Vec<&Url> {
        let mut uris: Vec<&Url> = self.documents.keys().collect();
        uris.sort();
        uris
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn get_mut(&mut self, uri: &Url) -> Result<&mut DocumentState> {
        self.documents
            .get_mut(uri)
            .ok_or_else(|| DocumentStateError::NotFound(uri.clone()))
    }
}

fn dir_prefix(uri: &Url) -> String {
    let mut prefix = uri.as_str().to_string();
    if !prefix.ends_with('/') {
        prefix.push('/');
    }
    prefix
}

/// One async mutex per document URI.
///
/// Holding the guard for a URI serializes read-modify-write cycles on that
/// document while leaving other documents free to be edited concurrently.
#[derive(Debug, Default, Clone)]
pub struct DocumentLocks {
    locks: Arc<Mutex<HashMap<Url, Arc<Mutex<()>>>>>,
}

impl DocumentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `uri`
    pub async fn lock(&self, uri: &Url) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // An entry only the table references is neither held nor awaited
            locks.retain(|tracked, lock| tracked == uri || Arc::strong_count(lock) > 1);
            locks.entry(uri.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of URIs with a lock entry, held or not yet swept
    pub async fn entry_count(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Wait for exclusive access to two URIs, always locking in URI order
    pub async fn lock_pair(&self, first: &Url, second: &Url) -> Vec<OwnedMutexGuard<()>> {
        if first == second {
            return vec![self.lock(first).await];
        }

        let (low, high) = if first < second { (first, second) } else { (second, first) };
        let low_guard = self.lock(low).await;
        let high_guard = self.lock(high).await;
        vec![low_guard, high_guard]
    }
}
