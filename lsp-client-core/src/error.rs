use lsp_types::Url;
use std::path::PathBuf;

/// Errors raised by the document state store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentStateError {
    #[error("Document {0} not found")]
    NotFound(Url),

    #[error("Document {0} is already registered")]
    AlreadyRegistered(Url),
}

/// Errors raised by the file I/O collaborator
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Invalid file URI: {0}")]
    InvalidUri(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FileError {
    /// Classify an `std::io::Error` raised while touching `path`
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            FileError::NotFound(path)
        } else {
            FileError::Io { path, source }
        }
    }
}

/// Failure of a single sub-change of a workspace edit.
///
/// Every variant is recoverable: the applicator turns it into an
/// `applied: false` result carrying the `Display` text as the reason.
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("Document {uri} not open in client")]
    DocumentNotOpen { uri: Url },

    #[error("Version mismatch for {uri}: expected {expected}, got {actual}")]
    VersionMismatch { uri: Url, expected: i32, actual: i32 },

    #[error("Cannot create {uri}: file already exists")]
    AlreadyExists { uri: Url },

    #[error("Cannot rename {uri}: source does not exist")]
    SourceNotFound { uri: Url },

    #[error("Cannot delete {uri}: target does not exist")]
    TargetNotFound { uri: Url },

    #[error("Cannot delete directory {uri}: directory is not empty and recursive deletion was not requested")]
    DirectoryNotEmptyOrNotRecursive { uri: Url },

    #[error(transparent)]
    File(#[from] FileError),

    #[error("I/O error while applying edit to {uri}: {source}")]
    Io {
        uri: Url,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported workspace edit operation: {0}")]
    Unsupported(String),

    #[error(transparent)]
    State(#[from] DocumentStateError),
}

impl EditError {
    pub(crate) fn io(uri: &Url, source: std::io::Error) -> Self {
        EditError::Io {
            uri: uri.clone(),
            source,
        }
    }
}
