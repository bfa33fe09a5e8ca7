pub mod document_state;
pub mod error;
pub mod file_io;
pub mod resource_ops;
pub mod text_edit;
pub mod workspace_edit;

pub use document_state::{DocumentLocks, DocumentState, DocumentStateManager};
pub use error::{DocumentStateError, EditError, FileError};
pub use file_io::{DocumentIo, LocalFileSystem};
pub use resource_ops::ResourceOperationExecutor;
pub use text_edit::{apply_text_edits, SnippetString, SnippetTextEdit, TextReplacement};
pub use workspace_edit::{ApplyOutcome, WorkspaceEditApplicator};
