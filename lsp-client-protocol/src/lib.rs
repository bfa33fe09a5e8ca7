pub mod apply_edit;
pub mod capabilities;
pub mod file_operations;
pub mod router;

pub use apply_edit::ApplyEditResponder;
pub use capabilities::{Capability, CapabilitySet};
pub use file_operations::{FileOperationFlows, FileOperationServer};
pub use router::{RouterError, ServerRequestHandler, ServerRequestRouter};
