use lsp_types::{
    ClientCapabilities, FailureHandlingKind, ResourceOperationKind, WorkspaceClientCapabilities,
    WorkspaceEditClientCapabilities, WorkspaceFileOperationsClientCapabilities,
};
use std::collections::BTreeSet;

/// A protocol capability the client can switch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    /// Answer `workspace/applyEdit` requests
    ApplyEdit,
    /// Accept `documentChanges` with resource operations
    WorkspaceEdit,
    WillCreateFiles,
    DidCreateFiles,
    WillRenameFiles,
    DidRenameFiles,
    WillDeleteFiles,
    DidDeleteFiles,
}

impl Capability {
    pub fn is_file_operation(self) -> bool {
        !matches!(self, Capability::ApplyEdit | Capability::WorkspaceEdit)
    }
}

/// The set of capabilities enabled on a client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    enabled: BTreeSet<Capability>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Workspace edit application without the file-operation protocol
    pub fn workspace_edits() -> Self {
        Self::new()
            .with(Capability::ApplyEdit)
            .with(Capability::WorkspaceEdit)
    }

    /// Every capability this client knows about
    pub fn all() -> Self {
        [
            Capability::ApplyEdit,
            Capability::WorkspaceEdit,
            Capability::WillCreateFiles,
            Capability::DidCreateFiles,
            Capability::WillRenameFiles,
            Capability::DidRenameFiles,
            Capability::WillDeleteFiles,
            Capability::DidDeleteFiles,
        ]
        .into_iter()
        .collect()
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.enabled.insert(capability);
        self
    }

    pub fn insert(&mut self, capability: Capability) -> bool {
        self.enabled.insert(capability)
    }

    pub fn remove(&mut self, capability: Capability) -> bool {
        self.enabled.remove(&capability)
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.enabled.contains(&capability)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.enabled.iter().copied()
    }

    /// Build the capabilities advertised to the server in `initialize`
    pub fn client_capabilities(&self) -> ClientCapabilities {
        let mut workspace = WorkspaceClientCapabilities::default();

        if self.contains(Capability::ApplyEdit) {
            workspace.apply_edit = Some(true);
        }

        if self.contains(Capability::WorkspaceEdit) {
            workspace.workspace_edit = Some(WorkspaceEditClientCapabilities {
                document_changes: Some(true),
                resource_operations: Some(vec![
                    ResourceOperationKind::Create,
                    ResourceOperationKind::Rename,
                    ResourceOperationKind::Delete,
                ]),
                // Batches stop at the first failing change and are not undone
                failure_handling: Some(FailureHandlingKind::Abort),
                ..Default::default()
            });
        }

        if self.enabled.iter().any(|capability| capability.is_file_operation()) {
            workspace.file_operations = Some(WorkspaceFileOperationsClientCapabilities {
                will_create: self.flag(Capability::WillCreateFiles),
                did_create: self.flag(Capability::DidCreateFiles),
                will_rename: self.flag(Capability::WillRenameFiles),
                did_rename: self.flag(Capability::DidRenameFiles),
                will_delete: self.flag(Capability::WillDeleteFiles),
                did_delete: self.flag(Capability::DidDeleteFiles),
                ..Default::default()
            });
        }

        ClientCapabilities {
            workspace: Some(workspace),
            ..Default::default()
        }
    }

    fn flag(&self, capability: Capability) -> Option<bool> {
        self.contains(capability).then_some(true)
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self {
            enabled: iter.into_iter().collect(),
        }
    }
}
