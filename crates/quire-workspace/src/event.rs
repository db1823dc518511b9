use std::path::PathBuf;

use quire_core::ProjectKey;

use crate::snapshot::ProjectSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectChangeKind {
    ProjectAdded,
    ProjectChanged,
    ProjectRemoved,
    DocumentAdded,
    DocumentChanged,
    DocumentRemoved,
}

impl ProjectChangeKind {
    pub fn is_document_change(self) -> bool {
        matches!(
            self,
            ProjectChangeKind::DocumentAdded
                | ProjectChangeKind::DocumentChanged
                | ProjectChangeKind::DocumentRemoved
        )
    }
}

/// One change produced by an update batch.
///
/// `older` is absent for `ProjectAdded` and `newer` for `ProjectRemoved`; every other kind
/// carries both, so listeners can diff the two states without going back to the store.
#[derive(Debug, Clone)]
pub struct ProjectChangeEvent {
    pub kind: ProjectChangeKind,
    pub project_key: ProjectKey,
    pub document_file_path: Option<PathBuf>,
    pub older: Option<ProjectSnapshot>,
    pub newer: Option<ProjectSnapshot>,
    /// Set while the solution is being torn down; listeners should skip expensive reactions.
    pub solution_is_closing: bool,
}

impl ProjectChangeEvent {
    pub fn configuration_changed(&self) -> bool {
        match (&self.older, &self.newer) {
            (Some(older), Some(newer)) => older.configuration() != newer.configuration(),
            _ => false,
        }
    }
}
