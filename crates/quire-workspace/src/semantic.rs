//! Interface to the external semantic workspace.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use quire_core::SemanticFacts;
use quire_scheduler::CancellationToken;

/// The semantic workspace's identifier for a compilation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub u32);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

/// The semantic workspace's identifier for a document inside a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(pub u32);

/// One compilation unit as the semantic workspace currently sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticUnit {
    pub id: UnitId,
    pub name: String,
    pub file_path: PathBuf,
    /// Matched against [`HostProject::intermediate_output_path`](quire_core::HostProject) to
    /// find the project this unit backs.
    pub intermediate_output_path: Option<PathBuf>,
    /// Units this unit references.
    pub references: Vec<UnitId>,
    pub documents: BTreeMap<DocumentId, PathBuf>,
}

impl SemanticUnit {
    pub fn new(id: UnitId, name: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            name: name.into(),
            file_path: file_path.into(),
            intermediate_output_path: None,
            references: Vec::new(),
            documents: BTreeMap::new(),
        }
    }

    pub fn with_intermediate_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.intermediate_output_path = Some(path.into());
        self
    }

    pub fn with_reference(mut self, unit: UnitId) -> Self {
        self.references.push(unit);
        self
    }

    pub fn with_document(mut self, id: DocumentId, path: impl Into<PathBuf>) -> Self {
        self.documents.insert(id, path.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkspaceChangeKind {
    SolutionAdded,
    SolutionChanged,
    SolutionReloaded,
    SolutionCleared,
    SolutionRemoved,
    ProjectAdded,
    ProjectChanged,
    ProjectReloaded,
    ProjectRemoved,
    DocumentAdded,
    DocumentChanged,
    DocumentReloaded,
    DocumentRemoved,
}

impl WorkspaceChangeKind {
    pub fn is_solution_change(self) -> bool {
        matches!(
            self,
            WorkspaceChangeKind::SolutionAdded
                | WorkspaceChangeKind::SolutionChanged
                | WorkspaceChangeKind::SolutionReloaded
                | WorkspaceChangeKind::SolutionCleared
                | WorkspaceChangeKind::SolutionRemoved
        )
    }
}

/// One entry of the semantic workspace's change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkspaceChange {
    pub kind: WorkspaceChangeKind,
    pub unit: Option<UnitId>,
    pub document: Option<DocumentId>,
}

impl WorkspaceChange {
    pub fn solution(kind: WorkspaceChangeKind) -> Self {
        Self {
            kind,
            unit: None,
            document: None,
        }
    }

    pub fn unit(kind: WorkspaceChangeKind, unit: UnitId) -> Self {
        Self {
            kind,
            unit: Some(unit),
            document: None,
        }
    }

    pub fn document(kind: WorkspaceChangeKind, unit: UnitId, document: DocumentId) -> Self {
        Self {
            kind,
            unit: Some(unit),
            document: Some(document),
        }
    }
}

/// The externally owned workspace that computes semantic facts.
///
/// Implementations are called from background threads.
pub trait SemanticWorkspace: Send + Sync {
    fn units(&self) -> Vec<SemanticUnit>;

    fn unit(&self, id: UnitId) -> Option<SemanticUnit>;

    /// Computes the current facts for `id`. May be slow; should poll `cancel`.
    fn semantic_facts(&self, id: UnitId, cancel: &CancellationToken)
        -> anyhow::Result<SemanticFacts>;
}
