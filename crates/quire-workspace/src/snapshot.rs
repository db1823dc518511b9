use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use quire_core::{
    normalize_path, FileKind, HelperDescriptor, HostDocument, HostProject, ProjectConfiguration,
    ProjectKey, SemanticFacts, SourceText, TextLoadError, TextSource,
};

use crate::engine::ProjectEngine;
use crate::state::{DocumentState, ProjectState};

/// Immutable, point-in-time view of one project.
///
/// Cloning is cheap. A snapshot never changes after it is handed out; later updates produce new
/// snapshots.
#[derive(Clone)]
pub struct ProjectSnapshot {
    state: Arc<ProjectState>,
}

impl ProjectSnapshot {
    pub(crate) fn new(state: Arc<ProjectState>) -> Self {
        Self { state }
    }

    pub fn key(&self) -> &ProjectKey {
        &self.state.host_project.key
    }

    pub fn host_project(&self) -> &HostProject {
        &self.state.host_project
    }

    pub fn file_path(&self) -> &Path {
        &self.state.host_project.file_path
    }

    pub fn intermediate_output_path(&self) -> &Path {
        &self.state.host_project.intermediate_output_path
    }

    pub fn configuration(&self) -> &ProjectConfiguration {
        &self.state.host_project.configuration
    }

    pub fn root_namespace(&self) -> Option<&str> {
        self.state.host_project.root_namespace.as_deref()
    }

    pub fn display_name(&self) -> String {
        self.state.host_project.display_name()
    }

    /// Incremented by every mutation of this project.
    pub fn version(&self) -> u64 {
        self.state.version
    }

    /// Facts last pushed by the semantic workspace, if any.
    pub fn semantic_facts(&self) -> Option<&Arc<SemanticFacts>> {
        self.state.semantic_facts.as_ref()
    }

    /// The project's derived engine, built on first use and shared by every snapshot of this
    /// project until its configuration changes.
    pub fn engine(&self) -> Arc<dyn ProjectEngine> {
        self.state.engine()
    }

    /// Resolves `name` through this project's engine against this snapshot's facts.
    pub fn helper(&self, name: &str) -> Option<HelperDescriptor> {
        let facts = self.state.semantic_facts.as_deref()?;
        self.engine().resolve_helper(facts, name).cloned()
    }

    pub fn is_engine_built(&self) -> bool {
        self.state.engine.is_built()
    }

    pub fn document_count(&self) -> usize {
        self.state.documents.len()
    }

    pub fn document_paths(&self) -> impl Iterator<Item = &Path> + '_ {
        self.state.documents.keys().map(PathBuf::as_path)
    }

    pub fn documents(&self) -> impl Iterator<Item = DocumentSnapshot> + '_ {
        self.state
            .documents
            .values()
            .map(|document| DocumentSnapshot::new(self.key().clone(), Arc::clone(document)))
    }

    pub fn document(&self, path: impl AsRef<Path>) -> Option<DocumentSnapshot> {
        let path = normalize_path(path.as_ref());
        self.state
            .documents
            .get(&path)
            .map(|document| DocumentSnapshot::new(self.key().clone(), Arc::clone(document)))
    }

    pub fn contains_document(&self, path: impl AsRef<Path>) -> bool {
        self.state
            .documents
            .contains_key(&normalize_path(path.as_ref()))
    }

    /// Whether both snapshots are the same project state value.
    pub fn ptr_eq(&self, other: &ProjectSnapshot) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for ProjectSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectSnapshot")
            .field("key", self.key())
            .field("file_path", &self.file_path())
            .field("version", &self.state.version)
            .field("documents", &self.state.documents.len())
            .field("has_semantic_facts", &self.state.semantic_facts.is_some())
            .finish()
    }
}

/// Immutable view of one document within a project snapshot.
#[derive(Clone)]
pub struct DocumentSnapshot {
    project_key: ProjectKey,
    state: Arc<DocumentState>,
}

impl DocumentSnapshot {
    fn new(project_key: ProjectKey, state: Arc<DocumentState>) -> Self {
        Self { project_key, state }
    }

    pub fn project_key(&self) -> &ProjectKey {
        &self.project_key
    }

    pub fn host_document(&self) -> &HostDocument {
        &self.state.host_document
    }

    pub fn file_path(&self) -> &Path {
        &self.state.host_document.file_path
    }

    pub fn target_path(&self) -> &Path {
        &self.state.host_document.target_path
    }

    pub fn file_kind(&self) -> FileKind {
        self.state.host_document.file_kind
    }

    /// Starts at 1 when the document is added; open, close and every edit increment it.
    pub fn version(&self) -> u64 {
        self.state.version
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open
    }

    pub fn text_source(&self) -> &TextSource {
        self.state.text.source()
    }

    /// Returns the document text, running its loader on first access.
    pub fn text(&self) -> Result<SourceText, TextLoadError> {
        self.state.text.load()
    }

    pub fn is_text_loaded(&self) -> bool {
        self.state.text.is_loaded()
    }
}

impl fmt::Debug for DocumentSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentSnapshot")
            .field("project_key", &self.project_key)
            .field("file_path", &self.file_path())
            .field("version", &self.state.version)
            .field("is_open", &self.state.is_open)
            .finish()
    }
}
