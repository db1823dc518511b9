//! The snapshot store and its notification dispatcher.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::ReentrantMutex;
use quire_core::{
    normalize_path, ContentChange, HostDocument, HostProject, ProjectConfiguration, ProjectKey,
    SemanticFacts, SourceText, TextSource,
};
use thiserror::Error;

use crate::dispatch::{ListenerId, ListenerTier, Listeners, ProjectChangeListener};
use crate::engine::{DefaultProjectEngineFactory, ProjectEngineFactory};
use crate::event::{ProjectChangeEvent, ProjectChangeKind};
use crate::snapshot::{DocumentSnapshot, ProjectSnapshot};
use crate::state::{DocumentState, ProjectState};

#[derive(Debug, Error)]
pub enum UpdateError {
    /// The batch committed, but a listener failed and the remaining events were not delivered.
    #[error("listener failed while handling {kind:?} for project {project_key}")]
    Listener {
        kind: ProjectChangeKind,
        project_key: ProjectKey,
        #[source]
        source: anyhow::Error,
    },
}

/// Published state. Replaced wholesale after every committed batch.
#[derive(Default)]
struct StoreState {
    projects: BTreeMap<ProjectKey, Arc<ProjectState>>,
    /// Normalized intermediate output path to the projects built there.
    output_paths: OutputPathIndex,
    solution_is_closing: bool,
    revision: u64,
}

type PendingBatch = Vec<ProjectChangeEvent>;

type OutputPathIndex = BTreeMap<PathBuf, BTreeSet<ProjectKey>>;

/// Writer-side bookkeeping, only touched while holding the writer lock.
#[derive(Default)]
struct WriterState {
    /// One frame per batch currently being dispatched, innermost last. Each frame queues the
    /// batches its listeners committed, to be delivered before its next event.
    frames: Vec<VecDeque<PendingBatch>>,
}

struct ManagerInner {
    state: ArcSwap<StoreState>,
    writer: ReentrantMutex<RefCell<WriterState>>,
    listeners: Listeners,
    engine_factory: Arc<dyn ProjectEngineFactory>,
}

/// Authoritative, versioned store of projects and their documents.
///
/// Reads are wait-free and always observe a fully committed batch. All mutation goes through
/// [`update`](Self::update), which is serialized across threads.
#[derive(Clone)]
pub struct ProjectSnapshotManager {
    inner: Arc<ManagerInner>,
}

impl Default for ProjectSnapshotManager {
    fn default() -> Self {
        Self::new(Arc::new(DefaultProjectEngineFactory))
    }
}

impl ProjectSnapshotManager {
    pub fn new(engine_factory: Arc<dyn ProjectEngineFactory>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                state: ArcSwap::from_pointee(StoreState::default()),
                writer: ReentrantMutex::new(RefCell::new(WriterState::default())),
                listeners: Listeners::default(),
                engine_factory,
            }),
        }
    }

    pub fn project(&self, key: &ProjectKey) -> Option<ProjectSnapshot> {
        self.inner
            .state
            .load()
            .projects
            .get(key)
            .map(|state| ProjectSnapshot::new(Arc::clone(state)))
    }

    /// Every project, ordered by key.
    pub fn projects(&self) -> Vec<ProjectSnapshot> {
        self.inner
            .state
            .load()
            .projects
            .values()
            .map(|state| ProjectSnapshot::new(Arc::clone(state)))
            .collect()
    }

    pub fn project_keys(&self) -> Vec<ProjectKey> {
        self.inner.state.load().projects.keys().cloned().collect()
    }

    pub fn find_project_by_intermediate_output_path(
        &self,
        path: impl AsRef<Path>,
    ) -> Option<ProjectSnapshot> {
        let path = normalize_path(path.as_ref());
        let state = self.inner.state.load();
        let key = state.output_paths.get(&path)?.first()?;
        state
            .projects
            .get(key)
            .map(|state| ProjectSnapshot::new(Arc::clone(state)))
    }

    pub fn document(&self, key: &ProjectKey, path: impl AsRef<Path>) -> Option<DocumentSnapshot> {
        self.project(key)?.document(path)
    }

    /// The document at `path` in every project that contains it.
    pub fn documents_for_path(&self, path: impl AsRef<Path>) -> Vec<DocumentSnapshot> {
        let path = normalize_path(path.as_ref());
        self.projects()
            .iter()
            .filter_map(|project| project.document(&path))
            .collect()
    }

    pub fn is_document_open(&self, path: impl AsRef<Path>) -> bool {
        let path = normalize_path(path.as_ref());
        self.inner
            .state
            .load()
            .projects
            .values()
            .any(|state| state.documents.get(&path).is_some_and(|doc| doc.is_open))
    }

    pub fn open_documents(&self) -> Vec<PathBuf> {
        let state = self.inner.state.load();
        let open: BTreeSet<&PathBuf> = state
            .projects
            .values()
            .flat_map(|project| project.documents.iter())
            .filter(|(_, document)| document.is_open)
            .map(|(path, _)| path)
            .collect();
        open.into_iter().cloned().collect()
    }

    pub fn solution_is_closing(&self) -> bool {
        self.inner.state.load().solution_is_closing
    }

    /// Incremented once per committed batch that produced at least one event.
    pub fn revision(&self) -> u64 {
        self.inner.state.load().revision
    }

    pub fn register_listener<F>(&self, tier: ListenerTier, listener: F) -> ListenerId
    where
        F: Fn(&ProjectSnapshotManager, &ProjectChangeEvent) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.register_change_listener(tier, Arc::new(listener))
    }

    pub fn register_change_listener(
        &self,
        tier: ListenerTier,
        listener: Arc<dyn ProjectChangeListener>,
    ) -> ListenerId {
        let id = self.inner.listeners.register(tier, listener);
        tracing::debug!(target: "quire.workspace", ?id, ?tier, "registered listener");
        id
    }

    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.unregister(id)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Runs `batch` as one transaction and delivers its events.
    ///
    /// All primitives called on the [`Updater`] are applied in order to a private copy of the
    /// store, which is published only once `batch` returns; readers never see a partial batch.
    /// Events are then delivered to every [`ListenerTier::Priority`] listener, then to every
    /// [`ListenerTier::Normal`] listener, each tier in registration order.
    ///
    /// Called from a listener, the nested batch commits right away and its events are
    /// delivered, depth-first, before the next event of the enclosing batch; the nested call
    /// returns once its batch is committed. Listener failures surface from the outermost call.
    ///
    /// # Panics
    ///
    /// Calling `update` from inside `batch` itself is a contract violation and panics.
    pub fn update<F>(&self, batch: F) -> Result<(), UpdateError>
    where
        F: FnOnce(&mut Updater<'_>),
    {
        let writer = self.inner.writer.lock();
        let events = {
            let Ok(mut writer_state) = writer.try_borrow_mut() else {
                panic!(
                    "ProjectSnapshotManager::update called from inside an update batch; \
                     issue follow-up updates from a listener instead"
                );
            };
            let events = self.commit(batch);
            if let Some(frame) = writer_state.frames.last_mut() {
                if !events.is_empty() {
                    frame.push_back(events);
                }
                return Ok(());
            }
            events
        };
        self.dispatch(&writer, events)
    }

    fn commit<F>(&self, batch: F) -> Vec<ProjectChangeEvent>
    where
        F: FnOnce(&mut Updater<'_>),
    {
        let current = self.inner.state.load_full();
        let mut updater = Updater {
            projects: current.projects.clone(),
            output_paths: current.output_paths.clone(),
            solution_is_closing: current.solution_is_closing,
            modified: false,
            events: Vec::new(),
            engine_factory: &self.inner.engine_factory,
        };
        batch(&mut updater);

        let Updater {
            projects,
            output_paths,
            solution_is_closing,
            modified,
            events,
            ..
        } = updater;
        if !modified {
            return events;
        }

        let revision = if events.is_empty() {
            current.revision
        } else {
            current.revision + 1
        };
        self.inner.state.store(Arc::new(StoreState {
            projects,
            output_paths,
            solution_is_closing,
            revision,
        }));
        tracing::debug!(
            target: "quire.workspace",
            events = events.len(),
            revision,
            "committed update batch"
        );
        events
    }

    fn dispatch(
        &self,
        writer: &RefCell<WriterState>,
        events: PendingBatch,
    ) -> Result<(), UpdateError> {
        if events.is_empty() {
            return Ok(());
        }

        writer.borrow_mut().frames.push(VecDeque::new());
        let _frame = FrameGuard { writer };

        for tier in ListenerTier::DISPATCH_ORDER {
            for event in &events {
                for listener in self.inner.listeners.tier(tier) {
                    listener
                        .on_change(self, event)
                        .map_err(|source| {
                            tracing::warn!(
                                target: "quire.workspace",
                                kind = ?event.kind,
                                project = %event.project_key,
                                error = ?source,
                                "listener failed; abandoning dispatch"
                            );
                            UpdateError::Listener {
                                kind: event.kind,
                                project_key: event.project_key.clone(),
                                source,
                            }
                        })?;
                }

                loop {
                    let nested = writer
                        .borrow_mut()
                        .frames
                        .last_mut()
                        .and_then(VecDeque::pop_front);
                    let Some(nested) = nested else {
                        break;
                    };
                    self.dispatch(writer, nested)?;
                }
            }
        }
        Ok(())
    }
}

/// Pops the dispatch frame, also when a listener fails or panics.
struct FrameGuard<'a> {
    writer: &'a RefCell<WriterState>,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.writer.borrow_mut().frames.pop();
    }
}

/// Transaction handle passed to an [`update`](ProjectSnapshotManager::update) batch.
///
/// Operations naming an unknown project or document are ignored: host commands and
/// recomputation results routinely race with removals.
///
/// The handle only lives for the duration of the batch:
///
/// ```compile_fail
/// use quire_workspace::ProjectSnapshotManager;
///
/// let manager = ProjectSnapshotManager::default();
/// let mut escaped = None;
/// manager.update(|updater| escaped = Some(updater)).unwrap();
/// ```
pub struct Updater<'a> {
    projects: BTreeMap<ProjectKey, Arc<ProjectState>>,
    output_paths: OutputPathIndex,
    solution_is_closing: bool,
    modified: bool,
    events: Vec<ProjectChangeEvent>,
    engine_factory: &'a Arc<dyn ProjectEngineFactory>,
}

impl Updater<'_> {
    /// The project as modified so far by this batch.
    pub fn project(&self, key: &ProjectKey) -> Option<ProjectSnapshot> {
        self.projects
            .get(key)
            .map(|state| ProjectSnapshot::new(Arc::clone(state)))
    }

    pub fn solution_is_closing(&self) -> bool {
        self.solution_is_closing
    }

    pub fn add_project(&mut self, host_project: HostProject) {
        if self.projects.contains_key(&host_project.key) {
            tracing::trace!(
                target: "quire.workspace",
                project = %host_project.key,
                "project already tracked; ignoring add"
            );
            return;
        }

        let key = host_project.key.clone();
        self.output_paths
            .entry(host_project.intermediate_output_path.clone())
            .or_default()
            .insert(key.clone());
        let state = Arc::new(ProjectState::new(host_project, self.engine_factory));
        self.projects.insert(key.clone(), Arc::clone(&state));
        self.push_event(ProjectChangeKind::ProjectAdded, key, None, None, Some(state));
    }

    pub fn remove_project(&mut self, key: &ProjectKey) {
        let Some(older) = self.projects.remove(key) else {
            trace_unknown_project(key, "remove_project");
            return;
        };
        let path = &older.host_project.intermediate_output_path;
        if let Some(keys) = self.output_paths.get_mut(path) {
            keys.remove(key);
            if keys.is_empty() {
                self.output_paths.remove(path);
            }
        }
        self.push_event(
            ProjectChangeKind::ProjectRemoved,
            key.clone(),
            None,
            Some(older),
            None,
        );
    }

    /// Replaces the configuration and drops the cached engine, even when `configuration`
    /// equals the current one.
    pub fn update_project_configuration(
        &mut self,
        key: &ProjectKey,
        configuration: ProjectConfiguration,
    ) {
        self.modify_project(key, ProjectChangeKind::ProjectChanged, None, |state| {
            state.host_project.configuration = configuration;
            state.engine = Arc::new(state.engine.fresh());
            true
        });
    }

    /// Replaces the cached facts. The engine is kept.
    pub fn update_semantic_facts(&mut self, key: &ProjectKey, facts: Option<SemanticFacts>) {
        self.modify_project(key, ProjectChangeKind::ProjectChanged, None, |state| {
            state.semantic_facts = facts.map(Arc::new);
            true
        });
    }

    /// Adds a document. A path the project already contains is ignored.
    ///
    /// While the solution is closing the text source is replaced by empty text, so `text`'s
    /// loader never runs.
    pub fn add_document(&mut self, key: &ProjectKey, document: HostDocument, text: TextSource) {
        let text = if self.solution_is_closing {
            TextSource::empty()
        } else {
            text
        };
        let path = document.file_path.clone();
        self.modify_project(
            key,
            ProjectChangeKind::DocumentAdded,
            Some(path.clone()),
            |state| {
                if state.documents.contains_key(&path) {
                    tracing::trace!(
                        target: "quire.workspace",
                        project = %key,
                        path = %path.display(),
                        "document already tracked; ignoring add"
                    );
                    return false;
                }
                state
                    .documents
                    .insert(path, Arc::new(DocumentState::new(document, text)));
                true
            },
        );
    }

    pub fn remove_document(&mut self, key: &ProjectKey, path: impl AsRef<Path>) {
        let path = normalize_path(path.as_ref());
        self.modify_project(
            key,
            ProjectChangeKind::DocumentRemoved,
            Some(path.clone()),
            |state| state.documents.remove(&path).is_some(),
        );
    }

    /// Switches the document to an in-memory buffer owned by the editor.
    pub fn open_document(&mut self, key: &ProjectKey, path: impl AsRef<Path>, text: SourceText) {
        self.modify_document(key, path.as_ref(), |document| {
            Some(document.with_text(TextSource::Buffer(text), true))
        });
    }

    /// Hands the document back to `text` (usually a loader reading from disk). Closing a
    /// document that is not open is ignored.
    pub fn close_document(&mut self, key: &ProjectKey, path: impl AsRef<Path>, text: TextSource) {
        let text = if self.solution_is_closing {
            TextSource::empty()
        } else {
            text
        };
        self.modify_document(key, path.as_ref(), |document| {
            document
                .is_open
                .then(|| document.with_text(text, false))
        });
    }

    /// Replaces the document's whole text.
    pub fn update_document_text(
        &mut self,
        key: &ProjectKey,
        path: impl AsRef<Path>,
        text: SourceText,
    ) {
        self.modify_document(key, path.as_ref(), |document| {
            Some(document.with_text(TextSource::Buffer(text), document.is_open))
        });
    }

    /// Applies `changes`, in order, to the document's in-memory buffer as a single edit.
    ///
    /// Ignored when the document has no in-memory buffer or a range does not fit the text.
    pub fn apply_document_changes(
        &mut self,
        key: &ProjectKey,
        path: impl AsRef<Path>,
        changes: &[ContentChange],
    ) {
        let path = path.as_ref();
        self.modify_document(key, path, |document| {
            let Some(buffer) = document.text.source().as_buffer() else {
                tracing::warn!(
                    target: "quire.workspace",
                    project = %key,
                    path = %path.display(),
                    "ignoring edit for a document without an in-memory buffer"
                );
                return None;
            };

            let mut text = buffer.clone();
            if let Err(err) = text.apply_changes(changes) {
                tracing::warn!(
                    target: "quire.workspace",
                    project = %key,
                    path = %path.display(),
                    error = %err,
                    "ignoring invalid document edit"
                );
                return None;
            }
            Some(document.with_text(TextSource::Buffer(text), document.is_open))
        });
    }

    /// Tags every following event with `solution_is_closing` until
    /// [`solution_opened`](Self::solution_opened).
    pub fn solution_closed(&mut self) {
        if !self.solution_is_closing {
            tracing::debug!(target: "quire.workspace", "solution closing");
            self.solution_is_closing = true;
            self.modified = true;
        }
    }

    pub fn solution_opened(&mut self) {
        if self.solution_is_closing {
            tracing::debug!(target: "quire.workspace", "solution reopened");
            self.solution_is_closing = false;
            self.modified = true;
        }
    }

    /// Applies `f` to a copy of the project. `f` returns `false` to leave the project untouched.
    fn modify_project(
        &mut self,
        key: &ProjectKey,
        kind: ProjectChangeKind,
        document_file_path: Option<PathBuf>,
        f: impl FnOnce(&mut ProjectState) -> bool,
    ) {
        let Some(older) = self.projects.get(key).cloned() else {
            trace_unknown_project(key, "modify_project");
            return;
        };

        let mut state = ProjectState::clone(&older);
        if !f(&mut state) {
            return;
        }
        state.version = older.version + 1;

        let newer = Arc::new(state);
        self.projects.insert(key.clone(), Arc::clone(&newer));
        self.push_event(kind, key.clone(), document_file_path, Some(older), Some(newer));
    }

    /// Replaces one document with the value `f` returns; `None` leaves it untouched.
    fn modify_document(
        &mut self,
        key: &ProjectKey,
        path: &Path,
        f: impl FnOnce(&DocumentState) -> Option<DocumentState>,
    ) {
        let path = normalize_path(path);
        self.modify_project(
            key,
            ProjectChangeKind::DocumentChanged,
            Some(path.clone()),
            |state| {
                let Some(document) = state.documents.get(&path) else {
                    tracing::trace!(
                        target: "quire.workspace",
                        project = %key,
                        path = %path.display(),
                        "unknown document; ignoring"
                    );
                    return false;
                };
                let Some(updated) = f(&**document) else {
                    return false;
                };
                state.documents.insert(path.clone(), Arc::new(updated));
                true
            },
        );
    }

    fn push_event(
        &mut self,
        kind: ProjectChangeKind,
        project_key: ProjectKey,
        document_file_path: Option<PathBuf>,
        older: Option<Arc<ProjectState>>,
        newer: Option<Arc<ProjectState>>,
    ) {
        self.modified = true;
        self.events.push(ProjectChangeEvent {
            kind,
            project_key,
            document_file_path,
            older: older.map(ProjectSnapshot::new),
            newer: newer.map(ProjectSnapshot::new),
            solution_is_closing: self.solution_is_closing,
        });
    }
}

fn trace_unknown_project(key: &ProjectKey, operation: &'static str) {
    tracing::trace!(
        target: "quire.workspace",
        project = %key,
        operation,
        "unknown project; ignoring"
    );
}
