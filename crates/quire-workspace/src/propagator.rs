//! Keeps projects' semantic facts in step with the semantic workspace.
//!
//! Workspace churn is mapped to the affected projects (the changed unit's project plus every
//! project that depends on it) and each affected project gets one debounced recomputation.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use quire_config::WorkspaceConfig;
use quire_core::ProjectKey;
use quire_scheduler::{CancellationToken, Cancelled, KeyedWorkQueue, Scheduler};

use crate::dispatch::{ListenerId, ListenerTier};
use crate::event::{ProjectChangeEvent, ProjectChangeKind};
use crate::graph::DependencyGraph;
use crate::manager::ProjectSnapshotManager;
use crate::semantic::{
    DocumentId, SemanticWorkspace, UnitId, WorkspaceChange, WorkspaceChangeKind,
};
use crate::snapshot::ProjectSnapshot;

/// Suffix of a partial-class companion of a component (`Counter.razor.cs`).
const COMPANION_SUFFIX: &str = ".cs";

#[derive(Clone)]
pub struct ChangePropagator {
    inner: Arc<PropagatorInner>,
}

struct PropagatorInner {
    manager: ProjectSnapshotManager,
    workspace: Arc<dyn SemanticWorkspace>,
    settings: WorkspaceConfig,
    graph: RwLock<DependencyGraph>,
    queue: KeyedWorkQueue<ProjectKey>,
    listener: Mutex<Option<ListenerId>>,
}

impl ChangePropagator {
    /// Builds the dependency graph from `workspace` and starts listening to `manager`: adding a
    /// project or changing its configuration schedules a recomputation for it. Projects the
    /// manager already tracks are scheduled right away.
    pub fn new(
        manager: ProjectSnapshotManager,
        workspace: Arc<dyn SemanticWorkspace>,
        scheduler: Scheduler,
        settings: &WorkspaceConfig,
    ) -> Self {
        let graph = DependencyGraph::from_units(workspace.units());
        let queue = KeyedWorkQueue::new(scheduler, settings.update_delay());
        let inner = Arc::new(PropagatorInner {
            manager: manager.clone(),
            workspace,
            settings: settings.clone(),
            graph: RwLock::new(graph),
            queue,
            listener: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        let id = manager.register_listener(ListenerTier::Normal, move |_, event| {
            if let Some(inner) = weak.upgrade() {
                inner.project_changed(event);
            }
            Ok(())
        });
        *inner.listener.lock() = Some(id);

        if !manager.solution_is_closing() {
            for key in manager.project_keys() {
                PropagatorInner::enqueue(&inner, key);
            }
        }

        Self { inner }
    }

    /// Handles one entry of the semantic workspace's change feed.
    pub fn workspace_changed(&self, change: &WorkspaceChange) {
        tracing::trace!(target: "quire.propagator", ?change, "workspace changed");

        if change.kind.is_solution_change() {
            self.inner.solution_changed();
            return;
        }

        let Some(unit) = change.unit else {
            tracing::debug!(
                target: "quire.propagator",
                kind = ?change.kind,
                "workspace change without a unit; ignoring"
            );
            return;
        };

        match change.kind {
            WorkspaceChangeKind::ProjectRemoved => self.inner.unit_removed(unit),
            WorkspaceChangeKind::DocumentChanged | WorkspaceChangeKind::DocumentReloaded => {
                if self.inner.is_relevant_document(unit, change.document) {
                    self.inner.unit_changed(unit);
                }
            }
            _ => self.inner.unit_changed(unit),
        }
    }

    /// Schedules a recomputation of `key`'s semantic facts.
    pub fn enqueue_update(&self, key: &ProjectKey) {
        PropagatorInner::enqueue(&self.inner, key.clone());
    }

    pub fn dependency_graph(&self) -> DependencyGraph {
        self.inner.graph.read().clone()
    }

    pub fn update_delay(&self) -> Duration {
        self.inner.queue.delay()
    }

    pub fn pending_projects(&self) -> Vec<ProjectKey> {
        self.inner.queue.pending_keys()
    }

    pub fn is_idle(&self) -> bool {
        self.inner.queue.is_idle()
    }

    /// Resolves once no recomputation is pending or running.
    pub async fn wait_until_idle(&self) {
        self.inner.queue.wait_until_idle().await;
    }

    /// Blocking variant of [`wait_until_idle`](Self::wait_until_idle).
    pub fn block_until_idle(&self, timeout: Duration) -> bool {
        self.inner.queue.block_until_idle(timeout)
    }

    /// Stops listening to the store and drops pending recomputations.
    pub fn shutdown(&self) {
        self.inner.unregister();
        self.inner.queue.shutdown();
    }
}

impl PropagatorInner {
    fn enqueue(this: &Arc<Self>, key: ProjectKey) {
        let weak: Weak<Self> = Arc::downgrade(this);
        let project = key.clone();
        this.queue.enqueue(key, move |token| match weak.upgrade() {
            Some(inner) => inner.recompute(&project, &token),
            None => Ok(()),
        });
    }

    fn project_changed(self: Arc<Self>, event: &ProjectChangeEvent) {
        if event.solution_is_closing {
            return;
        }

        match event.kind {
            ProjectChangeKind::ProjectAdded => Self::enqueue(&self, event.project_key.clone()),
            ProjectChangeKind::ProjectChanged if event.configuration_changed() => {
                Self::enqueue(&self, event.project_key.clone());
            }
            ProjectChangeKind::ProjectRemoved => {
                self.queue.cancel(&event.project_key);
            }
            _ => {}
        }
    }

    /// Full re-sync: rebuild the graph, drop every project's facts, recompute everything.
    fn solution_changed(self: &Arc<Self>) {
        *self.graph.write() = DependencyGraph::from_units(self.workspace.units());

        let result = self.manager.update(|updater| {
            for project in self.manager.projects() {
                if project.semantic_facts().is_some() {
                    updater.update_semantic_facts(project.key(), None);
                }
            }
        });
        if let Err(err) = result {
            tracing::warn!(
                target: "quire.propagator",
                error = ?err,
                "listener failed while clearing semantic facts"
            );
        }

        for key in self.manager.project_keys() {
            Self::enqueue(self, key);
        }
    }

    fn unit_changed(self: &Arc<Self>, unit: UnitId) {
        if let Some(current) = self.workspace.unit(unit) {
            self.graph.write().upsert(current);
        }

        let affected = {
            let graph = self.graph.read();
            let mut affected = vec![unit];
            affected.extend(graph.transitive_dependents(unit));
            affected
        };
        for unit in affected {
            if let Some(project) = self.project_for_unit(unit) {
                Self::enqueue(self, project.key().clone());
            }
        }
    }

    fn unit_removed(self: &Arc<Self>, unit: UnitId) {
        let dependents = self.graph.read().transitive_dependents(unit);

        if let Some(project) = self.project_for_unit(unit) {
            let key = project.key().clone();
            self.queue.cancel(&key);
            let result = self
                .manager
                .update(|updater| updater.update_semantic_facts(&key, None));
            if let Err(err) = result {
                tracing::warn!(
                    target: "quire.propagator",
                    project = %key,
                    error = ?err,
                    "listener failed while clearing semantic facts"
                );
            }
        }
        self.graph.write().remove(unit);

        for dependent in dependents {
            if let Some(project) = self.project_for_unit(dependent) {
                Self::enqueue(self, project.key().clone());
            }
        }
    }

    fn project_for_unit(&self, unit: UnitId) -> Option<ProjectSnapshot> {
        let path = self
            .graph
            .read()
            .unit(unit)?
            .intermediate_output_path
            .clone()?;
        self.manager.find_project_by_intermediate_output_path(path)
    }

    fn document_path(&self, unit: UnitId, document: DocumentId) -> Option<PathBuf> {
        if let Some(path) = self
            .workspace
            .unit(unit)
            .and_then(|unit| unit.documents.get(&document).cloned())
        {
            return Some(path);
        }
        self.graph.read().unit(unit)?.documents.get(&document).cloned()
    }

    /// Only edits to template sources, their generated output, or a tracked component's
    /// partial-class companion can change semantic facts.
    fn is_relevant_document(&self, unit: UnitId, document: Option<DocumentId>) -> bool {
        let Some(path) = document.and_then(|document| self.document_path(unit, document)) else {
            // Cannot tell; err on the side of recomputing.
            return true;
        };

        if self.settings.is_relevant_document(&path) {
            return true;
        }
        self.is_companion_of_tracked_document(unit, &path)
    }

    fn is_companion_of_tracked_document(&self, unit: UnitId, path: &Path) -> bool {
        let text = path.to_string_lossy();
        if !text.to_ascii_lowercase().ends_with(COMPANION_SUFFIX) {
            return false;
        }
        let primary = Path::new(&text[..text.len() - COMPANION_SUFFIX.len()]);
        if primary.extension().is_none() {
            return false;
        }
        self.project_for_unit(unit)
            .is_some_and(|project| project.contains_document(primary))
    }

    fn recompute(&self, key: &ProjectKey, token: &CancellationToken) -> Result<(), Cancelled> {
        Cancelled::check(token)?;

        let Some(project) = self.manager.project(key) else {
            tracing::trace!(target: "quire.propagator", project = %key, "project gone; skipping");
            return Ok(());
        };
        let unit = self
            .graph
            .read()
            .unit_for_output_path(project.intermediate_output_path())
            .map(|unit| unit.id);
        let Some(unit) = unit else {
            tracing::trace!(
                target: "quire.propagator",
                project = %key,
                "no semantic unit backs this project; skipping"
            );
            return Ok(());
        };

        let facts = match self.workspace.semantic_facts(unit, token) {
            Ok(facts) => facts,
            Err(err) => {
                Cancelled::check(token)?;
                tracing::warn!(
                    target: "quire.propagator",
                    project = %key,
                    %unit,
                    error = ?err,
                    "failed to compute semantic facts; keeping previous facts"
                );
                return Ok(());
            }
        };
        Cancelled::check(token)?;

        tracing::debug!(
            target: "quire.propagator",
            project = %key,
            %unit,
            helpers = facts.helpers().len(),
            "updating semantic facts"
        );
        let result = self
            .manager
            .update(|updater| updater.update_semantic_facts(key, Some(facts)));
        if let Err(err) = result {
            tracing::warn!(
                target: "quire.propagator",
                project = %key,
                error = ?err,
                "listener failed after semantic facts update"
            );
        }
        Ok(())
    }

    fn unregister(&self) {
        if let Some(id) = self.listener.lock().take() {
            self.manager.unregister_listener(id);
        }
    }
}

impl Drop for PropagatorInner {
    fn drop(&mut self) {
        self.unregister();
        self.queue.shutdown();
    }
}
