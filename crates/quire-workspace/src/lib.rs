//! Versioned project/document store for quire.
//!
//! [`ProjectSnapshotManager`] holds the authoritative, immutable model of every tracked project
//! and document. Mutations run as transactional [`update`](ProjectSnapshotManager::update)
//! batches whose change events are delivered to two tiers of listeners, with listener-issued
//! updates dispatched depth-first. [`ChangePropagator`] keeps each project's semantic facts in
//! step with the external [`SemanticWorkspace`], coalescing recomputation per project.

mod dispatch;
mod engine;
mod event;
mod graph;
mod manager;
mod propagator;
mod semantic;
mod snapshot;
mod state;

pub use dispatch::{ListenerId, ListenerTier, ProjectChangeListener};
pub use engine::{
    DefaultProjectEngine, DefaultProjectEngineFactory, ProjectEngine, ProjectEngineFactory,
};
pub use event::{ProjectChangeEvent, ProjectChangeKind};
pub use graph::DependencyGraph;
pub use manager::{ProjectSnapshotManager, UpdateError, Updater};
pub use propagator::ChangePropagator;
pub use semantic::{
    DocumentId, SemanticUnit, SemanticWorkspace, UnitId, WorkspaceChange, WorkspaceChangeKind,
};
pub use snapshot::{DocumentSnapshot, ProjectSnapshot};
