//! Two-tier listener registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::event::ProjectChangeEvent;
use crate::manager::ProjectSnapshotManager;

/// Listeners of a tier see every event of a batch before listeners of the next tier see any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerTier {
    /// Cache maintenance that must run before anything user-facing observes an event.
    Priority,
    Normal,
}

impl ListenerTier {
    pub(crate) const DISPATCH_ORDER: [ListenerTier; 2] =
        [ListenerTier::Priority, ListenerTier::Normal];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Receives change events after a batch commits.
///
/// A listener may call [`ProjectSnapshotManager::update`] from `on_change`; the nested batch
/// commits immediately and its events are delivered before the next event of the current
/// batch. Returning an error aborts the rest of the dispatch, so expected conditions should be
/// handled rather than reported.
pub trait ProjectChangeListener: Send + Sync {
    fn on_change(
        &self,
        manager: &ProjectSnapshotManager,
        event: &ProjectChangeEvent,
    ) -> anyhow::Result<()>;
}

impl<F> ProjectChangeListener for F
where
    F: Fn(&ProjectSnapshotManager, &ProjectChangeEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn on_change(
        &self,
        manager: &ProjectSnapshotManager,
        event: &ProjectChangeEvent,
    ) -> anyhow::Result<()> {
        self(manager, event)
    }
}

struct Registration {
    id: ListenerId,
    tier: ListenerTier,
    listener: Arc<dyn ProjectChangeListener>,
}

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: AtomicU64,
    registrations: RwLock<Vec<Registration>>,
}

impl Listeners {
    pub(crate) fn register(
        &self,
        tier: ListenerTier,
        listener: Arc<dyn ProjectChangeListener>,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.registrations.write().push(Registration { id, tier, listener });
        id
    }

    pub(crate) fn unregister(&self, id: ListenerId) -> bool {
        let mut registrations = self.registrations.write();
        let before = registrations.len();
        registrations.retain(|registration| registration.id != id);
        registrations.len() != before
    }

    /// Listeners of `tier` in registration order. Taken per event, so (un)registration takes
    /// effect from the next delivered event.
    pub(crate) fn tier(&self, tier: ListenerTier) -> Vec<Arc<dyn ProjectChangeListener>> {
        self.registrations
            .read()
            .iter()
            .filter(|registration| registration.tier == tier)
            .map(|registration| Arc::clone(&registration.listener))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.registrations.read().len()
    }
}
