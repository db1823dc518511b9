use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use quire_core::{
    HostDocument, HostProject, ProjectConfiguration, ProjectKey, SourceText, TextLoadError,
    TextLoader, TextSource,
};
use quire_workspace::{
    ListenerId, ListenerTier, ProjectChangeEvent, ProjectChangeKind, ProjectSnapshotManager,
};

pub fn project_key(name: &str) -> ProjectKey {
    ProjectKey::new(name)
}

/// A project named `name` rooted at `/repo/{name}`.
pub fn host_project(name: &str) -> HostProject {
    HostProject::new(
        project_key(name),
        format!("/repo/{name}/{name}.csproj"),
        format!("/repo/{name}/obj"),
        ProjectConfiguration::default(),
        Some(name.to_owned()),
    )
}

pub fn document_path(project: &str, relative: &str) -> PathBuf {
    PathBuf::from(format!("/repo/{project}/{relative}"))
}

pub fn host_document(project: &str, relative: &str) -> HostDocument {
    HostDocument::new(document_path(project, relative), relative)
}

pub fn manager_with_projects(names: &[&str]) -> ProjectSnapshotManager {
    let manager = ProjectSnapshotManager::default();
    manager
        .update(|updater| {
            for name in names {
                updater.add_project(host_project(name));
            }
        })
        .unwrap();
    manager
}

/// Loader that counts how often it runs.
#[derive(Debug, Clone, Default)]
pub struct CountingLoader {
    text: String,
    calls: Arc<AtomicUsize>,
}

impl CountingLoader {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_owned(),
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn source(&self) -> TextSource {
        TextSource::loader(self.clone())
    }
}

impl TextLoader for CountingLoader {
    fn load(&self) -> Result<SourceText, TextLoadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SourceText::new(self.text.clone()))
    }
}

/// Records every event a listener sees, with the tier it was delivered on.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<(ListenerTier, ProjectChangeEvent)>>>,
}

impl Recorder {
    pub fn attach(&self, manager: &ProjectSnapshotManager, tier: ListenerTier) -> ListenerId {
        let events = Arc::clone(&self.events);
        manager.register_listener(tier, move |_, event| {
            events.lock().push((tier, event.clone()));
            Ok(())
        })
    }

    pub fn events(&self) -> Vec<ProjectChangeEvent> {
        self.events
            .lock()
            .iter()
            .map(|(_, event)| event.clone())
            .collect()
    }

    pub fn kinds(&self) -> Vec<ProjectChangeKind> {
        self.events.lock().iter().map(|(_, event)| event.kind).collect()
    }

    pub fn entries(&self) -> Vec<(ListenerTier, ProjectChangeKind, Option<PathBuf>)> {
        self.events
            .lock()
            .iter()
            .map(|(tier, event)| (*tier, event.kind, event.document_file_path.clone()))
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}
