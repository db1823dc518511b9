//! Immutable per-project and per-document state.
//!
//! Every mutation builds a new [`ProjectState`] value; unchanged documents, facts and the engine
//! cell are shared with the previous value through `Arc`s.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use quire_core::{HostDocument, HostProject, SemanticFacts, SourceText, TextLoadError, TextSource};

use crate::engine::{ProjectEngine, ProjectEngineFactory};

#[derive(Clone)]
pub(crate) struct ProjectState {
    pub(crate) host_project: HostProject,
    pub(crate) documents: BTreeMap<PathBuf, Arc<DocumentState>>,
    pub(crate) semantic_facts: Option<Arc<SemanticFacts>>,
    pub(crate) engine: Arc<EngineCell>,
    pub(crate) version: u64,
}

impl ProjectState {
    pub(crate) fn new(host_project: HostProject, factory: &Arc<dyn ProjectEngineFactory>) -> Self {
        Self {
            host_project,
            documents: BTreeMap::new(),
            semantic_facts: None,
            engine: Arc::new(EngineCell::new(Arc::clone(factory))),
            version: 1,
        }
    }

    pub(crate) fn engine(&self) -> Arc<dyn ProjectEngine> {
        self.engine.get_or_build(&self.host_project)
    }
}

/// Lazily built derived engine. A project keeps the same cell (and so the same engine) until its
/// configuration changes.
pub(crate) struct EngineCell {
    factory: Arc<dyn ProjectEngineFactory>,
    engine: OnceLock<Arc<dyn ProjectEngine>>,
}

impl EngineCell {
    pub(crate) fn new(factory: Arc<dyn ProjectEngineFactory>) -> Self {
        Self {
            factory,
            engine: OnceLock::new(),
        }
    }

    pub(crate) fn fresh(&self) -> Self {
        Self::new(Arc::clone(&self.factory))
    }

    fn get_or_build(&self, project: &HostProject) -> Arc<dyn ProjectEngine> {
        let engine = self.engine.get_or_init(|| {
            tracing::debug!(
                target: "quire.workspace",
                project = %project.key,
                configuration = %project.configuration.configuration_name,
                "building project engine"
            );
            self.factory.create(&project.configuration)
        });
        Arc::clone(engine)
    }

    pub(crate) fn is_built(&self) -> bool {
        self.engine.get().is_some()
    }
}

pub(crate) struct DocumentState {
    pub(crate) host_document: HostDocument,
    pub(crate) text: Arc<DocumentText>,
    pub(crate) version: u64,
    pub(crate) is_open: bool,
}

impl DocumentState {
    pub(crate) fn new(host_document: HostDocument, source: TextSource) -> Self {
        Self {
            host_document,
            text: Arc::new(DocumentText::new(source)),
            version: 1,
            is_open: false,
        }
    }

    /// Same document with a new text state and the next version.
    pub(crate) fn with_text(&self, source: TextSource, is_open: bool) -> Self {
        Self {
            host_document: self.host_document.clone(),
            text: Arc::new(DocumentText::new(source)),
            version: self.version + 1,
            is_open,
        }
    }
}

/// A text source plus the memoized result of loading it.
pub(crate) struct DocumentText {
    source: TextSource,
    loaded: Mutex<Option<SourceText>>,
}

impl DocumentText {
    fn new(source: TextSource) -> Self {
        Self {
            source,
            loaded: Mutex::new(None),
        }
    }

    pub(crate) fn source(&self) -> &TextSource {
        &self.source
    }

    /// Runs the loader at most once per successful load. Failed loads are not cached.
    pub(crate) fn load(&self) -> Result<SourceText, TextLoadError> {
        let loader = match &self.source {
            TextSource::Buffer(text) => return Ok(text.clone()),
            TextSource::Loader(loader) => loader,
        };

        let mut loaded = self.loaded.lock();
        if let Some(text) = loaded.as_ref() {
            return Ok(text.clone());
        }
        let text = loader.load()?;
        *loaded = Some(text.clone());
        Ok(text)
    }

    pub(crate) fn is_loaded(&self) -> bool {
        match &self.source {
            TextSource::Buffer(_) => true,
            TextSource::Loader(_) => self.loaded.lock().is_some(),
        }
    }
}

impl fmt::Debug for DocumentText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentText")
            .field("source", &self.source)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
