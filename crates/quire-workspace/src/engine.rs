//! Derived per-project engines.
//!
//! An engine is whatever the template compiler needs that depends only on a project's
//! configuration. The store caches one per project and hands it out from
//! [`ProjectSnapshot::engine`](crate::ProjectSnapshot::engine); semantic facts are supplied per
//! query, see [`ProjectSnapshot::helper`](crate::ProjectSnapshot::helper).

use std::fmt;
use std::sync::Arc;

use quire_core::{
    FileKind, HelperDescriptor, HelperKind, LanguageVersion, ProjectConfiguration, SemanticFacts,
};

pub trait ProjectEngine: fmt::Debug + Send + Sync {
    fn configuration(&self) -> &ProjectConfiguration;

    /// Whether documents of `kind` can be compiled by this engine.
    fn supports(&self, kind: FileKind) -> bool;

    /// Looks `name` up in `facts`, hiding helpers this engine cannot bind.
    ///
    /// Facts are passed per call and never retained; an engine outlives facts updates.
    fn resolve_helper<'f>(
        &self,
        facts: &'f SemanticFacts,
        name: &str,
    ) -> Option<&'f HelperDescriptor>;
}

/// Builds engines. Must be pure: the same configuration produces equivalent engines.
pub trait ProjectEngineFactory: Send + Sync {
    fn create(&self, configuration: &ProjectConfiguration) -> Arc<dyn ProjectEngine>;
}

impl<F> ProjectEngineFactory for F
where
    F: Fn(&ProjectConfiguration) -> Arc<dyn ProjectEngine> + Send + Sync,
{
    fn create(&self, configuration: &ProjectConfiguration) -> Arc<dyn ProjectEngine> {
        self(configuration)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultProjectEngineFactory;

impl ProjectEngineFactory for DefaultProjectEngineFactory {
    fn create(&self, configuration: &ProjectConfiguration) -> Arc<dyn ProjectEngine> {
        Arc::new(DefaultProjectEngine::new(configuration.clone()))
    }
}

#[derive(Debug)]
pub struct DefaultProjectEngine {
    configuration: ProjectConfiguration,
}

impl DefaultProjectEngine {
    /// Components need language version 3.0 or newer.
    const COMPONENTS_SINCE: LanguageVersion = LanguageVersion::VERSION_3_0;

    pub fn new(configuration: ProjectConfiguration) -> Self {
        Self { configuration }
    }

    fn components_enabled(&self) -> bool {
        self.configuration.language_version >= Self::COMPONENTS_SINCE
    }
}

impl ProjectEngine for DefaultProjectEngine {
    fn configuration(&self) -> &ProjectConfiguration {
        &self.configuration
    }

    fn supports(&self, kind: FileKind) -> bool {
        match kind {
            FileKind::Markup => true,
            FileKind::Component | FileKind::ComponentImport => self.components_enabled(),
        }
    }

    fn resolve_helper<'f>(
        &self,
        facts: &'f SemanticFacts,
        name: &str,
    ) -> Option<&'f HelperDescriptor> {
        let helper = facts.find(name)?;
        match helper.kind {
            HelperKind::TagHelper => Some(helper),
            HelperKind::Component
            | HelperKind::ChildContent
            | HelperKind::Bind
            | HelperKind::EventHandler => self.components_enabled().then_some(helper),
        }
    }
}
