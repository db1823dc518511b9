use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HelperKind {
    Component,
    ChildContent,
    TagHelper,
    Bind,
    EventHandler,
}

/// Metadata about one helper/type available to a project's documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HelperDescriptor {
    pub kind: HelperKind,
    pub name: String,
    pub type_name: String,
    pub assembly_name: String,
}

impl HelperDescriptor {
    pub fn new(
        kind: HelperKind,
        name: impl Into<String>,
        type_name: impl Into<String>,
        assembly_name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            type_name: type_name.into(),
            assembly_name: assembly_name.into(),
        }
    }
}

/// Semantic facts computed by the external workspace for one project.
///
/// The store never inspects these; it only caches them per project and passes them to the
/// project's engine when a helper is resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticFacts {
    helpers: Vec<HelperDescriptor>,
}

impl SemanticFacts {
    pub fn new(helpers: Vec<HelperDescriptor>) -> Self {
        Self { helpers }
    }

    pub fn helpers(&self) -> &[HelperDescriptor] {
        &self.helpers
    }

    pub fn is_empty(&self) -> bool {
        self.helpers.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&HelperDescriptor> {
        self.helpers.iter().find(|helper| helper.name == name)
    }
}
