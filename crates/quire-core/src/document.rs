use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::path::normalize_path;

const COMPONENT_EXTENSION: &str = "razor";
const COMPONENT_IMPORT_FILE_NAME: &str = "_Imports.razor";

/// How a document participates in code generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// Plain markup page or view.
    Markup,
    /// A component definition.
    Component,
    /// A component import file, applied to every component in its directory and below.
    ComponentImport,
}

impl FileKind {
    /// Infers the kind from the file name.
    pub fn from_path(path: &Path) -> Self {
        let is_import = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.eq_ignore_ascii_case(COMPONENT_IMPORT_FILE_NAME));
        if is_import {
            return FileKind::ComponentImport;
        }

        let is_component = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(COMPONENT_EXTENSION));
        if is_component {
            FileKind::Component
        } else {
            FileKind::Markup
        }
    }

    pub fn is_component(self) -> bool {
        matches!(self, FileKind::Component | FileKind::ComponentImport)
    }
}

/// A document as described by the host when it is added to a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostDocument {
    /// Path of the source file. Unique within a project.
    pub file_path: PathBuf,
    /// Path the generated output is attributed to.
    pub target_path: PathBuf,
    pub file_kind: FileKind,
}

impl HostDocument {
    pub fn new(file_path: impl AsRef<Path>, target_path: impl AsRef<Path>) -> Self {
        let file_path = normalize_path(file_path.as_ref());
        let file_kind = FileKind::from_path(&file_path);
        Self {
            file_path,
            target_path: normalize_path(target_path.as_ref()),
            file_kind,
        }
    }

    /// Overrides the inferred kind, for hosts that carry explicit item metadata.
    pub fn with_file_kind(mut self, file_kind: FileKind) -> Self {
        self.file_kind = file_kind;
        self
    }
}
