//! Core shared types for quire.
//!
//! This crate holds the host-facing data model: project identity and configuration,
//! document descriptors, externally computed semantic facts, and document text. It has no
//! knowledge of snapshots or scheduling; those live in `quire-workspace` and
//! `quire-scheduler`.

mod document;
mod facts;
mod path;
mod project;
mod text;

pub use document::{FileKind, HostDocument};
pub use facts::{HelperDescriptor, HelperKind, SemanticFacts};
pub use path::normalize_path;
pub use project::{
    HostProject, LanguageVersion, LanguageVersionError, ProjectConfiguration, ProjectExtension,
    ProjectKey,
};
pub use text::{
    ContentChange, EmptyTextLoader, FileTextLoader, Position, Range, SourceText, TextError,
    TextLoadError, TextLoader, TextSource,
};
