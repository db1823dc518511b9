use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::path::normalize_path;

/// Stable identity of a tracked project.
///
/// A key is chosen by the host when the project is added and never changes while the project is
/// tracked, even if the project file is renamed or its configuration changes.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ProjectKey(Arc<str>);

impl ProjectKey {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Derives a key from a project's intermediate output directory.
    ///
    /// Hosts that have no native project identity use the output directory, since two live
    /// projects never share one. Separators are normalized to `/` and trailing separators are
    /// dropped so `obj/Debug/` and `obj\Debug` produce the same key.
    pub fn from_intermediate_output_path(path: impl AsRef<Path>) -> Self {
        let normalized = normalize_path(path.as_ref());
        let mut id = normalized.to_string_lossy().replace('\\', "/");
        while id.len() > 1 && id.ends_with('/') {
            id.pop();
        }
        Self(Arc::from(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProjectKey").field(&&*self.0).finish()
    }
}

impl fmt::Display for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ProjectKey {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl From<ProjectKey> for String {
    fn from(value: ProjectKey) -> Self {
        value.0.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid language version `{0}` (expected `major.minor`, `latest` or `experimental`)")]
pub struct LanguageVersionError(String);

/// Version of the template language a project compiles against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguageVersion {
    major: u16,
    minor: u16,
}

impl LanguageVersion {
    pub const VERSION_1_0: Self = Self::new(1, 0);
    pub const VERSION_2_0: Self = Self::new(2, 0);
    pub const VERSION_3_0: Self = Self::new(3, 0);
    pub const VERSION_5_0: Self = Self::new(5, 0);
    pub const VERSION_6_0: Self = Self::new(6, 0);
    pub const VERSION_7_0: Self = Self::new(7, 0);
    pub const VERSION_8_0: Self = Self::new(8, 0);
    pub const LATEST: Self = Self::VERSION_8_0;
    pub const EXPERIMENTAL: Self = Self::new(1337, 1337);

    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    pub fn major(self) -> u16 {
        self.major
    }

    pub fn minor(self) -> u16 {
        self.minor
    }
}

impl Default for LanguageVersion {
    fn default() -> Self {
        Self::LATEST
    }
}

impl fmt::Display for LanguageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::EXPERIMENTAL {
            return f.write_str("experimental");
        }
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for LanguageVersion {
    type Err = LanguageVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "latest" => return Ok(Self::LATEST),
            "experimental" => return Ok(Self::EXPERIMENTAL),
            _ => {}
        }

        let (major, minor) = trimmed.split_once('.').unwrap_or((trimmed, "0"));
        let major = major
            .parse::<u16>()
            .map_err(|_| LanguageVersionError(s.to_owned()))?;
        let minor = minor
            .parse::<u16>()
            .map_err(|_| LanguageVersionError(s.to_owned()))?;
        Ok(Self::new(major, minor))
    }
}

impl TryFrom<String> for LanguageVersion {
    type Error = LanguageVersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LanguageVersion> for String {
    fn from(value: LanguageVersion) -> Self {
        value.to_string()
    }
}

/// A named language extension enabled for a project (e.g. an MVC helper pack).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectExtension {
    name: String,
}

impl ProjectExtension {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Compiler-facing configuration of a project.
///
/// Any change here invalidates the project's derived engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfiguration {
    #[serde(default)]
    pub language_version: LanguageVersion,
    #[serde(default = "ProjectConfiguration::default_name")]
    pub configuration_name: String,
    /// Ordered list of enabled extensions.
    #[serde(default)]
    pub extensions: Vec<ProjectExtension>,
}

impl ProjectConfiguration {
    pub fn new(
        language_version: LanguageVersion,
        configuration_name: impl Into<String>,
        extensions: Vec<ProjectExtension>,
    ) -> Self {
        Self {
            language_version,
            configuration_name: configuration_name.into(),
            extensions,
        }
    }

    fn default_name() -> String {
        "Default".to_owned()
    }
}

impl Default for ProjectConfiguration {
    fn default() -> Self {
        Self {
            language_version: LanguageVersion::default(),
            configuration_name: Self::default_name(),
            extensions: Vec::new(),
        }
    }
}

/// A project as described by the host when it is added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostProject {
    pub key: ProjectKey,
    pub file_path: PathBuf,
    pub intermediate_output_path: PathBuf,
    pub configuration: ProjectConfiguration,
    pub root_namespace: Option<String>,
}

impl HostProject {
    pub fn new(
        key: ProjectKey,
        file_path: impl AsRef<Path>,
        intermediate_output_path: impl AsRef<Path>,
        configuration: ProjectConfiguration,
        root_namespace: Option<String>,
    ) -> Self {
        Self {
            key,
            file_path: normalize_path(file_path.as_ref()),
            intermediate_output_path: normalize_path(intermediate_output_path.as_ref()),
            configuration,
            root_namespace,
        }
    }

    /// Builds a host project keyed by its intermediate output directory.
    pub fn from_paths(
        file_path: impl AsRef<Path>,
        intermediate_output_path: impl AsRef<Path>,
        configuration: ProjectConfiguration,
        root_namespace: Option<String>,
    ) -> Self {
        let key = ProjectKey::from_intermediate_output_path(intermediate_output_path.as_ref());
        Self::new(
            key,
            file_path,
            intermediate_output_path,
            configuration,
            root_namespace,
        )
    }

    /// Human readable name, taken from the project file stem.
    pub fn display_name(&self) -> String {
        self.file_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.key.to_string())
    }
}
