//! Configuration for quire.
//!
//! A [`QuireConfig`] is read from TOML. Every section is optional and every unknown key is an
//! error, so a typo surfaces at load time instead of silently falling back to a default.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use parking_lot::ReentrantMutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod logging;

pub use logging::{init_tracing, LoggingConfig};

pub const QUIRE_CONFIG_ENV_VAR: &str = "QUIRE_CONFIG_PATH";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuireConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceConfig {
    /// Quiet period, in milliseconds, before a project's semantic facts are recomputed.
    #[serde(default = "WorkspaceConfig::default_update_delay_ms")]
    pub update_delay_ms: u64,

    /// Suffixes of external documents whose edits can change a project's semantic facts.
    ///
    /// Matching is case-insensitive.
    #[serde(default = "WorkspaceConfig::default_relevant_document_suffixes")]
    pub relevant_document_suffixes: Vec<String>,
}

impl WorkspaceConfig {
    fn default_update_delay_ms() -> u64 {
        1_000
    }

    fn default_relevant_document_suffixes() -> Vec<String> {
        [".razor", ".cshtml", ".razor.g.cs", ".cshtml.g.cs"]
            .into_iter()
            .map(str::to_owned)
            .collect()
    }

    pub fn update_delay(&self) -> Duration {
        Duration::from_millis(self.update_delay_ms)
    }

    pub fn is_relevant_document(&self, path: &Path) -> bool {
        let path = path.to_string_lossy().to_ascii_lowercase();
        self.relevant_document_suffixes
            .iter()
            .any(|suffix| path.ends_with(&suffix.to_ascii_lowercase()))
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            update_delay_ms: Self::default_update_delay_ms(),
            relevant_document_suffixes: Self::default_relevant_document_suffixes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerSettings {
    /// Threads recomputation runs on. Defaults to the available parallelism, capped at two.
    #[serde(default)]
    pub worker_threads: Option<usize>,
    #[serde(default = "SchedulerSettings::default_timer_threads")]
    pub timer_threads: usize,
}

impl SchedulerSettings {
    fn default_timer_threads() -> usize {
        1
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            worker_threads: None,
            timer_threads: Self::default_timer_threads(),
        }
    }
}

impl From<&SchedulerSettings> for quire_scheduler::SchedulerConfig {
    fn from(settings: &SchedulerSettings) -> Self {
        let defaults = quire_scheduler::SchedulerConfig::default();
        Self {
            worker_threads: settings
                .worker_threads
                .unwrap_or(defaults.worker_threads)
                .max(1),
            timer_threads: settings.timer_threads.max(1),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The `Display` impl embeds a source snippet; keep only the message and location.
        let message = match err.span() {
            Some(span) => format!("{} (at byte {})", err.message(), span.start),
            None => err.message().to_owned(),
        };
        ConfigError::Toml(message)
    }
}

impl QuireConfig {
    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::load_from_str(&text)?;
        tracing::debug!(target: "quire.config", path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Loads the file named by `QUIRE_CONFIG_PATH`, or the defaults when the variable is unset.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        match config_path_from_env() {
            Some(path) => Self::load_from_path(path),
            None => Ok(Self::default()),
        }
    }

    pub fn scheduler_config(&self) -> quire_scheduler::SchedulerConfig {
        (&self.scheduler).into()
    }
}

static CONFIG_ENV_LOCK: OnceLock<ReentrantMutex<()>> = OnceLock::new();

fn config_env_lock() -> &'static ReentrantMutex<()> {
    CONFIG_ENV_LOCK.get_or_init(|| ReentrantMutex::new(()))
}

/// Run `f` while holding the config environment lock.
///
/// Tests that temporarily set [`QUIRE_CONFIG_ENV_VAR`] must go through this so concurrent
/// readers never observe the override.
pub fn with_config_env_lock<R>(f: impl FnOnce() -> R) -> R {
    let _guard = config_env_lock().lock();
    f()
}

fn config_path_from_env() -> Option<PathBuf> {
    let _guard = config_env_lock().lock();
    std::env::var_os(QUIRE_CONFIG_ENV_VAR)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
