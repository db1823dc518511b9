use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};

use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, TestWriter};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Layered;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Either a simple level (`info`, `debug`, ...) or an `EnvFilter` directive string such as
    /// `quire.workspace=trace,info`.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json: bool,

    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Append logs to this file. If it cannot be opened, file logging is disabled and the
    /// other sinks stay active.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    /// Maps level synonyms onto `EnvFilter` syntax; anything else passes through as directives.
    pub(crate) fn level_directives(&self) -> String {
        let level = self.level.trim();
        if level.is_empty() {
            return Self::default_level();
        }
        match level.to_ascii_lowercase().as_str() {
            "warning" => "warn".to_owned(),
            simple @ ("trace" | "debug" | "info" | "warn" | "error" | "off") => simple.to_owned(),
            _ => level.to_owned(),
        }
    }

    /// The configured directives with `RUST_LOG` appended, so the environment wins on conflicts.
    /// Unparseable directives fall back to `info`.
    pub fn env_filter(&self) -> EnvFilter {
        let configured = self.level_directives();
        let from_env = std::env::var(EnvFilter::DEFAULT_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty());
        let directives = match from_env {
            Some(env) => format!("{configured},{}", env.trim()),
            None => configured,
        };
        EnvFilter::try_new(&directives)
            .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::INFO.into()))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
            file: None,
        }
    }
}

type Filtered = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<Filtered> + Send + Sync>;

fn format_layer<W>(json: bool, writer: W) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false);
    if json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

fn stderr_writer() -> BoxMakeWriter {
    // Test harness capture only sees `eprint!`.
    if cfg!(debug_assertions) {
        BoxMakeWriter::new(TestWriter::with_stderr)
    } else {
        BoxMakeWriter::new(io::stderr)
    }
}

fn open_log_file(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

static TRACING_INIT: Once = Once::new();

/// Installs the process-wide `tracing` subscriber described by `config`.
///
/// Only the first call in a process does anything; it returns `true` if the subscriber was
/// installed by that call.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let mut installed = false;
    TRACING_INIT.call_once(|| {
        let mut layers: Vec<BoxedLayer> = Vec::new();
        if config.stderr {
            layers.push(format_layer(config.json, stderr_writer()));
        }
        let file_error = match config.file.as_deref().map(open_log_file) {
            Some(Ok(file)) => {
                layers.push(format_layer(config.json, Arc::new(file)));
                None
            }
            Some(Err(err)) => Some(err),
            None => None,
        };

        let subscriber = tracing_subscriber::registry()
            .with(config.env_filter())
            .with(layers);
        installed = tracing::subscriber::set_global_default(subscriber).is_ok();

        if let (Some(err), Some(path)) = (file_error, config.file.as_deref()) {
            tracing::warn!(
                target: "quire.config",
                path = %path.display(),
                error = %err,
                "failed to open log file; file logging disabled"
            );
        }
    });
    installed
}
