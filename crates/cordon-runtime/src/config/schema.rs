//! Configuration schema definitions.
//!
//! ```toml
//! [app]
//! prefix = ["!", "/"]
//! self_id = 10000
//!
//! [logging]
//! level = "debug"
//! output = "both"
//! file_path = "logs"
//!
//! [logging.filters]
//! cordon_framework = "trace"
//!
//! [plugins.echo]
//! options = { reply = true }
//!
//! [plugins.ops]
//! scope = { groups = { only = [10001] }, private = false }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use cordon_core::Scope;
use cordon_framework::AppOptions;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CordonConfig {
    /// Application options.
    pub app: AppConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Plugins to install, keyed by registered plugin name.
    pub plugins: BTreeMap<String, PluginEntry>,
}

// =============================================================================
// App
// =============================================================================

/// Options forwarded to the app.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Command prefixes. Empty means every message is tried as a command.
    pub prefix: Vec<String>,

    /// Restricts the root context to this bot account.
    pub self_id: Option<i64>,
}

impl AppConfig {
    /// Converts to the options the app is built with.
    pub fn to_options(&self) -> AppOptions {
        AppOptions {
            prefix: self.prefix.clone(),
            self_id: self.self_id,
        }
    }
}

// =============================================================================
// Plugins
// =============================================================================

/// One configured plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginEntry {
    /// Set to `false` to keep the plugin registered but not installed.
    pub enabled: bool,

    /// Restricts the context the plugin is applied to.
    pub scope: Option<Scope>,

    /// Passed to the plugin verbatim.
    pub options: Value,
}

impl Default for PluginEntry {
    fn default() -> Self {
        Self {
            enabled: true,
            scope: None,
            options: Value::Null,
        }
    }
}

impl PluginEntry {
    /// An enabled entry with the given options.
    pub fn with_options(options: Value) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Sets the scope restriction.
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Disables the entry.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level for every target.
    pub level: LogLevel,

    /// Output format.
    pub format: LogFormat,

    /// Where log lines go.
    pub output: LogOutput,

    /// Directory for log files. Required when `output` writes to a file.
    pub file_path: Option<PathBuf>,

    /// File name inside `file_path`.
    pub file_name: Option<String>,

    /// How often the log file is rotated.
    pub rotation: LogRotation,

    /// Rotated files to keep. `None` keeps all of them.
    pub max_files: Option<usize>,

    /// Include thread ids.
    pub thread_ids: bool,

    /// Include file and line of the call site.
    pub file_location: bool,

    /// Per-target level overrides.
    pub filters: BTreeMap<String, LogLevel>,

    /// Span lifecycle events to log.
    pub span_events: SpanEventConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            output: LogOutput::Stdout,
            file_path: None,
            file_name: None,
            rotation: LogRotation::Never,
            max_files: None,
            thread_ids: false,
            file_location: false,
            filters: BTreeMap::new(),
            span_events: SpanEventConfig::default(),
        }
    }
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// The directive spelling understood by `EnvFilter`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a tracing level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human readable.
    #[default]
    Pretty,
    /// Single line per event.
    Compact,
    /// The `tracing-subscriber` default.
    Full,
    /// Newline-delimited JSON. Needs the `json-log` feature.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
    /// Stdout and a file.
    Both,
}

impl LogOutput {
    /// Returns `true` if this output needs a log directory.
    pub fn writes_file(self) -> bool {
        matches!(self, Self::File | Self::Both)
    }
}

/// Log file rotation period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Minutely,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanEventConfig {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}
