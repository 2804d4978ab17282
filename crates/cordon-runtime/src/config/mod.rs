//! Configuration for the Cordon runtime.
//!
//! Configuration is layered with figment: built-in defaults, then files,
//! then `CORDON_*` environment variables, then programmatic overrides.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile};
pub use schema::{
    AppConfig, CordonConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig,
    PluginEntry, SpanEventConfig,
};
pub use validation::validate_config;
