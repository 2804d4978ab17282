//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{AppConfig, CordonConfig, LoggingConfig, PluginEntry};

/// Validates the entire configuration.
pub fn validate_config(config: &CordonConfig) -> ConfigResult<()> {
    validate_app_config(&config.app)?;
    validate_logging_config(&config.logging)?;
    for (name, entry) in &config.plugins {
        validate_plugin_entry(name, entry)?;
    }
    Ok(())
}

fn validate_app_config(app: &AppConfig) -> ConfigResult<()> {
    if app.prefix.iter().any(|prefix| prefix.trim().is_empty()) {
        return Err(ConfigError::validation(
            "Command prefixes must be non-empty strings",
        ));
    }
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output.writes_file() && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if logging.max_files == Some(0) {
        return Err(ConfigError::validation(
            "logging.max_files must be greater than 0",
        ));
    }

    if let Some(name) = &logging.file_name
        && name.trim().is_empty()
    {
        return Err(ConfigError::validation("logging.file_name must not be empty"));
    }

    if logging.filters.keys().any(|target| target.trim().is_empty()) {
        return Err(ConfigError::validation("Log filter targets must not be empty"));
    }

    Ok(())
}

fn validate_plugin_entry(name: &str, entry: &PluginEntry) -> ConfigResult<()> {
    if name.trim().is_empty() {
        return Err(ConfigError::validation("Plugin names must not be empty"));
    }

    if let Some(scope) = &entry.scope
        && scope.admits_nothing()
    {
        return Err(ConfigError::validation(format!(
            "Scope of plugin '{name}' admits nothing"
        )));
    }

    Ok(())
}
