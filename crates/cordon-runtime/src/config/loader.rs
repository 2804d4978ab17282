//! Configuration loader using figment.
//!
//! # Feature Flags
//!
//! - `toml-config`: enables `cordon.toml` and `config.toml`
//! - `yaml-config`: enables `cordon.yaml`, `cordon.yml`, `config.yaml` and `config.yml`
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Programmatic overrides passed to [`ConfigLoader::merge`]
//! 3. Profile-specific config file (`cordon.{profile}.toml`)
//! 4. Main config file (`cordon.toml`)
//! 5. Environment variables (`CORDON_*`)
//!
//! # Environment Variable Mapping
//!
//! Variables use the `CORDON_` prefix with `__` as the nesting separator:
//!
//! - `CORDON_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `CORDON_APP__SELF_ID=10000` → `app.self_id = 10000`
//! - `CORDON_PLUGINS__ECHO__ENABLED=false` → `plugins.echo.enabled = false`
//!
//! ```rust,ignore
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .file("./deploy/cordon.toml")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::CordonConfig;
use super::validation::validate_config;

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "CORDON_";

/// Variable selecting the configuration profile.
pub const PROFILE_VAR: &str = "CORDON_PROFILE";

/// Configuration profile, selecting `cordon.{profile}.*` overlays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    /// Returns the profile name as a string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name, accepting `dev` and `prod` shorthands.
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `CORDON_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var(PROFILE_VAR)
            .map(|name| Self::from_name(&name))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    figment: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader that searches the default locations and reads the
    /// environment.
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::from_name(profile.as_ref());
        self
    }

    /// Adds a search path for configuration files.
    ///
    /// Once any search path is set, the default locations are not searched.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Loads exactly this file instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges configuration programmatically, underneath files and the
    /// environment.
    pub fn merge(mut self, config: CordonConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads and validates the configuration.
    pub fn load(self) -> ConfigResult<CordonConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;

        let config: CordonConfig = figment.extract().map_err(|e| {
            ConfigError::ParseError(format!("Failed to extract configuration: {e}"))
        })?;
        validate_config(&config)?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            plugins = config.plugins.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(CordonConfig::default()));
        figment = figment.merge(std::mem::take(&mut self.figment));

        if let Some(path) = &self.config_file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = Self::merge_config_file(figment, path)?;
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            trace!(prefix = ENV_PREFIX, "Loading environment variables");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        Ok(figment)
    }

    /// Merges one file, dispatching on its extension.
    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => Err(ConfigError::ParseError(format!(
                "Unsupported or disabled configuration file format: .{ext}"
            ))),
        }
    }

    #[cfg(any(feature = "toml-config", feature = "yaml-config"))]
    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("cordon"));
        }
        paths
    }

    /// Searches `search_paths × base_names` for the first base file, merging
    /// its profile overlay first when one exists.
    #[cfg(any(feature = "toml-config", feature = "yaml-config"))]
    fn load_format_files<F>(
        &self,
        mut figment: Figment,
        search_paths: &[PathBuf],
        base_names: &[&str],
        merge_fn: F,
    ) -> (Figment, bool)
    where
        F: Fn(Figment, &Path) -> Figment,
    {
        for search_path in search_paths {
            for base_name in base_names {
                let Some((stem, ext)) = base_name.rsplit_once('.') else {
                    continue;
                };

                let profile_path = search_path.join(format!("{stem}.{}.{ext}", self.profile));
                if profile_path.exists() {
                    debug!(path = %profile_path.display(), "Loading profile-specific config");
                    figment = merge_fn(figment, &profile_path);
                }

                let base_path = search_path.join(base_name);
                if base_path.exists() {
                    info!(path = %base_path.display(), "Loading configuration file");
                    return (merge_fn(figment, &base_path), true);
                }
            }
        }
        (figment, false)
    }

    #[allow(unused_mut)]
    fn load_config_files(&self, mut figment: Figment) -> Figment {
        let mut found = false;

        #[cfg(any(feature = "toml-config", feature = "yaml-config"))]
        let search_paths = self.resolve_search_paths();

        #[cfg(feature = "toml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &["cordon.toml", "config.toml"],
                |fig, path| fig.merge(Toml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        #[cfg(feature = "yaml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &["cordon.yaml", "cordon.yml", "config.yaml", "config.yml"],
                |fig, path| fig.merge(Yaml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        if !found {
            warn!("No configuration file found, using defaults");
        }
        figment
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{LogLevel, PluginEntry};

    fn empty_dir() -> PathBuf {
        std::env::temp_dir().join(format!("cordon-missing-{}", std::process::id()))
    }

    #[test]
    fn test_defaults_without_files() {
        let config = ConfigLoader::new()
            .without_env()
            .search_path(empty_dir())
            .load()
            .unwrap();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(config.app.prefix.is_empty());
    }

    #[test]
    fn test_programmatic_merge() {
        let mut overrides = CordonConfig::default();
        overrides.app.prefix = vec!["!".into()];
        overrides.logging.level = LogLevel::Debug;
        overrides
            .plugins
            .insert("echo".into(), PluginEntry::default().disabled());

        let config = ConfigLoader::new()
            .without_env()
            .search_path(empty_dir())
            .merge(overrides)
            .load()
            .unwrap();
        assert_eq!(config.app.prefix, vec!["!".to_string()]);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(!config.plugins["echo"].enabled);
    }

    #[test]
    fn test_invalid_merge_fails_validation() {
        let mut overrides = CordonConfig::default();
        overrides.app.prefix = vec![String::new()];
        let result = ConfigLoader::new()
            .without_env()
            .search_path(empty_dir())
            .merge(overrides)
            .load();
        assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
    }

    #[test]
    fn test_missing_file() {
        let path = empty_dir().join("cordon.toml");
        let result = ConfigLoader::new().without_env().file(&path).load();
        assert!(matches!(result, Err(ConfigError::FileNotFound(p)) if p == path));
    }

    #[test]
    fn test_profile_names() {
        assert_eq!(Profile::from_name("prod"), Profile::Production);
        assert_eq!(Profile::from_name("Development"), Profile::Development);
        assert_eq!(
            Profile::from_name("staging"),
            Profile::Custom("staging".into())
        );
        assert_eq!(Profile::Production.to_string(), "production");
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_toml_file() {
        let dir = std::env::temp_dir().join(format!("cordon-toml-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("cordon.toml");
        std::fs::write(
            &path,
            r#"
[app]
prefix = ["!"]
self_id = 10000

[logging]
level = "warn"

[plugins.echo]
options = { reply = true }

[plugins.ops]
scope = { groups = { only = [10001] }, private = false }
"#,
        )
        .unwrap();

        let config = ConfigLoader::new().without_env().file(&path).load().unwrap();
        std::fs::remove_dir_all(&dir).ok();

        assert_eq!(config.app.self_id, Some(10000));
        assert_eq!(config.logging.level, LogLevel::Warn);
        assert_eq!(config.plugins["echo"].options["reply"], true);
        let scope = config.plugins["ops"].scope.as_ref().unwrap();
        assert!(scope.groups.admits(10001));
        assert!(!scope.private);
    }
}
