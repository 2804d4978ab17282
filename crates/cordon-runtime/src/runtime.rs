//! Runtime assembly: configuration, logging, the app and its plugins.
//!
//! ```rust,ignore
//! use cordon_runtime::CordonRuntime;
//!
//! let runtime = CordonRuntime::builder()
//!     .config_file("cordon.toml")
//!     .transport(transport)
//!     .plugin(Plugin::function("echo", echo))
//!     .build()?;
//!
//! runtime.handle(session).await?;
//! ```

use std::sync::Arc;

use cordon_core::{BoxedDatabase, BoxedTransport, Session};
use cordon_framework::{App, AppBuilder, Context, Plugin, PluginRegistry};
use tracing::{debug, info, info_span};

use crate::config::{ConfigLoader, CordonConfig, PluginEntry};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// A configured app: logging installed, options applied and plugins
/// resolved by name from configuration.
pub struct CordonRuntime {
    config: CordonConfig,
    app: App,
    plugins: PluginRegistry,
}

impl CordonRuntime {
    /// Creates a runtime from configuration found in the default locations.
    ///
    /// Falls back to defaults when no valid configuration can be loaded.
    pub fn new() -> Self {
        let config = ConfigLoader::new().load().unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load config ({e}), using defaults");
            CordonConfig::default()
        });
        Self::from_config(&config)
    }

    /// Creates a runtime builder for custom configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from pre-loaded configuration, without
    /// collaborators.
    ///
    /// Plugins are not installed until [`install_plugins`](Self::install_plugins)
    /// is called.
    pub fn from_config(config: &CordonConfig) -> Self {
        Self::assemble(config.clone(), App::builder(), PluginRegistry::new())
    }

    fn assemble(config: CordonConfig, app: AppBuilder, plugins: PluginRegistry) -> Self {
        logging::init_from_config(&config.logging);

        let app = app.options(config.app.to_options()).build();

        info!(
            log_level = %config.logging.level,
            log_format = ?config.logging.format,
            plugins = config.plugins.len(),
            "Runtime initialized from configuration"
        );

        Self {
            config,
            app,
            plugins,
        }
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &CordonConfig {
        &self.config
    }

    /// The app, for dispatching events and declaring commands directly.
    pub fn app(&self) -> &App {
        &self.app
    }

    /// The root context of the app.
    pub fn context(&self) -> &Context {
        self.app.context()
    }

    /// Plugins available for installation by name.
    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Makes `plugin` available to configuration under its name.
    pub fn register_plugin(&mut self, plugin: impl Into<Plugin>) -> &mut Self {
        self.plugins.register(plugin);
        self
    }

    /// Installs every enabled plugin in the configuration, in name order.
    ///
    /// Returns the number of plugins installed. Stops at the first failure;
    /// plugins installed before it stay installed.
    pub fn install_plugins(&self) -> RuntimeResult<usize> {
        let mut installed = 0;
        for (name, entry) in &self.config.plugins {
            if self.install(name, entry)? {
                installed += 1;
            }
        }
        info!(installed, "Configured plugins installed");
        Ok(installed)
    }

    /// Installs the plugin registered as `name` with the given entry.
    ///
    /// Returns `false` for a disabled entry.
    pub fn install(&self, name: &str, entry: &PluginEntry) -> RuntimeResult<bool> {
        let _span = info_span!("configured_plugin", plugin = name).entered();
        if !entry.enabled {
            debug!("Plugin disabled in configuration");
            return Ok(false);
        }

        let ctx = match &entry.scope {
            Some(scope) => self
                .app
                .restrict(scope)
                .ok_or_else(|| RuntimeError::PluginScope {
                    name: name.to_string(),
                })?,
            None => self.app.context().clone(),
        };
        self.plugins.install(&ctx, name, entry.options.clone())?;
        Ok(true)
    }

    /// Runs one session through the app's middleware pipeline.
    pub async fn handle(&self, session: impl Into<Arc<Session>>) -> RuntimeResult<()> {
        self.app.handle(session).await?;
        Ok(())
    }
}

impl Default for CordonRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CordonRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CordonRuntime")
            .field("config", &self.config)
            .field("app", &self.app)
            .field("plugins", &self.plugins.names().collect::<Vec<_>>())
            .finish()
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`CordonRuntime`].
///
/// [`build`](Self::build) loads configuration, builds the app with the given
/// collaborators and installs the configured plugins.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    app: AppBuilder,
    plugins: PluginRegistry,
}

impl RuntimeBuilder {
    /// Creates a builder with the default configuration search and no
    /// collaborators or plugins.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            app: App::builder(),
            plugins: PluginRegistry::new(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Enables loading environment variables (enabled by default).
    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: CordonConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Sets the transport the app classifies records and replies through.
    pub fn transport(mut self, transport: BoxedTransport) -> Self {
        self.app = self.app.transport(transport);
        self
    }

    /// Sets the persistence backend that command execution attaches state
    /// from.
    pub fn database(mut self, database: BoxedDatabase) -> Self {
        self.app = self.app.database(database);
        self
    }

    /// Registers a plugin that configuration can refer to by name.
    pub fn plugin(mut self, plugin: impl Into<Plugin>) -> Self {
        self.plugins.register(plugin);
        self
    }

    /// Builds the runtime and installs the configured plugins.
    pub fn build(self) -> RuntimeResult<CordonRuntime> {
        let config = self.config_loader.load()?;
        let runtime = CordonRuntime::assemble(config, self.app, self.plugins);
        runtime.install_plugins()?;
        Ok(runtime)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
