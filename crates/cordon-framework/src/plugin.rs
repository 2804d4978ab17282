//! Plugins: units of setup applied to a context.
//!
//! A plugin is either a bare function or an object implementing
//! [`PluginApply`]. The shape is resolved once, when the [`Plugin`] value is
//! built, so applying it never needs to inspect it again.
//!
//! ```rust,ignore
//! use cordon::prelude::*;
//!
//! let echo = Plugin::function("echo", |ctx, options| {
//!     let prefix = options["prefix"].as_str().unwrap_or("").to_string();
//!     ctx.command("echo <text...>")?.action(move |inv| {
//!         let text = format!("{prefix}{}", inv.rest);
//!         async move { Ok(Some(text.into())) }
//!     });
//!     Ok(())
//! });
//!
//! app.group(&[10001]).plugin(&echo, serde_json::json!({ "prefix": "> " }))?;
//! ```
//!
//! Options are plain JSON. Passing `false` disables the plugin.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use cordon_core::BoxError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, info_span};

use crate::context::Context;
use crate::error::{SetupError, SetupResult};

type PluginFn = dyn Fn(&Context, Value) -> Result<(), BoxError> + Send + Sync;

/// An object-shaped plugin.
pub trait PluginApply: Send + Sync {
    /// The plugin name, used for logging and configuration lookup.
    fn name(&self) -> &str;

    /// Installs the plugin's listeners, middleware and commands on `ctx`.
    fn apply(&self, ctx: &Context, options: Value) -> Result<(), BoxError>;
}

/// A plugin value.
#[derive(Clone)]
pub enum Plugin {
    /// A bare function.
    Function {
        /// Name used for logging and configuration lookup.
        name: String,
        /// The setup function.
        apply: Arc<PluginFn>,
    },
    /// An object with an `apply` method.
    Object(Arc<dyn PluginApply>),
}

impl Plugin {
    /// Wraps a setup function.
    pub fn function<F>(name: impl Into<String>, apply: F) -> Self
    where
        F: Fn(&Context, Value) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self::Function {
            name: name.into(),
            apply: Arc::new(apply),
        }
    }

    /// Wraps a plugin object.
    pub fn object(plugin: impl PluginApply + 'static) -> Self {
        Self::Object(Arc::new(plugin))
    }

    /// The plugin name.
    pub fn name(&self) -> &str {
        match self {
            Self::Function { name, .. } => name,
            Self::Object(plugin) => plugin.name(),
        }
    }

    /// Runs the plugin against `ctx`.
    pub(crate) fn apply(&self, ctx: &Context, options: Value) -> SetupResult<()> {
        let span = info_span!("plugin", name = self.name(), context = ctx.id());
        let _enter = span.enter();

        let result = match self {
            Self::Function { apply, .. } => apply(ctx, options),
            Self::Object(plugin) => plugin.apply(ctx, options),
        };

        result.map_err(|source| match source.downcast::<SetupError>() {
            Ok(setup) => *setup,
            Err(source) => SetupError::Plugin {
                name: self.name().to_string(),
                source,
            },
        })?;

        info!(scope = %ctx.scope(), "plugin applied");
        Ok(())
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Function { .. } => "Function",
            Self::Object(_) => "Object",
        };
        f.debug_struct("Plugin")
            .field("name", &self.name())
            .field("kind", &kind)
            .finish()
    }
}

impl<T: PluginApply + 'static> From<T> for Plugin {
    fn from(plugin: T) -> Self {
        Self::object(plugin)
    }
}

/// Deserializes plugin options into `T`, falling back to `T::default()` when
/// the options are `null`, `true` or malformed.
pub fn plugin_options<T: DeserializeOwned + Default>(options: &Value) -> T {
    match options {
        Value::Null | Value::Bool(true) => T::default(),
        other => serde_json::from_value(other.clone()).unwrap_or_else(|error| {
            tracing::warn!(%error, "malformed plugin options, using defaults");
            T::default()
        }),
    }
}

// =============================================================================
// PluginRegistry
// =============================================================================

/// Plugins available by name, for installation from configuration.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Plugin>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `plugin` under its own name, replacing any previous entry.
    pub fn register(&mut self, plugin: impl Into<Plugin>) -> &mut Self {
        let plugin = plugin.into();
        self.plugins.insert(plugin.name().to_string(), plugin);
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, plugin: impl Into<Plugin>) -> Self {
        self.register(plugin);
        self
    }

    /// Looks up a plugin by name.
    pub fn get(&self, name: &str) -> Option<&Plugin> {
        self.plugins.get(name)
    }

    /// Names of all registered plugins, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns `true` if no plugin is registered.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Applies the plugin named `name` to `ctx`.
    ///
    /// Fails with [`SetupError::InvalidPlugin`] if no such plugin exists.
    pub fn install(&self, ctx: &Context, name: &str, options: Value) -> SetupResult<()> {
        let plugin = self
            .get(name)
            .ok_or_else(|| SetupError::InvalidPlugin(name.to_string()))?;
        ctx.plugin(plugin, options)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::context::AppOptions;
    use crate::listener::Listener;
    use crate::App;

    struct Greeter {
        applied: Arc<AtomicUsize>,
    }

    impl PluginApply for Greeter {
        fn name(&self) -> &str {
            "greeter"
        }

        fn apply(&self, ctx: &Context, _options: Value) -> Result<(), BoxError> {
            self.applied.fetch_add(1, Ordering::SeqCst);
            ctx.on("greet", Listener::sync(|_| Ok(Some(json!("hello")))));
            Ok(())
        }
    }

    #[test]
    fn test_false_options_disable() {
        let app = App::new(AppOptions::default());
        let applied = Arc::new(AtomicUsize::new(0));
        let plugin = Plugin::object(Greeter {
            applied: Arc::clone(&applied),
        });

        app.plugin(&plugin, Value::Bool(false)).unwrap();
        assert_eq!(applied.load(Ordering::SeqCst), 0);

        app.plugin(&plugin, Value::Null).unwrap();
        assert_eq!(applied.load(Ordering::SeqCst), 1);
        assert_eq!(app.bail(None, "greet", vec![]).unwrap(), Some(json!("hello")));
    }

    #[test]
    fn test_function_plugin_errors() {
        let app = App::new(AppOptions::default());
        let failing = Plugin::function("failing", |_, _| Err("nope".into()));
        let err = app.plugin(&failing, Value::Null).unwrap_err();
        assert!(matches!(err, SetupError::Plugin { ref name, .. } if name == "failing"));
    }

    #[cfg(feature = "command")]
    #[test]
    fn test_command_errors_surface_from_plugins() {
        let app = App::new(AppOptions::default());
        let bad_command = Plugin::function("bad", |ctx, _| {
            ctx.command(".orphan")?;
            Ok(())
        });
        let err = app.plugin(&bad_command, Value::Null).unwrap_err();
        assert!(matches!(err, SetupError::InvalidSubcommand { .. }));
    }

    #[test]
    fn test_registry_install() {
        let app = App::new(AppOptions::default());
        let registry = PluginRegistry::new().with(Greeter {
            applied: Arc::new(AtomicUsize::new(0)),
        });

        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["greeter"]);
        registry.install(&app, "greeter", Value::Null).unwrap();

        let err = registry.install(&app, "missing", Value::Null).unwrap_err();
        assert!(matches!(err, SetupError::InvalidPlugin(ref name) if name == "missing"));
    }

    #[test]
    fn test_plugin_options() {
        #[derive(Debug, Default, Deserialize, PartialEq)]
        struct Options {
            prefix: String,
        }

        assert_eq!(plugin_options::<Options>(&Value::Null), Options::default());
        assert_eq!(
            plugin_options::<Options>(&json!({ "prefix": "> " })).prefix,
            "> "
        );
        assert_eq!(plugin_options::<Options>(&json!(42)), Options::default());
    }
}
