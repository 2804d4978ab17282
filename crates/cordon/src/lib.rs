//! # Cordon
//!
//! Scope-filtered event and command dispatch for chat bots.
//!
//! ## Overview
//!
//! Every piece of behaviour is registered through a [`Context`](framework::Context):
//! a view over one app restricted to some bots, groups, users and whether
//! direct messages count. Events dispatched with a record only reach the
//! listeners whose context admits that record, and commands declared in a
//! narrowed context only run for the records it admits.
//!
//! ```text
//! ┌──────────────┐     ┌────────────────────────┐     ┌───────────────────────────┐
//! │   Session    │────▶│  middleware pipeline   │────▶│ command middleware        │
//! │ (transport)  │     │ (scope-filtered hooks) │     │ parse ▸ before-command ▸  │
//! └──────────────┘     └────────────────────────┘     │ action ▸ command event    │
//!                                                     └───────────────────────────┘
//! ```
//!
//! - **Core**: scopes, session records, transport and database seams
//! - **Framework**: contexts, dispatch, plugins, the command tree
//! - **Runtime**: configuration, logging and configured plugins
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cordon::prelude::*;
//!
//! fn ops(ctx: &Context, _: serde_json::Value) -> Result<(), BoxError> {
//!     ctx.group(&[10001])
//!         .command("deploy <target>")?
//!         .action(|inv| async move {
//!             let target = inv.args.first().cloned().unwrap_or_default();
//!             Ok(Some(format!("deploying {target}").into()))
//!         });
//!     Ok(())
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = CordonRuntime::builder()
//!         .plugin(Plugin::function("ops", ops))
//!         .build()?;
//!     runtime.handle(Session::group(1, 10001, 42, "!deploy web")).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `command`: the command tree, with clap argument parsing (default)
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use cordon_core as core;
pub use cordon_framework as framework;
pub use cordon_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use cordon::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use cordon_runtime::{CordonConfig, CordonRuntime, PluginEntry, RuntimeError};

    // App and contexts
    pub use cordon_framework::{App, AppOptions, Context};

    // Listeners and middleware
    pub use cordon_framework::{EventArgs, HookResult, Listener, Middleware, Next};

    // Plugins
    pub use cordon_framework::{Plugin, PluginApply, plugin_options};

    // Commands
    #[cfg(feature = "command")]
    pub use cordon_framework::{Argv, Command, CommandConfig, Invocation};

    // Records and scopes
    pub use cordon_core::{BoxError, Origin, Scope, ScopeSet, Session};
}

#[cfg(all(test, feature = "command"))]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::json;

    use super::prelude::*;

    #[tokio::test]
    async fn test_prelude_covers_a_plugin() {
        let app = App::new(AppOptions::default().with_prefix("!"));
        let targets = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&targets);

        let plugin = Plugin::function("ops", move |ctx: &Context, _| {
            let sink = Arc::clone(&sink);
            ctx.group(&[10001])
                .command("deploy <target>")?
                .action(move |inv: Invocation| {
                    sink.lock().extend(inv.args.first().cloned());
                    async { Ok(Some(json!("ok"))) }
                });
            Ok(())
        });
        app.plugin(&plugin, json!(null)).unwrap();

        app.handle(Session::group(1, 10001, 42, "!deploy web"))
            .await
            .unwrap();
        app.handle(Session::group(1, 10002, 42, "!deploy db"))
            .await
            .unwrap();
        assert_eq!(*targets.lock(), vec!["web".to_string()]);
    }
}
