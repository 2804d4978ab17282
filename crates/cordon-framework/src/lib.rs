//! # Cordon Framework
//!
//! Scope-filtered event and command dispatch.
//!
//! This layer provides:
//! - [`Context`]: restricted views over one app, composed by narrowing
//! - The hook registry and the dispatch strategies (`parallel`, `emit`,
//!   `serial`, `bail`) plus the middleware pipeline
//! - Plugins, as functions or objects, applied to a context
//! - The command tree and the execution entry point (`command` feature,
//!   on by default), with arguments parsed by clap
//! - [`App`], the owner of all of the above
//!
//! ```rust,ignore
//! use cordon_framework::{App, AppOptions, Listener};
//!
//! let app = App::new(AppOptions::default().with_prefix("!"));
//! let ops = app.group(&[10001]);
//!
//! ops.command("deploy <target>")?.action(|inv| async move {
//!     let target = inv.args.first().cloned().unwrap_or_default();
//!     Ok(Some(format!("deploying {target}").into()))
//! });
//! ops.on("command", Listener::sync(|args| {
//!     tracing::info!(command = ?args.get(0), "ran");
//!     Ok(None)
//! }));
//!
//! app.handle(session).await?;
//! ```

pub mod app;
#[cfg(feature = "command")]
pub mod command;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod listener;
pub mod middleware;
pub mod plugin;
pub mod registry;

pub use app::{App, AppBuilder};
#[cfg(feature = "command")]
pub use command::{
    ActionResult, ArgKind, ArgSpec, Argv, Command, CommandConfig, CommandMap, CommandRef,
    ExecuteRequest, Invocation, ParsedArgs,
};
pub use context::{
    AFTER_MIDDLEWARE_EVENT, AppOptions, AppState, BEFORE_COMMAND_EVENT, COMMAND_EVENT, Context,
    MIDDLEWARE_EVENT, PARSE_EVENT,
};
pub use error::{
    DispatchError, DispatchResult, ExecuteError, ExecuteResult, SetupError, SetupResult,
};
pub use listener::{EventArgs, HookResult, Listener, is_truthy};
pub use middleware::{Middleware, MiddlewareResult, Next};
pub use plugin::{Plugin, PluginApply, PluginRegistry, plugin_options};
pub use registry::{ContextId, HookEntry, HookRegistry, ListenerId, Subscription};
