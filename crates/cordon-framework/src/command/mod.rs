//! The command tree.
//!
//! Commands are declared through [`Context::command`](crate::Context::command)
//! with a path and an optional argument declaration:
//!
//! ```rust,ignore
//! let roll = app.command("dice.roll <sides> [count]")?;
//! roll.action(|inv| async move {
//!     let sides: u32 = inv.args.first().and_then(|s| s.parse().ok()).unwrap_or(6);
//!     Ok(Some(serde_json::json!(sides)))
//! });
//! ```
//!
//! Paths are split before every `.` or `/`:
//!
//! - `.x` continues the parent's name (`dice.roll` is a child of `dice`);
//! - `/x` declares `x` as a child of the previous segment;
//! - a plain segment names a top-level node.
//!
//! Every node carries the scope of the context that created it, and a child's
//! scope is always contained in its parent's. The declaration after the path
//! is described in [`args`]; arguments are parsed with clap when a command is
//! resolved.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

use cordon_core::{BoxError, Scope, Session};
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::context::Context;
use crate::error::{ExecuteError, ExecuteResult, SetupResult};

pub mod args;
pub mod execute;
mod parser;
pub mod split;
mod tree;

pub use args::{ArgKind, ArgSpec, ParsedArgs};
pub use execute::{Argv, CommandRef, ExecuteRequest, Invocation};
pub use split::shell_split;

pub(crate) use parser::{command_middleware, command_parser};

/// What a command action produces.
pub type ActionResult = Result<Option<Value>, BoxError>;

type ActionFn = dyn Fn(Invocation) -> BoxFuture<'static, ActionResult> + Send + Sync;

// =============================================================================
// CommandConfig
// =============================================================================

/// Per-command settings. Unset fields leave the current value alone when
/// merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// One-line description shown in help listings.
    pub description: Option<String>,
    /// Usage text overriding the one derived from the declaration.
    pub usage: Option<String>,
    /// Hides the command from help listings.
    pub hidden: Option<bool>,
    /// Parses the command even without a prefix.
    pub allow_unprefixed: Option<bool>,
}

impl CommandConfig {
    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the usage text.
    pub fn with_usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    /// Hides the command.
    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = Some(hidden);
        self
    }

    /// Allows the command to be invoked without a prefix.
    pub fn with_allow_unprefixed(mut self, allow: bool) -> Self {
        self.allow_unprefixed = Some(allow);
        self
    }

    /// Overwrites every field that is set in `other`.
    pub fn merge(&mut self, other: CommandConfig) {
        if other.description.is_some() {
            self.description = other.description;
        }
        if other.usage.is_some() {
            self.usage = other.usage;
        }
        if other.hidden.is_some() {
            self.hidden = other.hidden;
        }
        if other.allow_unprefixed.is_some() {
            self.allow_unprefixed = other.allow_unprefixed;
        }
    }
}

// =============================================================================
// Command
// =============================================================================

/// The action attached to a command.
#[derive(Clone)]
pub struct CommandAction(Arc<ActionFn>);

impl CommandAction {
    /// Wraps an async closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        Self(Arc::new(move |invocation| f(invocation).boxed()))
    }

    fn call(&self, invocation: Invocation) -> BoxFuture<'static, ActionResult> {
        (self.0)(invocation)
    }
}

impl fmt::Debug for CommandAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandAction").finish_non_exhaustive()
    }
}

/// A node of the command tree.
pub struct Command {
    name: String,
    declaration: RwLock<String>,
    arguments: RwLock<Vec<ArgSpec>>,
    scope: Arc<Scope>,
    parent: RwLock<Option<Weak<Command>>>,
    children: RwLock<Vec<Arc<Command>>>,
    config: RwLock<CommandConfig>,
    action: RwLock<Option<CommandAction>>,
}

impl Command {
    pub(crate) fn new(name: String, scope: Scope) -> Self {
        Self {
            name,
            declaration: RwLock::new(String::new()),
            arguments: RwLock::new(Vec::new()),
            scope: Arc::new(scope),
            parent: RwLock::new(None),
            children: RwLock::new(Vec::new()),
            config: RwLock::new(CommandConfig::default()),
            action: RwLock::new(None),
        }
    }

    /// The full, lowercased command name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The argument declaration, e.g. `"<target> [count]"`.
    pub fn declaration(&self) -> String {
        self.declaration.read().clone()
    }

    /// The declared arguments.
    pub fn arguments(&self) -> Vec<ArgSpec> {
        self.arguments.read().clone()
    }

    /// The clap command parsing this node's arguments.
    ///
    /// Argument tokens are given without the command name.
    pub fn clap_command(&self) -> clap::Command {
        self.build_clap(&self.arguments.read())
    }

    fn build_clap(&self, arguments: &[ArgSpec]) -> clap::Command {
        let command = clap::Command::new(self.name.clone())
            .no_binary_name(true)
            .args(arguments.iter().map(ArgSpec::to_arg));
        match self.description() {
            Some(description) => command.about(description),
            None => command,
        }
    }

    /// Parses argument tokens against the declaration.
    pub fn parse_args<I, T>(&self, tokens: I) -> Result<ParsedArgs, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let arguments = self.arguments();
        let matches = self.build_clap(&arguments).try_get_matches_from(tokens)?;
        Ok(ParsedArgs::from_matches(&arguments, &matches))
    }

    /// The scope this command is visible in.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Returns `true` if the command is visible to `session`.
    pub fn matches(&self, session: &Session) -> bool {
        self.scope.matches(session)
    }

    /// The parent node, if attached.
    pub fn parent(&self) -> Option<Arc<Command>> {
        self.parent.read().as_ref().and_then(Weak::upgrade)
    }

    /// Child nodes in attachment order.
    pub fn children(&self) -> Vec<Arc<Command>> {
        self.children.read().clone()
    }

    /// A copy of the current configuration.
    pub fn config(&self) -> CommandConfig {
        self.config.read().clone()
    }

    /// Merges `config` into the current configuration.
    pub fn set_config(&self, config: CommandConfig) -> &Self {
        self.config.write().merge(config);
        self
    }

    /// The description, if any.
    pub fn description(&self) -> Option<String> {
        self.config.read().description.clone()
    }

    /// Returns `true` if the command may be parsed without a prefix.
    pub fn allows_unprefixed(&self) -> bool {
        self.config.read().allow_unprefixed.unwrap_or(false)
    }

    /// Returns `true` if the command is hidden from listings.
    pub fn is_hidden(&self) -> bool {
        self.config.read().hidden.unwrap_or(false)
    }

    /// Usage text: the configured override, or the one clap renders for the
    /// declaration.
    pub fn usage(&self) -> String {
        if let Some(usage) = &self.config.read().usage {
            return usage.clone();
        }
        self.clap_command().render_usage().to_string()
    }

    /// Full help text rendered by clap.
    pub fn help(&self) -> String {
        self.clap_command().render_help().to_string()
    }

    /// Sets the action run when the command is invoked, replacing any
    /// previous one.
    pub fn action<F, Fut>(&self, f: F) -> &Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        *self.action.write() = Some(CommandAction::new(f));
        self
    }

    /// Returns `true` if an action is set.
    pub fn has_action(&self) -> bool {
        self.action.read().is_some()
    }

    /// Declares `raw` as a child of this command from `ctx`.
    ///
    /// `raw` may carry its own declaration, as in
    /// [`Context::command`](crate::Context::command).
    pub fn subcommand(&self, ctx: &Context, raw: &str) -> SetupResult<Arc<Command>> {
        ctx.command(&format!("{}/{}", self.name, raw.trim_start()))
    }

    /// Runs the action. Without one, the invocation's continuation runs
    /// instead.
    pub async fn execute(&self, invocation: Invocation) -> ExecuteResult<Option<Value>> {
        let action = self.action.read().clone();
        match action {
            Some(action) => {
                debug!(command = %self.name, args = invocation.args.len(), "running command");
                action
                    .call(invocation)
                    .await
                    .map_err(|source| ExecuteError::Action {
                        command: self.name.clone(),
                        source,
                    })
            }
            None => {
                invocation.next.run().await.map_err(ExecuteError::Next)?;
                Ok(None)
            }
        }
    }

    pub(crate) fn set_declaration(&self, declaration: &str, arguments: Vec<ArgSpec>) {
        *self.declaration.write() = declaration.to_string();
        *self.arguments.write() = arguments;
    }

    pub(crate) fn attach(parent: &Arc<Command>, child: &Arc<Command>) {
        *child.parent.write() = Some(Arc::downgrade(parent));
        parent.children.write().push(Arc::clone(child));
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("declaration", &*self.declaration.read())
            .field("parent", &self.parent().map(|p| p.name.clone()))
            .field("children", &self.children.read().len())
            .field("scope", &self.scope.to_string())
            .finish()
    }
}

// =============================================================================
// CommandMap
// =============================================================================

/// Name-unique index over every command node of one app.
#[derive(Debug, Clone, Default)]
pub struct CommandMap {
    inner: Arc<RwLock<HashMap<String, Arc<Command>>>>,
}

impl CommandMap {
    /// Looks up a command by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<Arc<Command>> {
        self.inner.read().get(&name.to_lowercase()).cloned()
    }

    /// Number of commands.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns `true` if no command is declared.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// All command names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.inner.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn write(
        &self,
    ) -> parking_lot::RwLockWriteGuard<'_, HashMap<String, Arc<Command>>> {
        self.inner.write()
    }

    pub(crate) fn clear(&self) {
        let commands = std::mem::take(&mut *self.inner.write());
        for command in commands.values() {
            command.children.write().clear();
            *command.action.write() = None;
        }
    }
}
