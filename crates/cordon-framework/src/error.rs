//! Error types for the Cordon framework.
//!
//! Three families, matching when they surface:
//!
//! - [`SetupError`]: plugin-authoring mistakes, raised synchronously while
//!   plugins install listeners and declare commands.
//! - [`DispatchError`]: listener failures, visible to whoever dispatched the
//!   event.
//! - [`ExecuteError`]: failures while running a matched command.
//!
//! A missing command, or a command outside the record's scope, is not an
//! error: control simply passes to the continuation.

use cordon_core::{BoxError, DatabaseError};
use thiserror::Error;

/// Configuration errors raised while setting up plugins and commands.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The plugin is neither a function nor an object with `apply`, or no
    /// plugin is registered under the requested name.
    #[error("invalid plugin: expected function or object with apply ({0})")]
    InvalidPlugin(String),

    /// A command path would make a node its own child or give it a second
    /// parent.
    #[error("invalid subcommand \"{name}\"")]
    InvalidSubcommand {
        /// Full name of the offending node.
        name: String,
    },

    /// A command's scope is not contained in its parent's, or narrowing left
    /// nothing admitted.
    #[error("invalid context for command \"{name}\"")]
    InvalidContext {
        /// Full name of the offending node.
        name: String,
    },

    /// The command path is empty or has an empty segment.
    #[error("invalid command name \"{0}\"")]
    InvalidCommandName(String),

    /// The argument declaration after the command path cannot be read.
    #[error("invalid declaration for command \"{name}\": {reason}")]
    InvalidDeclaration {
        /// Full name of the declared node.
        name: String,
        /// What is wrong with the declaration.
        reason: String,
    },

    /// A plugin's own `apply` failed.
    #[error("plugin \"{name}\" failed to apply: {source}")]
    Plugin {
        /// Name of the failing plugin.
        name: String,
        /// The error returned by the plugin.
        #[source]
        source: BoxError,
    },
}

impl SetupError {
    /// Creates an invalid-subcommand error.
    pub fn invalid_subcommand(name: impl Into<String>) -> Self {
        Self::InvalidSubcommand { name: name.into() }
    }

    /// Creates an invalid-context error.
    pub fn invalid_context(name: impl Into<String>) -> Self {
        Self::InvalidContext { name: name.into() }
    }
}

/// Listener failures observed by a dispatch call.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A listener failed during `serial` or `bail`; the rest of the chain was
    /// not run.
    #[error("listener for \"{event}\" failed: {source}")]
    Listener {
        /// The dispatched event.
        event: String,
        /// The listener's error.
        #[source]
        source: BoxError,
    },

    /// One or more listeners failed during `parallel`. Every matching
    /// listener was still run to completion.
    #[error("{} listener(s) for \"{event}\" failed", failures.len())]
    Listeners {
        /// The dispatched event.
        event: String,
        /// One entry per failing listener, in registration order.
        failures: Vec<BoxError>,
    },

    /// A middleware in the per-record pipeline failed.
    #[error("middleware failed: {0}")]
    Middleware(#[source] BoxError),
}

impl DispatchError {
    /// Returns the event name this failure belongs to, if any.
    pub fn event(&self) -> Option<&str> {
        match self {
            Self::Listener { event, .. } | Self::Listeners { event, .. } => Some(event),
            Self::Middleware(_) => None,
        }
    }
}

/// Failures while running a command.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// A hook fired during execution failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Loading stored user or group state failed.
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// The command's action failed.
    #[error("command \"{command}\" failed: {source}")]
    Action {
        /// Name of the command.
        command: String,
        /// The action's error.
        #[source]
        source: BoxError,
    },

    /// The continuation failed.
    #[error("continuation failed: {0}")]
    Next(#[source] BoxError),
}

/// Result type for setup operations.
pub type SetupResult<T> = Result<T, SetupError>;

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Result type for command execution.
pub type ExecuteResult<T> = Result<T, ExecuteError>;
