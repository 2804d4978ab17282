//! Runtime error types.

use cordon_framework::{DispatchError, SetupError};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while assembling or running a runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A configured plugin failed to install.
    #[error(transparent)]
    Setup(#[from] SetupError),

    /// The configured scope of a plugin leaves nothing of the app's scope.
    #[error("scope of plugin \"{name}\" admits nothing within the app")]
    PluginScope {
        /// Configured plugin name.
        name: String,
    },

    /// Handling a session failed in the middleware pipeline.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
