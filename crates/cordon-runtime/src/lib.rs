//! Cordon Runtime - assembly layer for the Cordon dispatch engine.
//!
//! This crate provides:
//! - Layered configuration (`ConfigLoader`, `CordonConfig`)
//! - Logging setup from configuration (`LoggingBuilder`)
//! - `CordonRuntime`, which builds an app from configuration and installs
//!   plugins by name, optionally restricted to a configured scope
//!
//! ```ignore
//! use cordon_runtime::CordonRuntime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = CordonRuntime::builder()
//!         .plugin(Plugin::function("ping", ping))
//!         .build()?;
//!
//!     for session in incoming() {
//!         runtime.handle(session).await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use config::{ConfigError, ConfigLoader, ConfigResult, CordonConfig, PluginEntry};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{CordonRuntime, RuntimeBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides the commonly used logging macros and `Level` for spans.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
