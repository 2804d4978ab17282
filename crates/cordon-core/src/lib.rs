//! # Cordon Core
//!
//! The data model of the Cordon dispatch engine.
//!
//! This crate provides the pieces every other layer builds on:
//!
//! - **Scope algebra**: [`ScopeSet`] allow/deny lists and the four-axis
//!   [`Scope`] with intersection, containment and matching
//! - **Event records**: the normalized [`Session`] and its [`Origin`]
//! - **Collaborators**: [`Transport`], [`Sender`] and [`Database`] traits
//!
//! ```rust,ignore
//! use cordon_core::{Scope, ScopeSet, Session};
//!
//! let mut scope = Scope::everyone();
//! scope.groups = ScopeSet::all().narrow(&[10001]);
//! scope.private = false;
//!
//! assert!(scope.matches(&Session::group(1, 10001, 42, "hello")));
//! assert!(!scope.matches(&Session::private(1, 42, "hello")));
//! ```

pub mod error;
pub mod integration;
pub mod scope;
pub mod session;

pub use error::{BoxError, DatabaseError, DatabaseResult, TransportError, TransportResult};
pub use integration::{BoxedDatabase, BoxedSender, BoxedTransport, Database, Sender, Transport};
pub use scope::{Scope, ScopeSet};
pub use session::{Origin, Session};
