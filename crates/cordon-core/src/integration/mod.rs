//! Integration layer - interfaces to external collaborators.
//!
//! The engine never talks to a network or a file itself. It reaches the
//! outside world only through these traits:
//! - [`Transport`] classifies records and hands out reply [`Sender`]s
//! - [`Database`] loads stored user/group state during command execution

pub mod database;
pub mod transport;

pub use database::{BoxedDatabase, Database};
pub use transport::{BoxedSender, BoxedTransport, Sender, Transport};
