//! Persistence collaborator interface.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::DatabaseResult;

/// Loads stored per-user and per-group state.
///
/// Called only when a database is configured, right before a matched command
/// runs. Failures propagate as execution failures.
#[async_trait]
pub trait Database: Send + Sync {
    /// Loads (or creates) the record of a user.
    async fn get_user(&self, user_id: i64) -> DatabaseResult<Value>;

    /// Loads (or creates) the record of a group.
    async fn get_group(&self, group_id: i64) -> DatabaseResult<Value>;
}

/// Type alias for a shared database.
pub type BoxedDatabase = Arc<dyn Database>;
