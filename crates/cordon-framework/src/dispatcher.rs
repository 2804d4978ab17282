//! Event dispatch strategies.
//!
//! Every strategy follows the same setup:
//!
//! 1. Take a snapshot of the entries registered under the event name. Changes
//!    to the registry during the dispatch only affect later dispatches.
//! 2. Skip entries whose scope does not match the session (when one is given).
//! 3. Run the remaining listeners in registration order.
//!
//! They differ in how results are aggregated:
//!
//! | Strategy | Execution | Result |
//! |---|---|---|
//! | [`parallel`](Context::parallel) | concurrent | all run, failures collected |
//! | [`emit`](Context::emit) | concurrent | like `parallel`, failures logged |
//! | [`serial`](Context::serial) | one at a time | first truthy value |
//! | [`bail`](Context::bail) | synchronous only | first truthy value |
//!
//! None of them mutate the registry.

use std::sync::Arc;

use cordon_core::Session;
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::context::{AFTER_MIDDLEWARE_EVENT, Context, MIDDLEWARE_EVENT};
use crate::error::{DispatchError, DispatchResult};
use crate::listener::{EventArgs, is_truthy};
use crate::middleware::Next;
use crate::registry::HookEntry;

impl Context {
    /// Snapshot of the entries for `event` that admit `session`.
    fn matching(&self, session: Option<&Arc<Session>>, event: &str) -> Vec<HookEntry> {
        let entries = self.registry().snapshot(event);
        debug!(event, listeners = entries.len(), "dispatch");

        match session {
            None => entries,
            Some(session) => entries
                .into_iter()
                .filter(|entry| {
                    let admitted = entry.scope.matches(session);
                    if !admitted {
                        trace!(event, listener = entry.id, "listener out of scope");
                    }
                    admitted
                })
                .collect(),
        }
    }

    /// Runs every matching listener concurrently and waits for all of them.
    ///
    /// Every listener is attempted even if others fail. Failures are
    /// reported together, one entry per failing listener.
    pub async fn parallel(
        &self,
        session: Option<&Arc<Session>>,
        event: &str,
        args: Vec<Value>,
    ) -> DispatchResult<()> {
        let entries = self.matching(session, event);
        let args = EventArgs::new(session.cloned(), args);

        let results = join_all(
            entries
                .iter()
                .filter(|entry| entry.listener.as_middleware().is_none())
                .map(|entry| entry.listener.call(args.clone())),
        )
        .await;

        let failures: Vec<_> = results.into_iter().filter_map(Result::err).collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(DispatchError::Listeners {
                event: event.to_string(),
                failures,
            })
        }
    }

    /// Fire-and-forget variant of [`parallel`](Self::parallel): failures are
    /// logged and swallowed.
    pub async fn emit(&self, session: Option<&Arc<Session>>, event: &str, args: Vec<Value>) {
        if let Err(DispatchError::Listeners { failures, .. }) =
            self.parallel(session, event, args).await
        {
            for error in failures {
                warn!(event, error = %error, "listener failed");
            }
        }
    }

    /// Runs matching listeners one at a time.
    ///
    /// The first truthy result wins and stops the chain. A failure aborts the
    /// chain and is returned.
    pub async fn serial(
        &self,
        session: Option<&Arc<Session>>,
        event: &str,
        args: Vec<Value>,
    ) -> DispatchResult<Option<Value>> {
        let entries = self.matching(session, event);
        let args = EventArgs::new(session.cloned(), args);

        for entry in entries {
            if entry.listener.as_middleware().is_some() {
                continue;
            }
            let result = entry
                .listener
                .call(args.clone())
                .await
                .map_err(|source| listener_error(event, source))?;
            if let Some(value) = result
                && is_truthy(&value)
            {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Synchronous [`serial`](Self::serial): only synchronous listeners are
    /// considered.
    pub fn bail(
        &self,
        session: Option<&Arc<Session>>,
        event: &str,
        args: Vec<Value>,
    ) -> DispatchResult<Option<Value>> {
        let entries = self.matching(session, event);
        let args = EventArgs::new(session.cloned(), args);

        for entry in entries {
            let Some(result) = entry.listener.call_sync(args.clone()) else {
                continue;
            };
            let result = result.map_err(|source| listener_error(event, source))?;
            if let Some(value) = result
                && is_truthy(&value)
            {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Passes `session` through the middleware pipeline, then emits
    /// `after-middleware`.
    ///
    /// The origin is classified first, so scope filtering sees it. `fallback`
    /// runs if the last stage calls its continuation.
    pub async fn run_middleware(&self, session: Arc<Session>, fallback: Next) -> DispatchResult<()> {
        self.classify(&session);

        let chain: Vec<_> = self
            .matching(Some(&session), MIDDLEWARE_EVENT)
            .into_iter()
            .filter_map(|entry| entry.listener.as_middleware().cloned())
            .collect();

        Next::chain(Arc::clone(&session), chain, fallback)
            .run()
            .await
            .map_err(DispatchError::Middleware)?;

        self.emit(Some(&session), AFTER_MIDDLEWARE_EVENT, Vec::new())
            .await;
        Ok(())
    }
}

fn listener_error(event: &str, source: cordon_core::BoxError) -> DispatchError {
    DispatchError::Listener {
        event: event.to_string(),
        source,
    }
}
