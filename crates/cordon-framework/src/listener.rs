//! Listener values stored in the hook registry.
//!
//! A [`Listener`] is one of three shapes:
//!
//! - **Sync**: a plain closure, eligible for every dispatch strategy
//!   including [`bail`](crate::Context::bail).
//! - **Async**: a closure returning a future; skipped by `bail`.
//! - **Middleware**: a pipeline stage, only ever run by the middleware
//!   pipeline.
//!
//! All listeners receive an [`EventArgs`] and produce a [`HookResult`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use cordon_core::{BoxError, Session};
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use serde_json::Value;

use crate::middleware::Middleware;

/// What a listener produces: an optional value, or a failure.
///
/// `Ok(None)` means "no opinion" and lets `serial`/`bail` continue.
pub type HookResult = Result<Option<Value>, BoxError>;

type SyncFn = dyn Fn(EventArgs) -> HookResult + Send + Sync;
type AsyncFn = dyn Fn(EventArgs) -> BoxFuture<'static, HookResult> + Send + Sync;

/// Arguments handed to a listener.
///
/// Cheap to clone: the session and the positional values are shared.
#[derive(Debug, Clone)]
pub struct EventArgs {
    session: Option<Arc<Session>>,
    args: Arc<[Value]>,
}

impl EventArgs {
    pub(crate) fn new(session: Option<Arc<Session>>, args: Vec<Value>) -> Self {
        Self {
            session,
            args: args.into(),
        }
    }

    /// The record this event concerns, if the dispatch supplied one.
    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    /// Returns the positional argument at `index`.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Returns the positional argument at `index` as a string slice.
    pub fn str(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(Value::as_str)
    }

    /// All positional arguments.
    pub fn args(&self) -> &[Value] {
        &self.args
    }
}

/// A callable registered under an event name.
#[derive(Clone)]
pub enum Listener {
    /// Runs to completion synchronously.
    Sync(Arc<SyncFn>),
    /// Returns a future.
    Async(Arc<AsyncFn>),
    /// A stage of the per-record middleware pipeline.
    Middleware(Middleware),
}

impl Listener {
    /// Wraps a synchronous closure.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(EventArgs) -> HookResult + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    /// Wraps an asynchronous closure.
    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn(EventArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        Self::Async(Arc::new(move |args| f(args).boxed()))
    }

    /// Wraps a middleware stage.
    pub fn middleware(middleware: Middleware) -> Self {
        Self::Middleware(middleware)
    }

    /// Returns `true` for synchronous listeners.
    pub fn is_sync(&self) -> bool {
        matches!(self, Self::Sync(_))
    }

    /// Returns the middleware stage, if this is one.
    pub fn as_middleware(&self) -> Option<&Middleware> {
        match self {
            Self::Middleware(middleware) => Some(middleware),
            _ => None,
        }
    }

    /// Invokes the listener as a future.
    ///
    /// Middleware stages are not event listeners and resolve to `Ok(None)`.
    pub fn call(&self, args: EventArgs) -> BoxFuture<'static, HookResult> {
        match self {
            Self::Sync(f) => future::ready(f(args)).boxed(),
            Self::Async(f) => f(args),
            Self::Middleware(_) => future::ready(Ok(None)).boxed(),
        }
    }

    /// Invokes a synchronous listener. Returns `None` for any other shape.
    pub fn call_sync(&self, args: EventArgs) -> Option<HookResult> {
        match self {
            Self::Sync(f) => Some(f(args)),
            _ => None,
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Sync(_) => "Sync",
            Self::Async(_) => "Async",
            Self::Middleware(_) => "Middleware",
        };
        f.debug_tuple("Listener").field(&kind).finish()
    }
}

/// Truthiness used by `serial` and `bail` to decide whether a result wins.
///
/// `null`, `false`, `0`, `NaN` and the empty string are falsy; everything
/// else, including empty arrays and objects, is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!(0.0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!("X")));
        assert!(is_truthy(&json!(-1)));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!({})));
    }

    #[tokio::test]
    async fn test_listener_shapes() {
        let sync = Listener::sync(|args| Ok(args.get(0).cloned()));
        let fut = Listener::future(|args: EventArgs| async move { Ok(args.get(1).cloned()) });

        let args = EventArgs::new(None, vec![json!("a"), json!("b")]);
        assert!(sync.is_sync());
        assert!(!fut.is_sync());

        assert_eq!(sync.call(args.clone()).await.unwrap(), Some(json!("a")));
        assert_eq!(fut.call(args.clone()).await.unwrap(), Some(json!("b")));
        assert!(fut.call_sync(args.clone()).is_none());
        assert_eq!(sync.call_sync(args).unwrap().unwrap(), Some(json!("a")));
    }
}
