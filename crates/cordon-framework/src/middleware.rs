//! The per-record middleware pipeline.
//!
//! Every incoming record passes through the middleware registered on the
//! reserved [`MIDDLEWARE_EVENT`](crate::context::MIDDLEWARE_EVENT), in
//! registration order. Each stage receives the record and a [`Next`]
//! continuation; calling [`Next::run`] hands control to the following stage,
//! and dropping it ends the pipeline there.
//!
//! ```rust,ignore
//! ctx.middleware(|session, next| async move {
//!     if session.message.starts_with("!!") {
//!         return Ok(()); // swallow
//!     }
//!     next.run().await
//! });
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use cordon_core::{BoxError, Session};
use futures::FutureExt;
use futures::future::{self, BoxFuture};

/// Result of a middleware stage or continuation.
pub type MiddlewareResult = Result<(), BoxError>;

type MiddlewareFn = dyn Fn(Arc<Session>, Next) -> BoxFuture<'static, MiddlewareResult> + Send + Sync;
type NextFn = dyn FnOnce() -> BoxFuture<'static, MiddlewareResult> + Send;

/// A middleware stage.
#[derive(Clone)]
pub struct Middleware(Arc<MiddlewareFn>);

impl Middleware {
    /// Wraps an async closure taking the record and the continuation.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<Session>, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MiddlewareResult> + Send + 'static,
    {
        Self(Arc::new(move |session, next| f(session, next).boxed()))
    }

    /// Runs this stage.
    pub fn call(&self, session: Arc<Session>, next: Next) -> BoxFuture<'static, MiddlewareResult> {
        (self.0)(session, next)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware").finish_non_exhaustive()
    }
}

/// The continuation handed to a middleware stage or command.
///
/// Consumed by [`run`](Self::run), so it can be invoked at most once.
pub struct Next {
    kind: NextKind,
}

enum NextKind {
    Chain {
        session: Arc<Session>,
        chain: Arc<[Middleware]>,
        index: usize,
        tail: Box<Next>,
    },
    Func(Box<NextFn>),
    Noop,
}

impl Next {
    /// A continuation that does nothing.
    pub fn noop() -> Self {
        Self {
            kind: NextKind::Noop,
        }
    }

    /// A continuation backed by an async closure.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = MiddlewareResult> + Send + 'static,
    {
        Self {
            kind: NextKind::Func(Box::new(move || f().boxed())),
        }
    }

    /// A continuation that runs `chain` in order, then `tail`.
    pub(crate) fn chain(session: Arc<Session>, chain: Vec<Middleware>, tail: Next) -> Self {
        Self {
            kind: NextKind::Chain {
                session,
                chain: chain.into(),
                index: 0,
                tail: Box::new(tail),
            },
        }
    }

    /// Invokes the continuation.
    pub fn run(self) -> BoxFuture<'static, MiddlewareResult> {
        match self.kind {
            NextKind::Noop => future::ready(Ok(())).boxed(),
            NextKind::Func(f) => f(),
            NextKind::Chain {
                session,
                chain,
                index,
                tail,
            } => match chain.get(index).cloned() {
                Some(stage) => {
                    let next = Next {
                        kind: NextKind::Chain {
                            session: Arc::clone(&session),
                            chain,
                            index: index + 1,
                            tail,
                        },
                    };
                    stage.call(session, next)
                }
                None => tail.run(),
            },
        }
    }
}

impl Default for Next {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            NextKind::Chain { index, chain, .. } => format!("Chain({index}/{})", chain.len()),
            NextKind::Func(_) => "Func".to_string(),
            NextKind::Noop => "Noop".to_string(),
        };
        f.debug_tuple("Next").field(&kind).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str, forward: bool) -> Middleware {
        let log = Arc::clone(log);
        Middleware::new(move |_session, next: Next| {
            let log = Arc::clone(&log);
            async move {
                log.lock().push(name);
                if forward { next.run().await } else { Ok(()) }
            }
        })
    }

    #[tokio::test]
    async fn test_chain_runs_in_order_then_tail() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let tail_log = Arc::clone(&log);
        let tail = Next::from_fn(move || async move {
            tail_log.lock().push("tail");
            Ok(())
        });

        let chain = vec![recorder(&log, "a", true), recorder(&log, "b", true)];
        Next::chain(Arc::new(Session::new()), chain, tail)
            .run()
            .await
            .unwrap();

        assert_eq!(*log.lock(), vec!["a", "b", "tail"]);
    }

    #[tokio::test]
    async fn test_stage_can_stop_the_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = vec![
            recorder(&log, "a", false),
            recorder(&log, "b", true),
        ];
        Next::chain(Arc::new(Session::new()), chain, Next::noop())
            .run()
            .await
            .unwrap();

        assert_eq!(*log.lock(), vec!["a"]);
    }
}
