//! Restricted views over one app.
//!
//! A [`Context`] is a cheap handle combining three things:
//!
//! - a unique identity, used as the registration key for listeners;
//! - a [`Scope`] describing which records it may react to;
//! - the shared [`AppState`] (hook registry, command map, collaborators).
//!
//! Narrowing methods ([`group`](Context::group), [`user`](Context::user),
//! [`bot`](Context::bot), [`private`](Context::private)) return a *new*
//! context with a fresh identity and a smaller scope; the receiver is never
//! changed. Clones share identity.
//!
//! ```rust,ignore
//! let app = App::new(AppOptions::default());
//! let staff = app.group(&[10001]).user(&[42]);
//!
//! staff.on("message", Listener::sync(|args| {
//!     tracing::info!(text = ?args.get(0), "staff said something");
//!     Ok(None)
//! }));
//! ```

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use cordon_core::{
    BoxedDatabase, BoxedSender, BoxedTransport, Origin, Scope, ScopeSet, Session, TransportError,
    TransportResult,
};
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{Span, debug_span};

#[cfg(feature = "command")]
use crate::command::CommandMap;
use crate::error::SetupResult;
use crate::listener::{EventArgs, HookResult, Listener};
use crate::middleware::{Middleware, MiddlewareResult, Next};
use crate::plugin::Plugin;
use crate::registry::{ContextId, HookRegistry, Subscription, WeakRegistry};

// =============================================================================
// Reserved event names
// =============================================================================

/// Event under which middleware stages are registered.
pub const MIDDLEWARE_EVENT: &str = "middleware";

/// Bail event asked to turn message text into an argv object.
pub const PARSE_EVENT: &str = "parse";

/// Serial event fired before a command runs; a truthy result vetoes it.
pub const BEFORE_COMMAND_EVENT: &str = "before-command";

/// Event emitted after a command ran.
pub const COMMAND_EVENT: &str = "command";

/// Event emitted after the middleware pipeline finished for a record.
pub const AFTER_MIDDLEWARE_EVENT: &str = "after-middleware";

// =============================================================================
// App state
// =============================================================================

/// App-wide options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppOptions {
    /// Command prefixes. A message starting with one of these is a forced
    /// command invocation. Empty means every message is forced.
    pub prefix: Vec<String>,
    /// Restricts the root context to this bot account.
    pub self_id: Option<i64>,
}

impl AppOptions {
    /// Adds a command prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix.push(prefix.into());
        self
    }

    /// Restricts the app to one bot account.
    pub fn with_self_id(mut self, self_id: i64) -> Self {
        self.self_id = Some(self_id);
        self
    }
}

/// State shared by every context of one app.
pub struct AppState {
    pub(crate) registry: HookRegistry,
    #[cfg(feature = "command")]
    pub(crate) commands: CommandMap,
    options: AppOptions,
    transport: Option<BoxedTransport>,
    database: Option<BoxedDatabase>,
    next_context: AtomicU64,
}

impl AppState {
    pub(crate) fn new(
        options: AppOptions,
        transport: Option<BoxedTransport>,
        database: Option<BoxedDatabase>,
    ) -> Self {
        Self {
            registry: HookRegistry::new(),
            #[cfg(feature = "command")]
            commands: CommandMap::default(),
            options,
            transport,
            database,
            next_context: AtomicU64::new(0),
        }
    }

    /// The app options.
    pub fn options(&self) -> &AppOptions {
        &self.options
    }

    /// The hook registry.
    pub fn registry(&self) -> &HookRegistry {
        &self.registry
    }

    /// The command map.
    #[cfg(feature = "command")]
    pub fn commands(&self) -> &CommandMap {
        &self.commands
    }

    /// The transport collaborator, if configured.
    pub fn transport(&self) -> Option<&BoxedTransport> {
        self.transport.as_ref()
    }

    /// The persistence collaborator, if configured.
    pub fn database(&self) -> Option<&BoxedDatabase> {
        self.database.as_ref()
    }

    fn next_context_id(&self) -> ContextId {
        self.next_context.fetch_add(1, Ordering::Relaxed)
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("AppState");
        debug
            .field("options", &self.options)
            .field("events", &self.registry.event_names());
        #[cfg(feature = "command")]
        debug.field("commands", &self.commands.len());
        debug
            .field("transport", &self.transport.is_some())
            .field("database", &self.database.is_some())
            .finish()
    }
}

// =============================================================================
// Context
// =============================================================================

/// A restricted view over one app.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    id: ContextId,
    scope: Arc<Scope>,
    app: Arc<AppState>,
}

impl Context {
    pub(crate) fn root(app: Arc<AppState>, scope: Scope) -> Self {
        let id = app.next_context_id();
        Self {
            inner: Arc::new(ContextInner {
                id,
                scope: Arc::new(scope),
                app,
            }),
        }
    }

    /// A fresh context over the same app with `scope`.
    fn derive(&self, scope: Scope) -> Self {
        Self::root(Arc::clone(&self.inner.app), scope)
    }

    /// Identity of this context; shared by clones.
    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    /// The scope this context is restricted to.
    pub fn scope(&self) -> &Scope {
        &self.inner.scope
    }

    pub(crate) fn scope_arc(&self) -> Arc<Scope> {
        Arc::clone(&self.inner.scope)
    }

    /// The shared app state.
    pub fn app(&self) -> &Arc<AppState> {
        &self.inner.app
    }

    pub(crate) fn registry(&self) -> &HookRegistry {
        &self.inner.app.registry
    }

    /// A debug span tagged with this context's identity.
    pub fn logger(&self, name: &str) -> Span {
        debug_span!("context", id = self.id(), name)
    }

    // -------------------------------------------------------------------------
    // Narrowing
    // -------------------------------------------------------------------------

    /// Narrows the groups axis. The result no longer admits direct messages.
    pub fn group(&self, ids: &[i64]) -> Self {
        let mut scope = self.scope().clone();
        scope.groups = scope.groups.narrow(ids);
        scope.private = false;
        self.derive(scope)
    }

    /// Narrows the users axis.
    pub fn user(&self, ids: &[i64]) -> Self {
        let mut scope = self.scope().clone();
        scope.users = scope.users.narrow(ids);
        self.derive(scope)
    }

    /// Narrows the bots axis.
    pub fn bot(&self, ids: &[i64]) -> Self {
        let mut scope = self.scope().clone();
        scope.bots = scope.bots.narrow(ids);
        self.derive(scope)
    }

    /// Restricts to direct messages, optionally from the given users.
    ///
    /// The private flag is inherited: narrowing a context that rejects direct
    /// messages yields one that admits nothing.
    pub fn private(&self, ids: &[i64]) -> Self {
        let mut scope = self.scope().clone();
        scope.groups = ScopeSet::none();
        scope.users = scope.users.narrow(ids);
        self.derive(scope)
    }

    /// Axis-wise intersection with `other`.
    ///
    /// Returns `None` when the intersection admits nothing.
    pub fn intersect(&self, other: &Context) -> Option<Context> {
        self.scope()
            .intersect(other.scope())
            .map(|scope| self.derive(scope))
    }

    /// Intersects with a bare scope, for scopes that come from configuration.
    ///
    /// Returns `None` when the result admits nothing.
    pub fn restrict(&self, scope: &Scope) -> Option<Context> {
        self.scope()
            .intersect(scope)
            .map(|scope| self.derive(scope))
    }

    /// Tests a record against this context's scope.
    pub fn matches(&self, session: &Session) -> bool {
        self.scope().matches(session)
    }

    /// Returns `true` if every record `other` admits is admitted here.
    pub fn contain(&self, other: &Context) -> bool {
        self.scope().contains(other.scope())
    }

    // -------------------------------------------------------------------------
    // Plugins
    // -------------------------------------------------------------------------

    /// Applies `plugin` to this context.
    ///
    /// `options == false` disables the plugin without calling it.
    pub fn plugin(&self, plugin: &Plugin, options: Value) -> SetupResult<&Self> {
        if options == Value::Bool(false) {
            tracing::debug!(plugin = plugin.name(), "plugin disabled");
            return Ok(self);
        }
        plugin.apply(self, options)?;
        Ok(self)
    }

    // -------------------------------------------------------------------------
    // Listeners
    // -------------------------------------------------------------------------

    /// Appends `listener` to `event`.
    pub fn on(&self, event: &str, listener: Listener) -> Subscription {
        self.registry()
            .append(event, self.id(), self.scope_arc(), listener)
    }

    /// Alias of [`on`](Self::on).
    pub fn add_listener(&self, event: &str, listener: Listener) -> Subscription {
        self.on(event, listener)
    }

    /// Prepends `listener` to `event`.
    pub fn before(&self, event: &str, listener: Listener) -> Subscription {
        self.registry()
            .prepend(event, self.id(), self.scope_arc(), listener)
    }

    /// Alias of [`before`](Self::before).
    pub fn prepend_listener(&self, event: &str, listener: Listener) -> Subscription {
        self.before(event, listener)
    }

    /// Appends a listener that removes itself before its first run.
    ///
    /// Fires at most once even when several dispatches race for it.
    pub fn once(&self, event: &str, listener: Listener) -> Subscription {
        let guard = Arc::new(OnceGuard::new(self.registry().downgrade()));
        let wrapped = once_wrapper(listener, Arc::clone(&guard));
        let subscription = self.on(event, wrapped);
        guard.bind(subscription.clone());
        subscription
    }

    /// Removes a registration made through this context.
    ///
    /// Returns `false` if the token belongs to another context or the
    /// listener is already gone.
    pub fn off(&self, subscription: &Subscription) -> bool {
        subscription.context == self.id() && self.registry().remove(subscription)
    }

    /// Alias of [`off`](Self::off).
    pub fn remove_listener(&self, subscription: &Subscription) -> bool {
        self.off(subscription)
    }

    // -------------------------------------------------------------------------
    // Middleware
    // -------------------------------------------------------------------------

    /// Appends an async closure to the middleware pipeline.
    pub fn middleware<F, Fut>(&self, f: F) -> Subscription
    where
        F: Fn(Arc<Session>, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MiddlewareResult> + Send + 'static,
    {
        self.add_middleware(Middleware::new(f))
    }

    /// Appends a middleware stage.
    pub fn add_middleware(&self, middleware: Middleware) -> Subscription {
        self.on(MIDDLEWARE_EVENT, Listener::middleware(middleware))
    }

    /// Prepends a middleware stage.
    pub fn prepend_middleware(&self, middleware: Middleware) -> Subscription {
        self.before(MIDDLEWARE_EVENT, Listener::middleware(middleware))
    }

    /// Removes a middleware stage registered through this context.
    pub fn remove_middleware(&self, subscription: &Subscription) -> bool {
        subscription.event == MIDDLEWARE_EVENT && self.off(subscription)
    }

    /// Installs a middleware stage, at the front of the pipeline, that
    /// consumes exactly one record.
    ///
    /// With a `session`, only records with the same
    /// [`session_id`](Session::session_id) are considered; others pass
    /// straight through to `next`. The first matching record unsubscribes the
    /// stage and is handed to `middleware`.
    pub fn once_middleware(&self, middleware: Middleware, session: Option<&Session>) -> Subscription {
        let target = session.map(Session::session_id);
        let guard = Arc::new(OnceGuard::new(self.registry().downgrade()));
        let claim = Arc::clone(&guard);

        let wrapped = Middleware::new(move |session: Arc<Session>, next: Next| {
            let wanted = target
                .as_deref()
                .is_none_or(|id| id == session.session_id());
            if wanted && claim.claim() {
                middleware.call(session, next)
            } else {
                next.run()
            }
        });

        let subscription = self.prepend_middleware(wrapped);
        guard.bind(subscription.clone());
        subscription
    }

    // -------------------------------------------------------------------------
    // Collaborators
    // -------------------------------------------------------------------------

    /// The sender for bot `bot_id`, as provided by the transport.
    pub fn sender(&self, bot_id: i64) -> Option<BoxedSender> {
        self.app().transport()?.sender(bot_id)
    }

    /// Sends `message` back to wherever `session` came from, through the bot
    /// that received it.
    pub async fn reply(&self, session: &Session, message: &str) -> TransportResult<()> {
        let id = session
            .self_id
            .ok_or_else(|| TransportError::SendFailed("record has no bot id".to_string()))?;
        let sender = self.sender(id).ok_or(TransportError::BotNotFound { id })?;
        sender.send(session, message).await
    }

    /// The persistence collaborator, if configured.
    pub fn database(&self) -> Option<&BoxedDatabase> {
        self.app().database()
    }

    /// Classifies `session`'s origin if it has none yet.
    pub fn classify(&self, session: &Session) -> Origin {
        match self.app().transport() {
            Some(transport) => session.ensure_origin(|s| transport.classify(s)),
            None => session.ensure_origin(Origin::infer),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id())
            .field("scope", &self.scope().to_string())
            .finish()
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id() && Arc::ptr_eq(&self.inner.app, &other.inner.app)
    }
}

impl Eq for Context {}

// =============================================================================
// Self-removing registrations
// =============================================================================

/// Fire-once latch shared by a self-removing registration.
struct OnceGuard {
    fired: AtomicBool,
    subscription: OnceLock<Subscription>,
    registry: WeakRegistry,
}

impl OnceGuard {
    fn new(registry: WeakRegistry) -> Self {
        Self {
            fired: AtomicBool::new(false),
            subscription: OnceLock::new(),
            registry,
        }
    }

    fn bind(&self, subscription: Subscription) {
        let _ = self.subscription.set(subscription);
    }

    /// Returns `true` for the first caller only, unsubscribing on the way.
    fn claim(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(subscription) = self.subscription.get() {
            self.registry.remove(subscription);
        }
        true
    }
}

fn once_wrapper(listener: Listener, guard: Arc<OnceGuard>) -> Listener {
    match listener {
        Listener::Sync(f) => Listener::sync(move |args: EventArgs| -> HookResult {
            if guard.claim() { f(args) } else { Ok(None) }
        }),
        Listener::Async(f) => Listener::Async(Arc::new(
            move |args: EventArgs| -> BoxFuture<'static, HookResult> {
                if guard.claim() {
                    f(args)
                } else {
                    future::ready(Ok(None)).boxed()
                }
            },
        )),
        Listener::Middleware(middleware) => {
            Listener::middleware(Middleware::new(move |session, next: Next| {
                if guard.claim() {
                    middleware.call(session, next)
                } else {
                    next.run()
                }
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::App;

    fn app() -> App {
        App::new(AppOptions::default())
    }

    #[test]
    fn test_narrowing_gives_fresh_identity() {
        let app = app();
        let root = app.context();
        let narrowed = root.group(&[1]);

        assert_ne!(root.id(), narrowed.id());
        assert_eq!(narrowed.clone(), narrowed);
        assert!(root.scope().groups.is_unrestricted());
        assert!(!narrowed.scope().private);
    }

    #[test]
    fn test_group_matching() {
        let app = app();
        let g1 = app.group(&[1]);
        assert!(g1.matches(&Session::group(9, 1, 5, "")));
        assert!(!g1.matches(&Session::group(9, 2, 5, "")));
        assert!(!g1.matches(&Session::private(9, 5, "")));

        let none = g1.group(&[2]);
        assert!(!none.matches(&Session::group(9, 1, 5, "")));
        assert!(!none.matches(&Session::group(9, 2, 5, "")));
    }

    #[test]
    fn test_private_matching() {
        let app = app();
        let dm = app.private(&[5]);
        assert!(dm.matches(&Session::private(9, 5, "")));
        assert!(!dm.matches(&Session::private(9, 6, "")));
        assert!(!dm.matches(&Session::group(9, 1, 5, "")));

        // Narrowing a group-only context cannot re-admit direct messages.
        let closed = app.group(&[1]).private(&[5]);
        assert!(!closed.matches(&Session::private(9, 5, "")));
    }

    #[test]
    fn test_unclassified_records_match() {
        let app = app();
        let ctx = app.group(&[1]).user(&[2]);
        assert!(ctx.matches(&Session::new().with_group_id(3)));
    }

    #[test]
    fn test_contain_reflexive_and_transitive() {
        let app = app();
        let a = app.context();
        let b = a.group(&[1, 2, 3]);
        let c = b.user(&[7]);
        let d = c.group(&[2]);

        for ctx in [&a, &b, &c, &d] {
            assert!(ctx.contain(ctx));
        }
        assert!(a.contain(&b) && b.contain(&c) && c.contain(&d));
        assert!(a.contain(&d) && b.contain(&d));
        assert!(!d.contain(&b));
        assert!(!b.contain(&a));
    }

    #[test]
    fn test_intersect() {
        let app = app();
        let left = app.group(&[1, 2]);
        let right = app.group(&[2, 3]);

        let both = left.intersect(&right).unwrap();
        assert_eq!(both.scope().groups, ScopeSet::only([2]));
        assert!(!both.scope().private);

        assert!(app.group(&[1]).intersect(&app.group(&[2])).is_none());
        assert!(app.bot(&[1]).intersect(&app.bot(&[2])).is_none());
        assert!(app.private(&[]).intersect(&app.group(&[1])).is_none());
    }

    #[test]
    fn test_restrict_by_scope() {
        let app = app();
        let scope = Scope {
            users: ScopeSet::except([7]),
            ..Scope::everyone()
        };
        let restricted = app.group(&[1]).restrict(&scope).unwrap();
        assert_eq!(restricted.scope().groups, ScopeSet::only([1]));
        assert_eq!(restricted.scope().users, ScopeSet::except([7]));
        assert!(app.contain(&restricted));

        let disjoint = Scope {
            bots: ScopeSet::none(),
            ..Scope::everyone()
        };
        assert!(app.restrict(&disjoint).is_none());
    }

    #[test]
    fn test_off_requires_owner() {
        let app = app();
        let owner = app.user(&[1]);
        let other = app.user(&[1]);
        let sub = owner.on("e", Listener::sync(|_| Ok(None)));

        assert!(!other.off(&sub));
        assert!(owner.off(&sub));
        assert!(!owner.off(&sub));
    }

    #[tokio::test]
    async fn test_once_fires_once() {
        use std::sync::atomic::AtomicUsize;

        let app = app();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        app.once(
            "ping",
            Listener::sync(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }),
        );

        app.parallel(None, "ping", vec![]).await.unwrap();
        app.parallel(None, "ping", vec![]).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(app.app().registry().len("ping"), 0);
    }

    #[tokio::test]
    async fn test_once_middleware_filters_by_session() {
        use parking_lot::Mutex;

        let app = app();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let target = Session::private(1, 42, "");

        app.once_middleware(
            Middleware::new(move |session: Arc<Session>, _next| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().push(session.message.clone());
                    Ok(())
                }
            }),
            Some(&target),
        );

        app.handle(Session::private(1, 7, "other")).await.unwrap();
        app.handle(Session::private(1, 42, "first")).await.unwrap();
        app.handle(Session::private(1, 42, "second")).await.unwrap();

        assert_eq!(*seen.lock(), vec!["first".to_string()]);
    }

    #[tokio::test]
    async fn test_remove_middleware() {
        use std::sync::atomic::AtomicUsize;

        let app = app();
        let owner = app.user(&[42]);
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let stage = owner.middleware(move |_, next: Next| {
            counter.fetch_add(1, Ordering::SeqCst);
            next.run()
        });

        app.handle(Session::private(1, 42, "hi")).await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Only the registering context may remove the stage.
        assert!(!app.user(&[42]).remove_middleware(&stage));
        assert!(!app.remove_middleware(&stage));

        // Listener subscriptions are not middleware.
        let listener = owner.on("message", Listener::sync(|_| Ok(None)));
        assert!(!owner.remove_middleware(&listener));
        assert_eq!(app.app().registry().len("message"), 1);

        assert!(owner.remove_middleware(&stage));
        assert!(!owner.remove_middleware(&stage));
        app.handle(Session::private(1, 42, "hi")).await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reply_needs_a_known_bot() {
        let app = app();
        let err = app
            .reply(&Session::private(7, 42, "hi"), "pong")
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::BotNotFound { id: 7 }));

        let err = app.reply(&Session::new(), "pong").await.unwrap_err();
        assert!(matches!(err, TransportError::SendFailed(_)));
    }
}
