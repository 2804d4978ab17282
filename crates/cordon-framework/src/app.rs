//! The root of a Cordon application.

use std::ops::Deref;
use std::sync::Arc;

use cordon_core::{BoxedDatabase, BoxedTransport, Scope, ScopeSet, Session};
use tracing::{debug, info};

#[cfg(feature = "command")]
use crate::command::{command_middleware, command_parser};
#[cfg(feature = "command")]
use crate::context::PARSE_EVENT;
use crate::context::{AppOptions, AppState, Context};
use crate::error::DispatchResult;
use crate::middleware::Next;

/// An application: the owner of one hook registry and one command map, and
/// the root [`Context`] over them.
///
/// `App` dereferences to its root context, so every context method is
/// available on it directly.
///
/// ```rust,ignore
/// let app = App::builder()
///     .options(AppOptions::default().with_prefix("!"))
///     .transport(transport)
///     .build();
///
/// app.command("ping")?.action(|_| async { Ok(Some("pong".into())) });
/// app.handle(session).await?;
/// ```
pub struct App {
    root: Context,
}

impl App {
    /// Creates an app without collaborators.
    pub fn new(options: AppOptions) -> Self {
        Self::builder().options(options).build()
    }

    /// Starts building an app.
    pub fn builder() -> AppBuilder {
        AppBuilder::default()
    }

    /// The root context.
    pub fn context(&self) -> &Context {
        &self.root
    }

    /// Runs `session` through the middleware pipeline.
    ///
    /// The built-in command middleware turns prefixed messages into command
    /// executions; middleware failures are returned.
    pub async fn handle(&self, session: impl Into<Arc<Session>>) -> DispatchResult<()> {
        self.root.run_middleware(session.into(), Next::noop()).await
    }
}

impl Deref for App {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.root
    }
}

impl Drop for App {
    fn drop(&mut self) {
        // Listeners and actions may hold contexts, which hold the app state.
        let state = self.root.app();
        state.registry.clear();
        #[cfg(feature = "command")]
        state.commands.clear();
        debug!("app dropped");
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App").field("state", self.root.app()).finish()
    }
}

/// Builder for [`App`].
#[derive(Default)]
pub struct AppBuilder {
    options: AppOptions,
    transport: Option<BoxedTransport>,
    database: Option<BoxedDatabase>,
}

impl AppBuilder {
    /// Sets the app options.
    pub fn options(mut self, options: AppOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the transport collaborator.
    pub fn transport(mut self, transport: BoxedTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the persistence collaborator.
    pub fn database(mut self, database: BoxedDatabase) -> Self {
        self.database = Some(database);
        self
    }

    /// Builds the app and, with the `command` feature, installs the built-in
    /// parser and command middleware.
    pub fn build(self) -> App {
        let mut scope = Scope::everyone();
        if let Some(self_id) = self.options.self_id {
            scope.bots = ScopeSet::only([self_id]);
        }

        let prefixes = self.options.prefix.len();
        let state = Arc::new(AppState::new(self.options, self.transport, self.database));
        let root = Context::root(state, scope);

        #[cfg(feature = "command")]
        {
            root.on(PARSE_EVENT, command_parser(root.app().commands().clone()));
            root.add_middleware(command_middleware(root.clone()));
        }

        info!(
            prefixes,
            transport = root.app().transport().is_some(),
            database = root.app().database().is_some(),
            "app created"
        );
        App { root }
    }
}
