//! Turning records into command invocations.
//!
//! ```text
//! text ──parse──► argv ──resolve──► invocation ──execute──► action
//!        (bail)         (lookup +              (before-command,
//!                        scope gate)            command)
//! ```
//!
//! Anything that does not produce an invocation (empty text, no parser
//! claiming it, unknown command, command outside the record's scope,
//! arguments the declaration rejects) is a pass-through: the continuation
//! runs instead. Rejected arguments are also answered with clap's error or
//! help text when the record's bot can be reached.

use std::fmt;
use std::sync::Arc;

use cordon_core::{Origin, Session};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{Instrument, debug, trace};

use super::Command;
use crate::context::{BEFORE_COMMAND_EVENT, COMMAND_EVENT, Context, PARSE_EVENT};
use crate::error::{DispatchResult, ExecuteError, ExecuteResult};
use crate::middleware::Next;

/// The command an argv refers to.
#[derive(Clone)]
pub enum CommandRef {
    /// A name to look up in the command map.
    Name(String),
    /// An already resolved node.
    Node(Arc<Command>),
}

impl fmt::Debug for CommandRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.debug_tuple("Name").field(name).finish(),
            Self::Node(node) => f.debug_tuple("Node").field(&node.name()).finish(),
        }
    }
}

/// A split command line, not yet resolved.
#[derive(Debug, Clone)]
pub struct Argv {
    /// The command.
    pub command: CommandRef,
    /// Argument tokens, matched against the command's declaration on
    /// resolution.
    pub args: Vec<String>,
    /// Options set directly, overriding parsed ones.
    pub options: Map<String, Value>,
    /// The raw text after the command name.
    pub rest: String,
}

#[derive(Deserialize)]
struct ParsedArgv {
    command: String,
    #[serde(default)]
    args: Vec<Value>,
    #[serde(default)]
    options: Map<String, Value>,
    #[serde(default)]
    rest: String,
}

impl Argv {
    /// An argv for `command` with no arguments.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: CommandRef::Name(command.into()),
            args: Vec::new(),
            options: Map::new(),
            rest: String::new(),
        }
    }

    /// An argv targeting an already resolved node.
    pub fn node(command: Arc<Command>) -> Self {
        Self {
            command: CommandRef::Node(command),
            ..Self::new(String::new())
        }
    }

    /// Appends an argument token.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets an option directly.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Reads an argv object produced by a `parse` listener.
    ///
    /// Returns `None` unless `value` is an object with a string `command`.
    /// Non-string tokens are kept in their JSON text form.
    pub fn from_value(value: Value) -> Option<Self> {
        let parsed: ParsedArgv = serde_json::from_value(value).ok()?;
        let args = parsed
            .args
            .into_iter()
            .map(|arg| match arg {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect();
        Some(Self {
            command: CommandRef::Name(parsed.command),
            args,
            options: parsed.options,
            rest: parsed.rest,
        })
    }
}

/// A resolved command invocation.
#[derive(Debug)]
pub struct Invocation {
    /// The command to run.
    pub command: Arc<Command>,
    /// The record that triggered it.
    pub session: Arc<Session>,
    /// What to run if the command passes control on.
    pub next: Next,
    /// Positional values, in declaration order.
    pub args: Vec<String>,
    /// Declared flags and options, plus any set directly on the argv.
    pub options: Map<String, Value>,
    /// The raw text after the command name.
    pub rest: String,
}

impl Invocation {
    /// The option `key`, if given.
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }
}

/// What [`Context::execute`] is asked to run.
#[derive(Debug, Clone)]
pub enum ExecuteRequest {
    /// Raw message text.
    Text {
        /// The text, prefix already removed.
        text: String,
        /// Whether the text is known to be a command invocation.
        forced: bool,
    },
    /// A pre-parsed argv.
    Argv(Argv),
}

impl From<&str> for ExecuteRequest {
    fn from(text: &str) -> Self {
        Self::Text {
            text: text.to_string(),
            forced: true,
        }
    }
}

impl From<String> for ExecuteRequest {
    fn from(text: String) -> Self {
        Self::Text { text, forced: true }
    }
}

impl From<Argv> for ExecuteRequest {
    fn from(argv: Argv) -> Self {
        Self::Argv(argv)
    }
}

/// Outcome of resolving an argv that names a visible command.
enum Binding {
    Ready(Invocation),
    Rejected {
        command: Arc<Command>,
        error: clap::Error,
    },
}

impl Context {
    /// Parses `text` into an invocation through the `parse` event.
    ///
    /// Empty text yields `None` without consulting any parser. The returned
    /// invocation's continuation is a no-op.
    pub fn parse(
        &self,
        text: &str,
        session: &Arc<Session>,
        forced: bool,
    ) -> DispatchResult<Option<Invocation>> {
        let argv = self.parse_argv(text, session, forced)?;
        Ok(argv.and_then(|argv| self.resolve(argv, session)))
    }

    fn parse_argv(
        &self,
        text: &str,
        session: &Arc<Session>,
        forced: bool,
    ) -> DispatchResult<Option<Argv>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let argv = self.bail(Some(session), PARSE_EVENT, vec![json!(text), json!(forced)])?;
        Ok(argv.and_then(Argv::from_value))
    }

    /// Resolves an argv against the command map.
    ///
    /// Unknown commands, commands whose scope does not admit `session`, and
    /// argument tokens the command's declaration rejects resolve to `None`.
    pub fn resolve(&self, argv: Argv, session: &Arc<Session>) -> Option<Invocation> {
        match self.bind(argv, session)? {
            Binding::Ready(invocation) => Some(invocation),
            Binding::Rejected { command, error } => {
                debug!(command = command.name(), kind = ?error.kind(), "arguments rejected");
                None
            }
        }
    }

    fn bind(&self, argv: Argv, session: &Arc<Session>) -> Option<Binding> {
        let command = match argv.command {
            CommandRef::Node(node) => node,
            CommandRef::Name(name) => self.app().commands().get(&name)?,
        };
        if !command.matches(session) {
            trace!(command = command.name(), "command out of scope");
            return None;
        }

        let parsed = match command.parse_args(argv.args) {
            Ok(parsed) => parsed,
            Err(error) => return Some(Binding::Rejected { command, error }),
        };
        let mut options = parsed.options;
        options.extend(argv.options);

        Some(Binding::Ready(Invocation {
            command,
            session: Arc::clone(session),
            next: Next::noop(),
            args: parsed.args,
            options,
            rest: argv.rest,
        }))
    }

    /// Answers rejected arguments with clap's rendering of the problem.
    async fn reject(&self, session: &Session, command: &Command, error: &clap::Error) {
        debug!(command = command.name(), kind = ?error.kind(), "arguments rejected");
        if let Err(error) = self.reply(session, &error.to_string()).await {
            debug!(%error, "argument error not delivered");
        }
    }

    /// Runs a command for `session`.
    ///
    /// When `request` does not produce an invocation, `next` runs exactly once
    /// and `Ok(None)` is returned. Otherwise stored state is attached (when a
    /// database is configured), `before-command` may veto, the command runs
    /// with `next` as its continuation, and `command` is emitted.
    pub async fn execute(
        &self,
        session: Arc<Session>,
        request: impl Into<ExecuteRequest>,
        next: Next,
    ) -> ExecuteResult<Option<Value>> {
        let origin = self.classify(&session);

        let argv = match request.into() {
            ExecuteRequest::Text { text, forced } => self.parse_argv(&text, &session, forced)?,
            ExecuteRequest::Argv(argv) => Some(argv),
        };
        let mut invocation = match argv.and_then(|argv| self.bind(argv, &session)) {
            Some(Binding::Ready(invocation)) => invocation,
            Some(Binding::Rejected { command, error }) => {
                self.reject(&session, &command, &error).await;
                next.run().await.map_err(ExecuteError::Next)?;
                return Ok(None);
            }
            None => {
                next.run().await.map_err(ExecuteError::Next)?;
                return Ok(None);
            }
        };
        invocation.next = next;

        if let Some(database) = self.database() {
            if let Some(user_id) = session.user_id
                && session.user().is_none()
            {
                session.attach_user(database.get_user(user_id).await?);
            }
            if origin == Origin::Group
                && let Some(group_id) = session.group_id
                && session.group_state().is_none()
            {
                session.attach_group(database.get_group(group_id).await?);
            }
        }

        let command = Arc::clone(&invocation.command);
        let name = command.name().to_string();
        let before = vec![
            json!(name),
            json!(invocation.args),
            Value::Object(invocation.options.clone()),
        ];
        if self
            .serial(Some(&session), BEFORE_COMMAND_EVENT, before)
            .await?
            .is_some()
        {
            debug!(command = %name, "command vetoed");
            return Ok(None);
        }

        let output = command
            .execute(invocation)
            .instrument(self.logger(&name))
            .await?;
        self.emit(
            Some(&session),
            COMMAND_EVENT,
            vec![json!(name), output.clone().unwrap_or(Value::Null)],
        )
        .await;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use cordon_core::{
        BoxedSender, Database, DatabaseError, DatabaseResult, Sender, Transport, TransportResult,
    };
    use parking_lot::Mutex;

    use super::*;
    use crate::context::AppOptions;
    use crate::listener::Listener;
    use crate::App;

    fn counting_next(counter: &Arc<AtomicUsize>) -> Next {
        let counter = Arc::clone(counter);
        Next::from_fn(move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_empty_text_calls_next_once_without_lookup() {
        let app = App::new(AppOptions::default());
        let parses = Arc::new(AtomicUsize::new(0));
        let parse_counter = Arc::clone(&parses);
        app.before(
            PARSE_EVENT,
            Listener::sync(move |_| {
                parse_counter.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }),
        );

        let nexts = Arc::new(AtomicUsize::new(0));
        let session = Arc::new(Session::private(1, 2, ""));
        let output = app.execute(session, "", counting_next(&nexts)).await.unwrap();

        assert_eq!(output, None);
        assert_eq!(nexts.load(Ordering::SeqCst), 1);
        assert_eq!(parses.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_execute_runs_action() {
        let app = App::new(AppOptions::default());
        app.command("echo <text...> --loud")
            .unwrap()
            .action(|inv| async move {
                let loud = inv.option("loud") == Some(&json!(true));
                Ok(Some(json!([inv.args, loud, format!("{}!", inv.rest)])))
            });

        let nexts = Arc::new(AtomicUsize::new(0));
        let session = Arc::new(Session::group(1, 10, 2, ""));
        let output = app
            .execute(session, "echo hello 'big world' --loud", counting_next(&nexts))
            .await
            .unwrap();

        assert_eq!(
            output,
            Some(json!([
                ["hello", "big world"],
                true,
                "hello 'big world' --loud!"
            ]))
        );
        assert_eq!(nexts.load(Ordering::SeqCst), 0);
    }

    struct RecordingSender {
        sent: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Sender for RecordingSender {
        fn self_id(&self) -> i64 {
            1
        }

        async fn send(&self, _session: &Session, message: &str) -> TransportResult<()> {
            self.sent.lock().push(message.to_string());
            Ok(())
        }
    }

    struct SingleBot(BoxedSender);

    impl Transport for SingleBot {
        fn sender(&self, bot_id: i64) -> Option<BoxedSender> {
            (bot_id == self.0.self_id()).then(|| Arc::clone(&self.0))
        }
    }

    #[tokio::test]
    async fn test_missing_required_argument_passes_through() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sender: BoxedSender = Arc::new(RecordingSender {
            sent: Arc::clone(&sent),
        });
        let app = App::builder().transport(Arc::new(SingleBot(sender))).build();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        app.command("deploy <target>").unwrap().action(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(Some(json!("deployed"))) }
        });

        let nexts = Arc::new(AtomicUsize::new(0));
        let session = Arc::new(Session::private(1, 2, ""));
        let output = app
            .execute(Arc::clone(&session), "deploy", counting_next(&nexts))
            .await
            .unwrap();
        assert_eq!(output, None);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(nexts.load(Ordering::SeqCst), 1);
        assert_eq!(sent.lock().len(), 1);
        assert!(sent.lock()[0].contains("<target>"));

        // A pre-split argv is held to the same declaration.
        let output = app
            .execute(Arc::clone(&session), Argv::new("deploy"), counting_next(&nexts))
            .await
            .unwrap();
        assert_eq!(output, None);
        assert_eq!(nexts.load(Ordering::SeqCst), 2);
        assert!(app.parse("deploy", &session, true).unwrap().is_none());

        let output = app
            .execute(session, "deploy web", counting_next(&nexts))
            .await
            .unwrap();
        assert_eq!(output, Some(json!("deployed")));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_argv_options_override_parsed_ones() {
        let app = App::new(AppOptions::default());
        app.command("build [target] --release --jobs <n>")
            .unwrap()
            .action(|inv| async move { Ok(Some(Value::Object(inv.options))) });

        let session = Arc::new(Session::private(1, 2, ""));
        let argv = Argv::new("build")
            .with_arg("--jobs")
            .with_arg("4")
            .with_option("release", true);
        let output = app.execute(session, argv, Next::noop()).await.unwrap();
        assert_eq!(output, Some(json!({ "release": true, "jobs": "4" })));
    }

    #[tokio::test]
    async fn test_out_of_scope_command_passes_through() {
        let app = App::new(AppOptions::default());
        app.group(&[10])
            .command("secret")
            .unwrap()
            .action(|_| async { Ok(Some(json!("found"))) });

        let nexts = Arc::new(AtomicUsize::new(0));
        let outsider = Arc::new(Session::group(1, 11, 2, ""));
        let output = app
            .execute(outsider, "secret", counting_next(&nexts))
            .await
            .unwrap();
        assert_eq!(output, None);
        assert_eq!(nexts.load(Ordering::SeqCst), 1);

        let insider = Arc::new(Session::group(1, 10, 2, ""));
        let output = app
            .execute(insider, Argv::new("SECRET"), Next::noop())
            .await
            .unwrap();
        assert_eq!(output, Some(json!("found")));
    }

    #[tokio::test]
    async fn test_action_free_command_continues() {
        let app = App::new(AppOptions::default());
        app.command("noop").unwrap();

        let nexts = Arc::new(AtomicUsize::new(0));
        let session = Arc::new(Session::private(1, 2, ""));
        app.execute(session, "noop", counting_next(&nexts))
            .await
            .unwrap();
        assert_eq!(nexts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_before_command_veto_and_command_event() {
        let app = App::new(AppOptions::default());
        app.command("ping")
            .unwrap()
            .action(|_| async { Ok(Some(json!("pong"))) });

        let emitted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&emitted);
        app.on(
            COMMAND_EVENT,
            Listener::sync(move |args| {
                sink.lock().push(args.args().to_vec());
                Ok(None)
            }),
        );

        let session = Arc::new(Session::private(1, 2, ""));
        let output = app
            .execute(Arc::clone(&session), "ping", Next::noop())
            .await
            .unwrap();
        assert_eq!(output, Some(json!("pong")));
        assert_eq!(*emitted.lock(), vec![vec![json!("ping"), json!("pong")]]);

        app.on(
            BEFORE_COMMAND_EVENT,
            Listener::sync(|args| Ok((args.str(0) == Some("ping")).then(|| json!("denied")))),
        );
        let output = app.execute(session, "ping", Next::noop()).await.unwrap();
        assert_eq!(output, None);
        assert_eq!(emitted.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_action_error() {
        let app = App::new(AppOptions::default());
        app.command("fail")
            .unwrap()
            .action(|_| async { Err("broken".into()) });

        let session = Arc::new(Session::private(1, 2, ""));
        let err = app.execute(session, "fail", Next::noop()).await.unwrap_err();
        assert!(matches!(err, ExecuteError::Action { ref command, .. } if command == "fail"));
    }

    #[tokio::test]
    async fn test_unprefixed_text_needs_opt_in() {
        let app = App::new(AppOptions::default());
        app.command("strict").unwrap().action(|_| async { Ok(Some(json!(1))) });
        app.command_with(
            "loose",
            None,
            crate::command::CommandConfig::default().with_allow_unprefixed(true),
        )
        .unwrap()
        .action(|_| async { Ok(Some(json!(2))) });

        let session = Arc::new(Session::group(1, 10, 2, ""));
        let unforced = |text: &str| ExecuteRequest::Text {
            text: text.to_string(),
            forced: false,
        };

        let strict = app
            .execute(Arc::clone(&session), unforced("strict"), Next::noop())
            .await
            .unwrap();
        let loose = app
            .execute(session, unforced("loose"), Next::noop())
            .await
            .unwrap();
        assert_eq!(strict, None);
        assert_eq!(loose, Some(json!(2)));
    }

    struct MemoryDatabase {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Database for MemoryDatabase {
        async fn get_user(&self, user_id: i64) -> DatabaseResult<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "id": user_id, "authority": 1 }))
        }

        async fn get_group(&self, group_id: i64) -> DatabaseResult<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if group_id < 0 {
                return Err(DatabaseError::backend("no such group"));
            }
            Ok(json!({ "id": group_id }))
        }
    }

    #[tokio::test]
    async fn test_state_attached_before_action() {
        let database = Arc::new(MemoryDatabase {
            calls: AtomicUsize::new(0),
        });
        let app = App::builder().database(database.clone()).build();
        app.command("whoami").unwrap().action(|inv| async move {
            let user = inv.session.user().cloned().unwrap_or_default();
            let group = inv.session.group_state().cloned().unwrap_or_default();
            Ok(Some(json!([user["id"], group["id"]])))
        });

        let session = Arc::new(Session::group(1, 10, 2, ""));
        let output = app.execute(session, "whoami", Next::noop()).await.unwrap();
        assert_eq!(output, Some(json!([2, 10])));
        assert_eq!(database.calls.load(Ordering::SeqCst), 2);

        let private = Arc::new(Session::private(1, 3, ""));
        let output = app.execute(private, "whoami", Next::noop()).await.unwrap();
        assert_eq!(output, Some(json!([3, null])));
        assert_eq!(database.calls.load(Ordering::SeqCst), 3);

        let broken = Arc::new(Session::group(1, -1, 2, ""));
        let err = app.execute(broken, "whoami", Next::noop()).await.unwrap_err();
        assert!(matches!(err, ExecuteError::Database(_)));
    }
}
