//! Built-in parse listener and command middleware, installed on every app.

use std::sync::Arc;

use cordon_core::{BoxError, Origin, Session};
use serde_json::json;
use tracing::trace;

use super::CommandMap;
use super::execute::ExecuteRequest;
use super::split::{shell_split, split_head};
use crate::context::Context;
use crate::listener::{EventArgs, Listener, is_truthy};
use crate::middleware::{Middleware, Next};

/// The default `parse` listener.
///
/// Expects `[text, forced]`. Produces an argv object when the first word
/// names a known command and the command is either forced or allows being
/// called without a prefix. Its `args` are the shell-split tokens after the
/// name; they are matched against the declaration on resolution.
pub(crate) fn command_parser(commands: CommandMap) -> Listener {
    Listener::sync(move |args: EventArgs| {
        let Some(text) = args.str(0) else {
            return Ok(None);
        };
        let forced = args.get(1).is_some_and(is_truthy);

        let (head, rest) = split_head(text);
        let Some(command) = commands.get(head) else {
            return Ok(None);
        };
        if !forced && !command.allows_unprefixed() {
            trace!(command = command.name(), "unprefixed invocation ignored");
            return Ok(None);
        }

        Ok(Some(json!({
            "command": command.name(),
            "args": shell_split(rest),
            "rest": rest,
        })))
    })
}

/// Removes the first matching prefix. Returns the remaining text and whether
/// a prefix was removed.
fn strip_prefix<'a>(message: &'a str, prefixes: &[String]) -> (&'a str, bool) {
    let message = message.trim_start();
    prefixes
        .iter()
        .filter(|prefix| !prefix.is_empty())
        .find_map(|prefix| message.strip_prefix(prefix.as_str()))
        .map_or((message, false), |rest| (rest, true))
}

/// The middleware that turns messages into command executions.
///
/// A message is forced when a prefix was stripped, when no prefixes are
/// configured, or when it is a direct message.
pub(crate) fn command_middleware(ctx: Context) -> Middleware {
    Middleware::new(move |session: Arc<Session>, next: Next| {
        let ctx = ctx.clone();
        async move {
            let prefixes = &ctx.app().options().prefix;
            let (text, stripped) = strip_prefix(&session.message, prefixes);
            let forced =
                stripped || prefixes.is_empty() || session.origin() == Some(Origin::Private);
            let request = ExecuteRequest::Text {
                text: text.to_string(),
                forced,
            };

            ctx.execute(Arc::clone(&session), request, next)
                .await
                .map(|_| ())
                .map_err(|error| Box::new(error) as BoxError)
        }
    })
}
