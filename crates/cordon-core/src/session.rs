//! Normalized event records.
//!
//! A [`Session`] is what the transport hands to the engine for every incoming
//! event: where it came from, who sent it, and the message text. The engine
//! only reads these fields to decide which contexts react; everything else
//! about the wire format stays with the transport.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Origin Classification
// ============================================================================

/// High-level classification of where an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// A direct message between one user and the bot.
    Private,
    /// A message or notice inside a group.
    Group,
    /// An event about the bot account itself (lifecycle, heartbeat, ...).
    Bot,
    /// Anything else.
    Other,
}

impl Origin {
    /// Infers the origin from which ids a record carries.
    ///
    /// Used by transports that have no better source of truth.
    pub fn infer(session: &Session) -> Self {
        match (session.group_id, session.user_id, session.self_id) {
            (Some(_), _, _) => Self::Group,
            (None, Some(_), _) => Self::Private,
            (None, None, Some(_)) => Self::Bot,
            _ => Self::Other,
        }
    }

    /// Returns the lowercase name of this origin.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
            Self::Bot => "bot",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Origin {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "private" | "direct" => Self::Private,
            "group" => Self::Group,
            "bot" | "meta" | "meta_event" => Self::Bot,
            _ => Self::Other,
        })
    }
}

// ============================================================================
// Session
// ============================================================================

/// A normalized event record.
///
/// The origin classification is filled at most once, either when the record
/// is built or lazily by the transport before dispatch. Persistence state for
/// the sender and group is attached the same way during command execution.
#[derive(Debug, Clone, Default)]
pub struct Session {
    origin: OnceLock<Origin>,
    /// The bot account that received the event.
    pub self_id: Option<i64>,
    /// The group the event happened in.
    pub group_id: Option<i64>,
    /// The user that triggered the event.
    pub user_id: Option<i64>,
    /// Plain-text message content (empty for non-message events).
    pub message: String,
    /// The untouched payload as delivered by the transport.
    pub raw: Value,
    user: OnceLock<Value>,
    group: OnceLock<Value>,
}

impl Session {
    /// Creates an empty, unclassified record.
    pub fn new() -> Self {
        Self::default()
    }

    /// A direct message from `user_id` to bot `self_id`.
    pub fn private(self_id: i64, user_id: i64, message: impl Into<String>) -> Self {
        Self {
            self_id: Some(self_id),
            user_id: Some(user_id),
            message: message.into(),
            ..Self::default()
        }
        .with_origin(Origin::Private)
    }

    /// A group message from `user_id` in `group_id`, received by bot `self_id`.
    pub fn group(self_id: i64, group_id: i64, user_id: i64, message: impl Into<String>) -> Self {
        Self {
            self_id: Some(self_id),
            group_id: Some(group_id),
            user_id: Some(user_id),
            message: message.into(),
            ..Self::default()
        }
        .with_origin(Origin::Group)
    }

    /// Sets the origin classification. Has no effect if already classified.
    pub fn with_origin(self, origin: Origin) -> Self {
        let _ = self.origin.set(origin);
        self
    }

    /// Sets the bot id.
    pub fn with_self_id(mut self, id: i64) -> Self {
        self.self_id = Some(id);
        self
    }

    /// Sets the group id.
    pub fn with_group_id(mut self, id: i64) -> Self {
        self.group_id = Some(id);
        self
    }

    /// Sets the user id.
    pub fn with_user_id(mut self, id: i64) -> Self {
        self.user_id = Some(id);
        self
    }

    /// Sets the message text.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Sets the raw payload.
    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }

    /// Returns the origin classification, if determined.
    pub fn origin(&self) -> Option<Origin> {
        self.origin.get().copied()
    }

    /// Returns the origin, computing it with `classify` on first use.
    pub fn ensure_origin(&self, classify: impl FnOnce(&Self) -> Origin) -> Origin {
        *self.origin.get_or_init(|| classify(self))
    }

    /// A stable identity for "the same conversation partner".
    ///
    /// Two records share an identity when they come from the same user in the
    /// same group (or the same direct-message channel) through the same bot.
    pub fn session_id(&self) -> String {
        let part = |id: Option<i64>| id.map_or_else(|| "-".to_string(), |id| id.to_string());
        format!(
            "{}:{}:{}",
            part(self.self_id),
            part(self.group_id),
            part(self.user_id)
        )
    }

    /// Stored state of the sender, once attached.
    pub fn user(&self) -> Option<&Value> {
        self.user.get()
    }

    /// Stored state of the group, once attached.
    pub fn group_state(&self) -> Option<&Value> {
        self.group.get()
    }

    /// Attaches the sender's stored state. Returns `false` if already attached.
    pub fn attach_user(&self, state: Value) -> bool {
        self.user.set(state).is_ok()
    }

    /// Attaches the group's stored state. Returns `false` if already attached.
    pub fn attach_group(&self, state: Value) -> bool {
        self.group.set(state).is_ok()
    }
}
