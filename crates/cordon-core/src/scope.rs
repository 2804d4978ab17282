//! Scope algebra.
//!
//! A [`Scope`] describes which event origins a context reacts to. It is made
//! of independent axes (bots, groups, users) plus a flag for direct messages.
//! Every axis is a [`ScopeSet`]: either an explicit allow-list
//! ([`ScopeSet::Only`]) or an explicit deny-list ([`ScopeSet::Except`]).
//!
//! Narrowing is monotone: [`ScopeSet::narrow`] with a non-empty id list always
//! produces an allow-list that is a subset of the original set, so chained
//! narrowing calls can only shrink what a context admits.
//!
//! ```rust,ignore
//! use cordon_core::{Scope, ScopeSet};
//!
//! let everyone = ScopeSet::all();
//! let some = everyone.narrow(&[1, 2, 3]);
//! assert_eq!(some, ScopeSet::only([1, 2, 3]));
//! assert_eq!(some.narrow(&[3, 4]), ScopeSet::only([3]));
//! ```

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::session::{Origin, Session};

// =============================================================================
// ScopeSet
// =============================================================================

/// One axis of a [`Scope`].
///
/// Serialized externally tagged, which is also the format used in
/// configuration files:
///
/// ```toml
/// groups = { only = [10001, 10002] }
/// users = { except = [42] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeSet {
    /// Exactly these ids are admitted.
    Only(BTreeSet<i64>),
    /// Every id except these is admitted.
    Except(BTreeSet<i64>),
}

impl Default for ScopeSet {
    fn default() -> Self {
        Self::all()
    }
}

impl ScopeSet {
    /// A set admitting every id.
    pub fn all() -> Self {
        Self::Except(BTreeSet::new())
    }

    /// A set admitting no id at all.
    pub fn none() -> Self {
        Self::Only(BTreeSet::new())
    }

    /// An allow-list of the given ids.
    pub fn only(ids: impl IntoIterator<Item = i64>) -> Self {
        Self::Only(ids.into_iter().collect())
    }

    /// A deny-list of the given ids.
    pub fn except(ids: impl IntoIterator<Item = i64>) -> Self {
        Self::Except(ids.into_iter().collect())
    }

    /// Returns `true` for allow-lists.
    pub fn is_positive(&self) -> bool {
        matches!(self, Self::Only(_))
    }

    /// The listed ids, regardless of polarity.
    pub fn ids(&self) -> &BTreeSet<i64> {
        match self {
            Self::Only(ids) | Self::Except(ids) => ids,
        }
    }

    /// Returns `true` if `id` is admitted by this set.
    pub fn admits(&self, id: i64) -> bool {
        match self {
            Self::Only(ids) => ids.contains(&id),
            Self::Except(ids) => !ids.contains(&id),
        }
    }

    /// Returns `true` if no id is admitted.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Only(ids) if ids.is_empty())
    }

    /// Returns `true` if every id is admitted.
    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Self::Except(ids) if ids.is_empty())
    }

    /// Restricts this set to the proposed `ids`.
    ///
    /// - An empty `ids` list adds no restriction and returns a copy of `self`
    ///   with its polarity unchanged.
    /// - Against an allow-list, the result is the common members.
    /// - Against a deny-list, the result is the proposed ids minus the denied
    ///   ones.
    ///
    /// Any non-empty narrowing yields an allow-list.
    pub fn narrow(&self, ids: &[i64]) -> Self {
        if ids.is_empty() {
            return self.clone();
        }

        let proposed: BTreeSet<i64> = ids.iter().copied().collect();
        match self {
            Self::Only(base) => Self::Only(proposed.intersection(base).copied().collect()),
            Self::Except(base) => Self::Only(proposed.difference(base).copied().collect()),
        }
    }

    /// Set intersection of two axes.
    pub fn intersect(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Only(a), Self::Only(b)) => Self::Only(a.intersection(b).copied().collect()),
            (Self::Only(a), Self::Except(b)) | (Self::Except(b), Self::Only(a)) => {
                Self::Only(a.difference(b).copied().collect())
            }
            (Self::Except(a), Self::Except(b)) => Self::Except(a.union(b).copied().collect()),
        }
    }

    /// Returns `true` if every id admitted by `other` is admitted by `self`.
    pub fn contains(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Only(a), Self::Only(b)) => b.is_subset(a),
            // A finite allow-list never covers an open deny-list.
            (Self::Only(_), Self::Except(_)) => false,
            (Self::Except(a), Self::Only(b)) => a.is_disjoint(b),
            (Self::Except(a), Self::Except(b)) => a.is_subset(b),
        }
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |ids: &BTreeSet<i64>| {
            ids.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        match self {
            Self::Only(ids) => write!(f, "{{{}}}", list(ids)),
            Self::Except(ids) if ids.is_empty() => f.write_str("*"),
            Self::Except(ids) => write!(f, "* - {{{}}}", list(ids)),
        }
    }
}

// =============================================================================
// Scope
// =============================================================================

/// The set of origins a context is permitted to react to.
///
/// A record must satisfy every axis it carries an id for; there is no
/// cross-axis OR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scope {
    /// Bot accounts (matched against the record's `self_id`).
    pub bots: ScopeSet,
    /// Groups (matched against the record's `group_id`).
    pub groups: ScopeSet,
    /// Users (matched against the record's `user_id`).
    pub users: ScopeSet,
    /// Group role tags. Preserved through narrowing but not consulted during
    /// dispatch; empty means unrestricted.
    pub roles: BTreeSet<String>,
    /// Whether direct messages are admitted.
    pub private: bool,
}

impl Default for Scope {
    fn default() -> Self {
        Self::everyone()
    }
}

impl Scope {
    /// The unrestricted scope held by the root context.
    pub fn everyone() -> Self {
        Self {
            bots: ScopeSet::all(),
            groups: ScopeSet::all(),
            users: ScopeSet::all(),
            roles: BTreeSet::new(),
            private: true,
        }
    }

    /// Returns `true` if no record can ever match this scope.
    pub fn admits_nothing(&self) -> bool {
        self.bots.is_empty() || self.users.is_empty() || (self.groups.is_empty() && !self.private)
    }

    /// Axis-wise intersection.
    ///
    /// Returns `None` when the result admits nothing.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let roles = match (self.roles.is_empty(), other.roles.is_empty()) {
            (true, _) => other.roles.clone(),
            (_, true) => self.roles.clone(),
            _ => self.roles.intersection(&other.roles).cloned().collect(),
        };

        let scope = Self {
            bots: self.bots.intersect(&other.bots),
            groups: self.groups.intersect(&other.groups),
            users: self.users.intersect(&other.users),
            roles,
            private: self.private && other.private,
        };

        (!scope.admits_nothing()).then_some(scope)
    }

    /// Returns `true` if every record admitted by `other` is admitted by `self`.
    pub fn contains(&self, other: &Self) -> bool {
        self.bots.contains(&other.bots)
            && self.groups.contains(&other.groups)
            && self.users.contains(&other.users)
            && (self.private || !other.private)
    }

    /// Tests a record's origin against this scope.
    ///
    /// Records without an origin classification match unconditionally.
    pub fn matches(&self, session: &Session) -> bool {
        let Some(origin) = session.origin() else {
            return true;
        };

        if let Some(id) = session.self_id
            && !self.bots.admits(id)
        {
            return false;
        }

        if let Some(id) = session.user_id
            && !self.users.admits(id)
        {
            return false;
        }

        match session.group_id {
            Some(id) if !self.groups.admits(id) => return false,
            None if origin == Origin::Group && !self.groups.is_unrestricted() => return false,
            _ => {}
        }

        origin != Origin::Private || self.private
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bots={} groups={} users={} private={}",
            self.bots, self.groups, self.users, self.private
        )
    }
}
