//! The hook registry: event name to ordered listener entries.
//!
//! One registry is owned by each [`App`](crate::App) and shared by every
//! [`Context`](crate::Context) derived from it. Entries remember the
//! registering context's identity and scope, so dispatch can filter without
//! touching the context itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use cordon_core::Scope;
use parking_lot::RwLock;
use tracing::trace;

use crate::listener::Listener;

/// Identity of a [`Context`](crate::Context).
pub type ContextId = u64;

/// Identity of one registration.
pub type ListenerId = u64;

type HookMap = HashMap<String, Vec<HookEntry>>;

/// One registration under an event name.
#[derive(Debug, Clone)]
pub struct HookEntry {
    /// The registering context.
    pub context: ContextId,
    /// Scope of the registering context at registration time.
    pub scope: Arc<Scope>,
    /// Registration identity.
    pub id: ListenerId,
    /// The listener itself.
    pub listener: Listener,
}

/// Removal token returned by every registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    /// Event name the listener is registered under.
    pub event: String,
    /// Context that registered it.
    pub context: ContextId,
    /// Registration identity.
    pub listener: ListenerId,
}

/// The shared registry.
#[derive(Debug, Clone, Default)]
pub struct HookRegistry {
    hooks: Arc<RwLock<HookMap>>,
    next_id: Arc<AtomicU64>,
}

impl HookRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, context: ContextId, scope: Arc<Scope>, listener: Listener) -> HookEntry {
        HookEntry {
            context,
            scope,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            listener,
        }
    }

    /// Registers `listener` at the end of `event`'s list.
    pub fn append(
        &self,
        event: &str,
        context: ContextId,
        scope: Arc<Scope>,
        listener: Listener,
    ) -> Subscription {
        let entry = self.entry(context, scope, listener);
        let subscription = Subscription {
            event: event.to_string(),
            context,
            listener: entry.id,
        };
        self.hooks.write().entry(event.to_string()).or_default().push(entry);
        trace!(event, listener = subscription.listener, "listener appended");
        subscription
    }

    /// Registers `listener` at the front of `event`'s list.
    pub fn prepend(
        &self,
        event: &str,
        context: ContextId,
        scope: Arc<Scope>,
        listener: Listener,
    ) -> Subscription {
        let entry = self.entry(context, scope, listener);
        let subscription = Subscription {
            event: event.to_string(),
            context,
            listener: entry.id,
        };
        self.hooks
            .write()
            .entry(event.to_string())
            .or_default()
            .insert(0, entry);
        trace!(event, listener = subscription.listener, "listener prepended");
        subscription
    }

    /// Removes the registration named by `subscription`.
    ///
    /// Both the context identity and the listener identity must match.
    /// Returns `false` if nothing was removed.
    pub fn remove(&self, subscription: &Subscription) -> bool {
        remove_from(&self.hooks, subscription)
    }

    /// A copy of the entries registered under `event`, in order.
    ///
    /// Dispatch iterates this copy, so registrations and removals made while
    /// a dispatch is running only affect later dispatches.
    pub fn snapshot(&self, event: &str) -> Vec<HookEntry> {
        self.hooks.read().get(event).cloned().unwrap_or_default()
    }

    /// Number of entries registered under `event`.
    pub fn len(&self, event: &str) -> usize {
        self.hooks.read().get(event).map_or(0, Vec::len)
    }

    /// Returns `true` if no event has any entry.
    pub fn is_empty(&self) -> bool {
        self.hooks.read().values().all(Vec::is_empty)
    }

    /// Names of every event that has been registered at least once.
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.hooks.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// A handle that does not keep the registry alive.
    pub fn downgrade(&self) -> WeakRegistry {
        WeakRegistry {
            hooks: Arc::downgrade(&self.hooks),
        }
    }

    /// Drops every entry.
    ///
    /// Only used when the owning app shuts down; listeners that captured a
    /// context would otherwise keep the app state alive.
    pub(crate) fn clear(&self) {
        let hooks = std::mem::take(&mut *self.hooks.write());
        drop(hooks);
    }
}

/// A non-owning registry handle, held by self-removing listeners.
#[derive(Debug, Clone)]
pub struct WeakRegistry {
    hooks: Weak<RwLock<HookMap>>,
}

impl WeakRegistry {
    /// Removes the registration if the registry is still alive.
    pub fn remove(&self, subscription: &Subscription) -> bool {
        self.hooks
            .upgrade()
            .is_some_and(|hooks| remove_from(&hooks, subscription))
    }
}

fn remove_from(hooks: &RwLock<HookMap>, subscription: &Subscription) -> bool {
    let mut hooks = hooks.write();
    let Some(entries) = hooks.get_mut(&subscription.event) else {
        return false;
    };
    let before = entries.len();
    entries.retain(|entry| {
        !(entry.context == subscription.context && entry.id == subscription.listener)
    });
    before != entries.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Listener {
        Listener::sync(|_| Ok(None))
    }

    #[test]
    fn test_append_prepend_order() {
        let registry = HookRegistry::new();
        let scope = Arc::new(Scope::everyone());
        let a = registry.append("e", 1, Arc::clone(&scope), noop());
        let b = registry.prepend("e", 1, Arc::clone(&scope), noop());
        let c = registry.append("e", 1, scope, noop());

        let ids: Vec<_> = registry.snapshot("e").iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![b.listener, a.listener, c.listener]);
        assert_eq!(registry.len("e"), 3);
        assert_eq!(registry.len("other"), 0);
    }

    #[test]
    fn test_remove_requires_matching_context() {
        let registry = HookRegistry::new();
        let sub = registry.append("e", 7, Arc::new(Scope::everyone()), noop());

        let forged = Subscription {
            context: 8,
            ..sub.clone()
        };
        assert!(!registry.remove(&forged));
        assert!(registry.remove(&sub));
        assert!(!registry.remove(&sub));
        assert!(registry.is_empty());
        assert_eq!(registry.event_names(), vec!["e".to_string()]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry = HookRegistry::new();
        let scope = Arc::new(Scope::everyone());
        registry.append("e", 1, Arc::clone(&scope), noop());

        let snapshot = registry.snapshot("e");
        registry.append("e", 1, scope, noop());
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len("e"), 2);
    }

    #[test]
    fn test_weak_registry_outlived() {
        let registry = HookRegistry::new();
        let sub = registry.append("e", 1, Arc::new(Scope::everyone()), noop());
        let weak = registry.downgrade();
        drop(registry);
        assert!(!weak.remove(&sub));
    }
}
