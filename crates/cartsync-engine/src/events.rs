//! # Change Notifications
//!
//! Subscribers learn about new snapshots in one of two ways:
//!
//! - [`EngineListener`] callbacks registered with `SyncEngine::subscribe`,
//!   called synchronously for every published snapshot and every failed
//!   operation.
//! - A `tokio::sync::watch` receiver from `SyncEngine::watch`, which always
//!   holds the latest snapshot and may skip intermediate ones.
//!
//! Listeners run while the engine publishes, so they must return quickly
//! and must not block on engine operations.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use uuid::Uuid;

use crate::engine::EngineSnapshot;
use crate::error::EngineError;

/// Receives engine change and error notifications.
pub trait EngineListener: Send + Sync {
    /// Called after every publish with the new snapshot.
    fn on_change(&self, snapshot: &EngineSnapshot);

    /// Called when an operation fails, after state has been reconciled.
    fn on_error(&self, _operation: &str, _error: &EngineError) {}
}

/// Listener that ignores everything.
pub struct NoOpListener;

impl EngineListener for NoOpListener {
    fn on_change(&self, _snapshot: &EngineSnapshot) {}
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        SubscriptionId(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Entry = (SubscriptionId, Arc<dyn EngineListener>);

/// Registered listeners, in subscription order.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    listeners: Mutex<Vec<Entry>>,
}

impl ListenerRegistry {
    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn subscribe(&self, listener: Arc<dyn EngineListener>) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.entries().push((id, listener));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    // Listeners are called on a copy of the list so they can subscribe or
    // unsubscribe from inside a callback.
    fn snapshot(&self) -> Vec<Arc<dyn EngineListener>> {
        self.entries().iter().map(|(_, l)| l.clone()).collect()
    }

    pub(crate) fn notify_change(&self, snapshot: &EngineSnapshot) {
        for listener in self.snapshot() {
            listener.on_change(snapshot);
        }
    }

    pub(crate) fn notify_error(&self, operation: &str, error: &EngineError) {
        for listener in self.snapshot() {
            listener.on_error(operation, error);
        }
    }
}
