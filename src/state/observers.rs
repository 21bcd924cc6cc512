//! Registry of snapshot observers.
//!
//! Listeners are keyed by subscription id so that removing one is O(1).
//! Notification iterates over a copy of the registered callbacks, so a
//! listener may unsubscribe itself (or others) while being notified.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering::SeqCst},
    },
};

use parking_lot::RwLock;

use crate::state::player_state::PlayerState;

/// Callback receiving every snapshot.
pub type Listener = Arc<dyn Fn(&PlayerState) + Send + Sync>;

#[derive(Default)]
struct RegistryInner {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<u64, Listener>>,
}

/// Observer registry shared by the controller.
///
/// Listeners are invoked in no particular order.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<RegistryInner>,
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

impl ListenerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` and returns the handle that removes it.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&PlayerState) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, SeqCst);
        self.inner.listeners.write().insert(id, Arc::new(listener));
        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Calls every registered listener with `state`.
    pub fn notify(&self, state: &PlayerState) {
        let listeners: Vec<Listener> = self.inner.listeners.read().values().cloned().collect();
        for listener in listeners {
            listener(state);
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.listeners.read().len()
    }

    /// Whether no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every listener.
    pub fn clear(&self) {
        self.inner.listeners.write().clear();
    }
}

/// Capability to deregister one listener.
///
/// Dropping a `Subscription` keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u64,
    registry: Weak<RegistryInner>,
}

impl Subscription {
    /// Removes the listener. Calling it again is a no-op.
    ///
    /// # Returns
    ///
    /// `true` if the listener was still registered.
    pub fn unsubscribe(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|inner| inner.listeners.write().remove(&self.id).is_some())
    }
}
