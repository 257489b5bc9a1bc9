//! State broadcast plumbing
//!
//! Every module (and the manager) owns a [`ListenerSet`]. Broadcasting takes a
//! snapshot of the subscribers and releases the lock before calling them, so a
//! listener may subscribe or unsubscribe (itself included) while being
//! notified. Subscribers removed mid-broadcast still receive the event that
//! was already in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::trace;

use crate::module::lifecycle::Module;
use crate::module::traits::{ModuleListener, ModuleState};
use crate::utils::lock::lock;

/// Handle returned by [`ListenerSet::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Subscriber collection with snapshot-then-iterate delivery
pub struct ListenerSet {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn ModuleListener>)>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Add a subscriber; delivery order is subscription order
    pub fn subscribe(&self, listener: Arc<dyn ModuleListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.listeners).push((id, listener));
        id
    }

    /// Remove a subscriber, returns false if it was not subscribed
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        lock(&self.listeners).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver a state change to every current subscriber, synchronously
    pub fn broadcast(&self, module: &Arc<Module>, state: ModuleState) {
        let snapshot: Vec<Arc<dyn ModuleListener>> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        trace!("Broadcasting {} -> {} to {} listeners", module, state, snapshot.len());
        for listener in snapshot {
            listener.state_changed(module, state);
        }
    }
}

impl Default for ListenerSet {
    fn default() -> Self {
        Self::new()
    }
}
