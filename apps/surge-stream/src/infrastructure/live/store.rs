//! Tick State Store
//!
//! Shared owner of a [`TickSubscription`]. Every mutation goes through
//! [`TickStateStore::apply`], which publishes the resulting snapshot on a
//! `watch` channel when it differs from the last one. Publishing happens
//! under the lock, so observers see snapshots in mutation order.

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::domain::ticks::{Generation, TickSnapshot, TickSubscription};

/// Subscription state plus its reactive view.
#[derive(Debug)]
pub struct TickStateStore {
    subscription: Mutex<TickSubscription>,
    snapshots: watch::Sender<TickSnapshot>,
}

impl Default for TickStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TickStateStore {
    /// Create a store holding an idle subscription.
    #[must_use]
    pub fn new() -> Self {
        let (snapshots, _) = watch::channel(TickSnapshot::default());
        Self {
            subscription: Mutex::new(TickSubscription::new()),
            snapshots,
        }
    }

    /// Mutate the subscription and publish the new snapshot if it changed.
    pub fn apply<T>(&self, f: impl FnOnce(&mut TickSubscription) -> T) -> T {
        let mut subscription = self.subscription.lock();
        let out = f(&mut subscription);

        let next = subscription.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });

        out
    }

    /// Whether `generation` still owns the subscription.
    #[must_use]
    pub fn is_current(&self, generation: Generation) -> bool {
        self.subscription.lock().is_current(generation)
    }

    /// Currently subscribed symbol.
    #[must_use]
    pub fn identifier(&self) -> Option<String> {
        self.subscription.lock().identifier().map(str::to_owned)
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> TickSnapshot {
        self.snapshots.borrow().clone()
    }

    /// New receiver for snapshot changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<TickSnapshot> {
        self.snapshots.subscribe()
    }
}
