//! Fan-out of settled auth states to UI modules.
//!
//! Each callback runs in isolation: a panic in one is caught and logged, and
//! the remaining subscribers are still notified. Callbacks are invoked outside
//! the registry lock, so they may subscribe or unsubscribe from within.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};
use workincz_core::SubscriberId;

use crate::session::AuthState;

/// A registered auth-state callback.
pub type Callback = Arc<dyn Fn(&AuthState) + Send + Sync>;

/// Registry of auth-state subscribers. Clones share the same registrations.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    subscribers: Arc<Mutex<Vec<(SubscriberId, Callback)>>>,
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.len())
            .finish()
    }
}

impl SubscriberRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback and returns its handle.
    ///
    /// The callback is not invoked here; see
    /// [`AuthService::subscribe`](crate::AuthService::subscribe) for the
    /// variant that replays the current state.
    pub fn subscribe<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&AuthState) + Send + Sync + 'static,
    {
        self.insert(Arc::new(callback))
    }

    pub(crate) fn insert(&self, callback: Callback) -> SubscriberId {
        let id = SubscriberId::new();
        self.lock().push((id, callback));
        tracing::debug!(subscriber = %id, "auth subscriber registered");
        id
    }

    /// Removes a callback. Returns `false` if the handle was unknown.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.lock();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        before != subscribers.len()
    }

    /// Invokes every callback with the given state.
    ///
    /// Returns the number of callbacks that completed without panicking.
    pub fn notify_all(&self, state: &AuthState) -> usize {
        let snapshot: Vec<(SubscriberId, Callback)> = self.lock().clone();
        snapshot
            .iter()
            .filter(|entry| invoke(entry.0, &entry.1, state))
            .count()
    }

    /// Returns the number of registered callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriberId, Callback)>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs a single callback, containing any panic. Returns true on success.
pub(crate) fn invoke(id: SubscriberId, callback: &Callback, state: &AuthState) -> bool {
    match catch_unwind(AssertUnwindSafe(|| callback(state))) {
        Ok(()) => true,
        Err(payload) => {
            tracing::error!(
                subscriber = %id,
                panic = panic_message(payload.as_ref()),
                "auth subscriber panicked; continuing fan-out"
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use workincz_core::Identity;

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&AuthState) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (count, move |_: &AuthState| {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn notify_reaches_every_subscriber() {
        let registry = SubscriberRegistry::new();
        let (a, cb_a) = counter();
        let (b, cb_b) = counter();
        registry.subscribe(cb_a);
        registry.subscribe(cb_b);

        let delivered = registry.notify_all(&AuthState::SignedOut);

        assert_eq!(delivered, 2);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_subscriber_does_not_block_others() {
        let registry = SubscriberRegistry::new();
        registry.subscribe(|_| panic!("dashboard widget exploded"));
        let (b, cb_b) = counter();
        registry.subscribe(cb_b);

        let state = AuthState::SignedIn(Session::new(Identity::new("uid_1"), None));
        let delivered = registry.notify_all(&state);

        assert_eq!(delivered, 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let registry = SubscriberRegistry::new();
        let (a, cb_a) = counter();
        let id = registry.subscribe(cb_a);

        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        registry.notify_all(&AuthState::SignedOut);

        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn callback_may_unsubscribe_itself() {
        let registry = SubscriberRegistry::new();
        let slot: Arc<Mutex<Option<SubscriberId>>> = Arc::new(Mutex::new(None));

        let inner_registry = registry.clone();
        let inner_slot = Arc::clone(&slot);
        let id = registry.subscribe(move |_| {
            if let Some(id) = *inner_slot.lock().expect("slot") {
                inner_registry.unsubscribe(id);
            }
        });
        *slot.lock().expect("slot") = Some(id);

        registry.notify_all(&AuthState::SignedOut);
        assert!(registry.is_empty());
    }
}
