use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use duet_models::MemoryEvent;
use tracing::{debug, error, warn};

/// Handler invoked after a save. Identity is the `Arc` allocation, so keep
/// the handle around to unregister it later.
pub type MemoryCallback = Arc<dyn Fn(&MemoryEvent) -> anyhow::Result<()> + Send + Sync>;

/// Wrap a closure as a [`MemoryCallback`].
pub fn callback<F>(f: F) -> MemoryCallback
where
    F: Fn(&MemoryEvent) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Event name to ordered handler list.
#[derive(Default)]
pub struct CallbackRegistry {
    handlers: Mutex<HashMap<String, Vec<MemoryCallback>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if this exact handle is already registered for `event`.
    pub fn register(&self, event: &str, handler: MemoryCallback) -> bool {
        let mut handlers = match self.handlers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let list = handlers.entry(event.to_string()).or_default();
        if list.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            return false;
        }
        list.push(handler);
        debug!(event, count = list.len(), "Callback registered");
        true
    }

    /// Returns false if the handle was not registered for `event`.
    pub fn unregister(&self, event: &str, handler: &MemoryCallback) -> bool {
        let mut handlers = match self.handlers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(list) = handlers.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|h| !Arc::ptr_eq(h, handler));
        let removed = list.len() < before;
        if list.is_empty() {
            handlers.remove(event);
        }
        removed
    }

    pub fn count(&self, event: &str) -> usize {
        match self.handlers.lock() {
            Ok(handlers) => handlers.get(event).map_or(0, Vec::len),
            Err(poisoned) => poisoned.into_inner().get(event).map_or(0, Vec::len),
        }
    }

    /// Call every handler for the event's name in registration order.
    ///
    /// The registry lock is released first so a handler may call back into
    /// the coordinator (including registering more handlers). Errors and
    /// panics are logged and do not stop the remaining handlers.
    pub fn dispatch(&self, event: &MemoryEvent) {
        let handlers: Vec<MemoryCallback> = match self.handlers.lock() {
            Ok(handlers) => handlers.get(event.name()).cloned().unwrap_or_default(),
            Err(poisoned) => poisoned
                .into_inner()
                .get(event.name())
                .cloned()
                .unwrap_or_default(),
        };

        for handler in handlers {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(event = event.name(), error = %format!("{e:#}"), "Callback failed");
                }
                Err(_) => {
                    error!(event = event.name(), "Callback panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_models::Framework;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn state_event() -> MemoryEvent {
        MemoryEvent::SystemStateUpdated {
            component: "strategy".into(),
            source: Framework::Trading,
        }
    }

    fn counter() -> (Arc<AtomicUsize>, MemoryCallback) {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let cb = callback(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (hits, cb)
    }

    #[test]
    fn register_is_idempotent() {
        let registry = CallbackRegistry::new();
        let (hits, cb) = counter();
        assert!(registry.register(MemoryEvent::SYSTEM_STATE_UPDATED, Arc::clone(&cb)));
        assert!(!registry.register(MemoryEvent::SYSTEM_STATE_UPDATED, Arc::clone(&cb)));
        assert_eq!(registry.count(MemoryEvent::SYSTEM_STATE_UPDATED), 1);

        registry.dispatch(&state_event());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregister_unknown_is_noop() {
        let registry = CallbackRegistry::new();
        let (_, cb) = counter();
        assert!(!registry.unregister(MemoryEvent::SYSTEM_STATE_UPDATED, &cb));

        registry.register(MemoryEvent::SYSTEM_STATE_UPDATED, Arc::clone(&cb));
        assert!(registry.unregister(MemoryEvent::SYSTEM_STATE_UPDATED, &cb));
        assert!(!registry.unregister(MemoryEvent::SYSTEM_STATE_UPDATED, &cb));
        assert_eq!(registry.count(MemoryEvent::SYSTEM_STATE_UPDATED), 0);
    }

    #[test]
    fn only_matching_event_fires() {
        let registry = CallbackRegistry::new();
        let (hits, cb) = counter();
        registry.register(MemoryEvent::MARKET_DATA_SAVED, cb);
        registry.dispatch(&state_event());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failing_and_panicking_handlers_do_not_stop_siblings() {
        let registry = CallbackRegistry::new();
        let (hits, cb) = counter();
        registry.register(
            MemoryEvent::SYSTEM_STATE_UPDATED,
            callback(|_| anyhow::bail!("boom")),
        );
        registry.register(
            MemoryEvent::SYSTEM_STATE_UPDATED,
            callback(|_| panic!("handler panic")),
        );
        registry.register(MemoryEvent::SYSTEM_STATE_UPDATED, cb);

        registry.dispatch(&state_event());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_may_reenter_registry() {
        let registry = Arc::new(CallbackRegistry::new());
        let inner = Arc::clone(&registry);
        registry.register(
            MemoryEvent::SYSTEM_STATE_UPDATED,
            callback(move |_| {
                inner.register(MemoryEvent::MARKET_DATA_SAVED, callback(|_| Ok(())));
                Ok(())
            }),
        );
        registry.dispatch(&state_event());
        assert_eq!(registry.count(MemoryEvent::MARKET_DATA_SAVED), 1);
    }
}
