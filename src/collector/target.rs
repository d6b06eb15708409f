//! The global event target signals are fired on.
//!
//! Hosts fire signals with [`EventTarget::dispatch_event`]; the agent
//! subscribes handlers by signal name. Handlers run synchronously on the
//! dispatching thread. A handler that panics is isolated so instrumentation
//! can never unwind into host code.

use crate::collector::types::Event;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

/// A signal handler.
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Identifies one registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Listeners {
    next_id: u64,
    by_name: HashMap<String, Vec<(ListenerId, Handler)>>,
}

/// Cloneable handle to a shared signal registry.
#[derive(Clone, Default)]
pub struct EventTarget {
    listeners: Arc<RwLock<Listeners>>,
}

impl EventTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for signals named `name`.
    pub fn add_event_listener<F>(&self, name: &str, handler: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        listeners.next_id += 1;
        let id = ListenerId(listeners.next_id);
        listeners
            .by_name
            .entry(name.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut removed = false;
        listeners.by_name.retain(|_, handlers| {
            let before = handlers.len();
            handlers.retain(|(existing, _)| *existing != id);
            removed |= handlers.len() != before;
            !handlers.is_empty()
        });
        removed
    }

    /// Fire `event` on every handler registered for its name.
    ///
    /// Returns the number of handlers that completed without panicking.
    pub fn dispatch_event(&self, event: &Event) -> usize {
        // Snapshot so handlers may (un)subscribe while running.
        let handlers: Vec<Handler> = {
            let listeners = self
                .listeners
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            listeners
                .by_name
                .get(event.name())
                .map(|handlers| handlers.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default()
        };

        let mut completed = 0;
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => completed += 1,
                Err(_) => {
                    tracing::warn!(signal = event.name(), "Signal handler panicked; dropped");
                }
            }
        }
        completed
    }

    /// Number of handlers registered for `name`.
    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .by_name
            .get(name)
            .map_or(0, Vec::len)
    }

    /// Whether both handles refer to the same registry.
    pub fn same_target(&self, other: &EventTarget) -> bool {
        Arc::ptr_eq(&self.listeners, &other.listeners)
    }
}

impl std::fmt::Debug for EventTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let total: usize = listeners.by_name.values().map(Vec::len).sum();
        f.debug_struct("EventTarget")
            .field("listeners", &total)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_dispatch_reaches_matching_listeners_only() {
        let target = EventTarget::new();
        let clicks = Arc::new(AtomicUsize::new(0));

        let c = clicks.clone();
        target.add_event_listener("click", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(target.dispatch_event(&Event::new("click")), 1);
        assert_eq!(target.dispatch_event(&Event::new("hashchange")), 0);
        assert_eq!(clicks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_listener() {
        let target = EventTarget::new();
        let id = target.add_event_listener("popstate", |_| {});
        assert_eq!(target.listener_count("popstate"), 1);

        assert!(target.remove_event_listener(id));
        assert!(!target.remove_event_listener(id));
        assert_eq!(target.listener_count("popstate"), 0);
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let target = EventTarget::new();
        let seen = Arc::new(AtomicUsize::new(0));

        target.add_event_listener("error", |_| panic!("handler failure"));
        let s = seen.clone();
        target.add_event_listener("error", move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(target.dispatch_event(&Event::error("boom")), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_can_subscribe_during_dispatch() {
        let target = EventTarget::new();
        let inner = target.clone();
        target.add_event_listener("click", move |_| {
            inner.add_event_listener("click", |_| {});
        });

        target.dispatch_event(&Event::new("click"));
        assert_eq!(target.listener_count("click"), 2);
    }

    #[test]
    fn test_same_target_follows_clones() {
        let target = EventTarget::new();
        assert!(target.same_target(&target.clone()));
        assert!(!target.same_target(&EventTarget::new()));
    }
}
