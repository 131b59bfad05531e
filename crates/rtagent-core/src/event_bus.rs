//! A typed, name-keyed publish/subscribe bus used to fan out server and
//! connection-lifecycle events to application code.
//!
//! Unlike a JavaScript `EventEmitter`, Rust closures have no stable identity
//! to compare against for `off()`, so registration returns an opaque
//! [`ListenerId`] that is the only thing `off()` accepts.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;

/// A handle returned by [`EventBus::on`] / [`EventBus::once`], used to remove
/// that specific registration via [`EventBus::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Clone)]
struct Listener {
    id: ListenerId,
    handler: Handler,
    once: bool,
}

/// Name-keyed publish/subscribe bus with per-emit listener snapshots.
///
/// `emit` clones the current listener list for the given event name under a
/// short read lock, then releases the lock before invoking handlers. This
/// means a handler that calls `on`/`off` during dispatch only affects the
/// *next* `emit`, never the one currently in progress.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<String, usize> = self
            .listeners
            .read()
            .expect("event bus lock poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), v.len()))
            .collect();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers `handler` for every future `emit(name, ..)`. May be called
    /// more than once with the same name; each registration is delivered
    /// independently.
    pub fn on<F>(&self, name: impl Into<String>, handler: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.register(name.into(), Arc::new(handler), false)
    }

    /// Registers `handler` for exactly the next `emit(name, ..)`, then
    /// removes it automatically.
    pub fn once<F>(&self, name: impl Into<String>, handler: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.register(name.into(), Arc::new(handler), true)
    }

    fn register(&self, name: String, handler: Handler, once: bool) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .expect("event bus lock poisoned")
            .entry(name)
            .or_default()
            .push(Listener { id, handler, once });
        id
    }

    /// Removes the registration identified by `id`, regardless of its event
    /// name. No-op if the id is unknown (already fired as a `once`, or
    /// already removed).
    pub fn off(&self, id: ListenerId) {
        let mut guard = self.listeners.write().expect("event bus lock poisoned");
        for listeners in guard.values_mut() {
            listeners.retain(|l| l.id != id);
        }
    }

    /// Removes every listener registered under `name`.
    pub fn off_all(&self, name: &str) {
        self.listeners
            .write()
            .expect("event bus lock poisoned")
            .remove(name);
    }

    /// Invokes every listener registered for `name` with `payload`, in
    /// registration order, using a snapshot taken before dispatch starts.
    ///
    /// A listener that panics is caught and logged; it never prevents later
    /// listeners in the same `emit` from running.
    pub fn emit(&self, name: &str, payload: &Value) {
        let snapshot: Vec<Listener> = {
            let guard = self.listeners.read().expect("event bus lock poisoned");
            match guard.get(name) {
                Some(listeners) => listeners.clone(),
                None => return,
            }
        };

        let mut once_to_remove = Vec::new();
        for listener in &snapshot {
            let result = catch_unwind(AssertUnwindSafe(|| (listener.handler)(payload)));
            if let Err(panic) = result {
                tracing::error!(
                    event = name,
                    panic = %describe_panic(&panic),
                    "event bus listener panicked; continuing with remaining listeners"
                );
            }
            if listener.once {
                once_to_remove.push(listener.id);
            }
        }

        if !once_to_remove.is_empty() {
            let mut guard = self.listeners.write().expect("event bus lock poisoned");
            if let Some(listeners) = guard.get_mut(name) {
                listeners.retain(|l| !once_to_remove.contains(&l.id));
            }
        }
    }

    /// Number of listeners currently registered under `name`. Exposed for
    /// tests that assert no-leak behavior across repeated failed `connect()`s.
    #[must_use]
    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners
            .read()
            .expect("event bus lock poisoned")
            .get(name)
            .map_or(0, Vec::len)
    }

    /// Total listener count across all event names.
    #[must_use]
    pub fn total_listener_count(&self) -> usize {
        self.listeners
            .read()
            .expect("event bus lock poisoned")
            .values()
            .map(Vec::len)
            .sum()
    }
}

fn describe_panic(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
