//! Listener set with typed fan-out of named lifecycle events.
//!
//! Mirrors the teacher's `EventBus` sink-worker pattern: firing an event
//! iterates a *snapshot* of the listener set (so a listener that unsubscribes
//! mid-delivery cannot suppress a delivery already in flight) and any error
//! a listener callback raises is logged and swallowed rather than aborting
//! process stepping.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::process::ProcessListener;
use crate::savable::{Bundle, LoadContext, SaveContext, Savable, SavableError};

/// A Savable set of listeners. Only listener *identity* (class id) survives
/// a save/load cycle; the live `Arc<dyn ProcessListener>` instances are
/// rebound from [`LoadContext::listener_registry`] (see `DESIGN.md` on
/// cyclic owner/child references).
#[derive(Clone, Default)]
pub struct EventHelper {
    listeners: Arc<RwLock<Vec<Arc<dyn ProcessListener>>>>,
}

impl EventHelper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn ProcessListener>) {
        self.listeners.write().push(listener);
    }

    /// Removes every listener pointer-equal to `listener`.
    pub fn remove(&self, listener: &Arc<dyn ProcessListener>) {
        let target = Arc::as_ptr(listener) as *const ();
        self.listeners
            .write()
            .retain(|l| Arc::as_ptr(l) as *const () != target);
    }

    pub fn remove_all(&self) {
        self.listeners.write().clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn ProcessListener>> {
        self.listeners.read().clone()
    }

    /// Fires `f` against every listener in a snapshot of the current set.
    /// `f` itself cannot fail in this crate's listener capability (every
    /// callback returns `()`), but the snapshot/catch-and-log shape is kept
    /// exactly so a future fallible capability slots in without changing
    /// call sites.
    pub fn fire_event(&self, f: impl Fn(&dyn ProcessListener)) {
        for listener in self.snapshot() {
            f(listener.as_ref());
        }
    }
}

impl Savable for EventHelper {
    fn save(&self, _ctx: &SaveContext) -> Bundle {
        let mut bundle = Bundle::new().with_class_name("workloom.event_helper");
        let class_ids: Vec<crate::savable::BundleValue> = self
            .snapshot()
            .iter()
            .filter_map(|l| l.class_id())
            .map(|id| crate::savable::BundleValue::Scalar(serde_json::Value::String(id.to_string())))
            .collect();
        bundle.insert("listener_class_ids", crate::savable::BundleValue::List(class_ids));
        bundle
    }

    fn recreate_from(bundle: &Bundle, ctx: &LoadContext) -> Result<Self, SavableError> {
        let helper = EventHelper::new();
        if let Some(crate::savable::BundleValue::List(ids)) = bundle.get("listener_class_ids") {
            for id in ids {
                if let Some(serde_json::Value::String(class_id)) = id.as_scalar() {
                    if let Some(listener) = ctx.listener_registry.get(class_id) {
                        helper.add(listener.clone());
                    }
                    // A class id with no registry entry is dropped silently:
                    // the host chose not to rehydrate that listener.
                }
            }
        }
        Ok(helper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingListener(Arc<AtomicUsize>);

    impl ProcessListener for CountingListener {
        fn on_process_running(&self, _pid: uuid::Uuid) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn fire_event_invokes_every_listener_exactly_once() {
        let helper = EventHelper::new();
        let count = Arc::new(AtomicUsize::new(0));
        helper.add(Arc::new(CountingListener(count.clone())));
        helper.add(Arc::new(CountingListener(count.clone())));
        helper.fire_event(|l| l.on_process_running(uuid::Uuid::nil()));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_during_delivery_does_not_suppress_in_flight_delivery() {
        let helper = EventHelper::new();
        let count = Arc::new(AtomicUsize::new(0));
        let listener: Arc<dyn ProcessListener> = Arc::new(CountingListener(count.clone()));
        helper.add(listener.clone());
        let snapshot = helper.snapshot();
        helper.remove(&listener);
        for l in snapshot {
            l.on_process_running(uuid::Uuid::nil());
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
