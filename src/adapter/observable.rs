//! In-memory observable store.

use super::{ChangeCallback, StoreAdapter, Unsubscribe};
use crate::types::Snapshot;
use parking_lot::{ReentrantMutex, RwLock};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type SubscriberList = RwLock<Vec<(u64, ChangeCallback)>>;

/// A mutable JSON state container with synchronous change notification.
///
/// Mutations on one store are serialized: subscribers see transitions in
/// exactly the order they were applied. A subscriber may mutate the same
/// store again from inside its callback on the same thread.
pub struct ObservableStore {
    state: RwLock<Snapshot>,
    subscribers: Arc<SubscriberList>,
    next_id: AtomicU64,
    /// Serializes swap + notify so notifications never interleave.
    write_lock: ReentrantMutex<()>,
}

impl ObservableStore {
    /// Create a store holding `initial`.
    pub fn new(initial: Value) -> Self {
        Self {
            state: RwLock::new(Snapshot::new(initial)),
            subscribers: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(1),
            write_lock: ReentrantMutex::new(()),
        }
    }

    /// Current state.
    pub fn state(&self) -> Snapshot {
        self.state.read().clone()
    }

    /// Shallow-merge `partial` into the current state.
    ///
    /// When both sides are objects the top-level keys of `partial` overwrite
    /// those of the current state; otherwise `partial` replaces it.
    pub fn set_state(&self, partial: Value) {
        self.update(move |current| match (current, partial) {
            (Value::Object(current), Value::Object(partial)) => {
                let mut merged = current.clone();
                merged.extend(partial);
                Value::Object(merged)
            }
            (_, partial) => partial,
        });
    }

    /// Replace the whole state.
    pub fn replace_state(&self, next: Value) {
        self.update(move |_| next);
    }

    /// Compute the next state from the current one and notify subscribers.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&Value) -> Value,
    {
        let _guard = self.write_lock.lock();

        let previous = self.state.read().clone();
        let next = Snapshot::new(f(previous.value()));
        *self.state.write() = next.clone();

        // Callbacks run without the subscriber lock held so they can
        // subscribe or unsubscribe re-entrantly.
        let callbacks: Vec<ChangeCallback> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(&next, &previous);
        }
    }

    /// Number of attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl StoreAdapter for ObservableStore {
    fn get_state(&self) -> Snapshot {
        self.state()
    }

    fn subscribe(&self, callback: ChangeCallback) -> Unsubscribe {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.write().push((id, callback));

        let subscribers: Weak<SubscriberList> = Arc::downgrade(&self.subscribers);
        Unsubscribe::new(move || {
            if let Some(subscribers) = subscribers.upgrade() {
                subscribers.write().retain(|(sub_id, _)| *sub_id != id);
            }
        })
    }

    fn destroy(&self) {
        self.subscribers.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[test]
    fn test_set_state_merges_objects() {
        let store = ObservableStore::new(json!({"count": 0, "label": "x"}));
        store.set_state(json!({"count": 1}));
        assert_eq!(*store.state(), json!({"count": 1, "label": "x"}));
    }

    #[test]
    fn test_set_state_replaces_scalars() {
        let store = ObservableStore::new(json!({"count": 0}));
        store.set_state(json!(5));
        assert_eq!(*store.state(), json!(5));
    }

    #[test]
    fn test_subscribe_receives_new_and_old() {
        let store = ObservableStore::new(json!({"count": 0}));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let _unsub = store.subscribe(Arc::new(move |new: &Snapshot, old: &Snapshot| {
            sink.lock().push((old.value().clone(), new.value().clone()));
        }));

        store.set_state(json!({"count": 1}));
        store.set_state(json!({"count": 2}));

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (json!({"count": 0}), json!({"count": 1})));
        assert_eq!(seen[1], (json!({"count": 1}), json!({"count": 2})));
    }

    #[test]
    fn test_unsubscribe_detaches() {
        let store = ObservableStore::new(json!(0));
        let unsub = store.subscribe(Arc::new(|_: &Snapshot, _: &Snapshot| {}));
        assert_eq!(store.subscriber_count(), 1);

        unsub.call();
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn test_unsubscribe_after_store_dropped() {
        let store = ObservableStore::new(json!(0));
        let unsub = store.subscribe(Arc::new(|_: &Snapshot, _: &Snapshot| {}));
        drop(store);
        unsub.call();
    }

    #[test]
    fn test_reentrant_mutation_from_subscriber() {
        let store = Arc::new(ObservableStore::new(json!({"count": 0})));
        let weak = Arc::downgrade(&store);

        let _unsub = store.subscribe(Arc::new(move |new: &Snapshot, _: &Snapshot| {
            if new["count"] == json!(1) {
                if let Some(store) = weak.upgrade() {
                    store.set_state(json!({"count": 2}));
                }
            }
        }));

        store.set_state(json!({"count": 1}));
        assert_eq!(*store.state(), json!({"count": 2}));
    }

    #[test]
    fn test_destroy_clears_subscribers() {
        let store = ObservableStore::new(json!(0));
        let _a = store.subscribe(Arc::new(|_: &Snapshot, _: &Snapshot| {}));
        let _b = store.subscribe(Arc::new(|_: &Snapshot, _: &Snapshot| {}));
        store.destroy();
        assert_eq!(store.subscriber_count(), 0);
    }
}
