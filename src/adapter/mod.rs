//! Store adapter contract.
//!
//! The monitor never owns the observed state. It only needs three
//! capabilities from a store:
//! - read the current snapshot
//! - subscribe to transitions, receiving the new and previous snapshot
//! - optionally tear the store down
//!
//! Any container that can provide these can be observed. [`ObservableStore`]
//! is a small in-memory implementation used by applications that have no
//! state container of their own, and by the test suite.
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(ObservableStore::new(json!({"count": 0})));
//! monitor.register("counter", Arc::clone(&store))?;
//!
//! store.set_state(json!({"count": 1}));
//! ```

mod observable;

pub use observable::ObservableStore;

use crate::types::Snapshot;
use std::fmt;
use std::sync::Arc;

/// Callback invoked by a store after each transition with `(new, old)`.
pub type ChangeCallback = Arc<dyn Fn(&Snapshot, &Snapshot) + Send + Sync>;

/// Handle returned by [`StoreAdapter::subscribe`].
///
/// Consumed by [`Unsubscribe::call`], so it can run at most once.
pub struct Unsubscribe(Box<dyn FnOnce() + Send + Sync>);

impl Unsubscribe {
    pub fn new(f: impl FnOnce() + Send + Sync + 'static) -> Self {
        Unsubscribe(Box::new(f))
    }

    /// A handle that does nothing, for stores without teardown.
    pub fn noop() -> Self {
        Unsubscribe(Box::new(|| {}))
    }

    /// Detach the subscription.
    pub fn call(self) {
        (self.0)()
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Unsubscribe")
    }
}

/// Minimal capability interface the monitor requires from a store.
///
/// Stores must tolerate multiple subscribers and must invoke callbacks
/// synchronously, in mutation order.
pub trait StoreAdapter: Send + Sync {
    /// Current snapshot, read live.
    fn get_state(&self) -> Snapshot;

    /// Register a transition callback.
    fn subscribe(&self, callback: ChangeCallback) -> Unsubscribe;

    /// Tear the store down. The monitor never calls this itself.
    fn destroy(&self) {}
}

impl<T: StoreAdapter + ?Sized> StoreAdapter for Arc<T> {
    fn get_state(&self) -> Snapshot {
        (**self).get_state()
    }

    fn subscribe(&self, callback: ChangeCallback) -> Unsubscribe {
        (**self).subscribe(callback)
    }

    fn destroy(&self) {
        (**self).destroy()
    }
}
