//! Listener bus for broadcasting change records.

use crate::types::{ChangeRecord, ListenerId};
use crossbeam_channel::{bounded, TrySendError};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

use super::types::{
    DeliveryError, Listener, ListenerCallback, ListenerFilter, SubscriptionHandle,
};

/// Manages listeners and fans out change records.
pub struct ListenerBus {
    /// Active listeners by ID. Ordered by ID, which is registration order.
    listeners: RwLock<BTreeMap<ListenerId, Listener>>,
    /// Counter for generating listener IDs.
    next_id: AtomicU64,
    /// Log add/remove at debug level.
    debug: bool,
}

impl ListenerBus {
    /// Create a new listener bus.
    pub fn new(debug: bool) -> Self {
        Self {
            listeners: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            debug,
        }
    }

    /// Register a listener and return its fresh ID.
    pub fn add(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners.write().insert(id, listener);

        if self.debug {
            debug!(listener = %id, "Added listener");
        }
        id
    }

    /// Remove a listener. Unknown IDs are a no-op.
    ///
    /// Returns whether a listener was removed.
    pub fn remove(&self, id: ListenerId) -> bool {
        let removed = self.listeners.write().remove(&id).is_some();

        if self.debug {
            if removed {
                debug!(listener = %id, "Removed listener");
            } else {
                debug!(listener = %id, "Failed to remove listener: unknown id");
            }
        }
        removed
    }

    /// Create a channel subscription buffering up to `buffer_size` records.
    pub fn subscribe(&self, filter: ListenerFilter, buffer_size: usize) -> SubscriptionHandle {
        let capacity = buffer_size.max(1);
        let (sender, receiver) = bounded(capacity);

        let listener = Listener::new(move |record| match sender.try_send(Arc::clone(record)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DeliveryError::BufferFull(capacity).into()),
            Err(TrySendError::Disconnected(_)) => Err(DeliveryError::Disconnected.into()),
        })
        .with_filter(filter);

        let id = self.add(listener);
        SubscriptionHandle { id, receiver }
    }

    /// Get listener count.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Drop every listener.
    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    /// Deliver a committed record to every matching listener.
    ///
    /// Callbacks run sequentially on the caller's thread with no bus lock
    /// held, so a callback may add or remove listeners. Returns the number
    /// of listeners that accepted the record.
    pub fn notify(&self, record: &Arc<ChangeRecord>) -> usize {
        let targets: Vec<(ListenerId, ListenerCallback)> = self
            .listeners
            .read()
            .iter()
            .filter(|(_, listener)| listener.filter.matches(&record.store_name))
            .map(|(id, listener)| (*id, Arc::clone(&listener.callback)))
            .collect();

        let mut delivered = 0;
        let mut disconnected = Vec::new();

        for (id, callback) in targets {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(record))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    if let Some(DeliveryError::Disconnected) = e.downcast_ref::<DeliveryError>() {
                        disconnected.push(id);
                    } else {
                        error!(
                            listener = %id,
                            store = %record.store_name,
                            error = %e,
                            "Error in listener callback"
                        );
                    }
                }
                Err(payload) => {
                    error!(
                        listener = %id,
                        store = %record.store_name,
                        panic = panic_message(payload.as_ref()),
                        "Listener callback panicked"
                    );
                }
            }
        }

        if !disconnected.is_empty() {
            let mut listeners = self.listeners.write();
            for id in disconnected {
                listeners.remove(&id);
                if self.debug {
                    debug!(listener = %id, "Dropped disconnected subscription");
                }
            }
        }

        delivered
    }
}

impl Default for ListenerBus {
    fn default() -> Self {
        Self::new(false)
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
