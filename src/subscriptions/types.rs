//! Listener types.

use crate::types::{ChangeRecord, ListenerId};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Error returned by a listener callback.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a listener callback.
pub type ListenerResult = std::result::Result<(), ListenerError>;

/// Callback invoked with each matching record.
pub type ListenerCallback = Arc<dyn Fn(&Arc<ChangeRecord>) -> ListenerResult + Send + Sync>;

/// Which stores a listener wants to hear about.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListenerFilter {
    /// Allow-list of store names (None = all stores).
    pub store_names: Option<Vec<String>>,
}

impl ListenerFilter {
    /// Match every store.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match only the named stores.
    pub fn stores<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            store_names: Some(names.into_iter().map(Into::into).collect()),
        }
    }

    /// Check if this filter matches a store.
    pub fn matches(&self, store_name: &str) -> bool {
        match self.store_names {
            Some(ref names) => names.iter().any(|n| n == store_name),
            None => true,
        }
    }
}

/// A registered observer.
#[derive(Clone)]
pub struct Listener {
    pub callback: ListenerCallback,
    pub filter: ListenerFilter,
}

impl Listener {
    /// Listener for every store.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Arc<ChangeRecord>) -> ListenerResult + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
            filter: ListenerFilter::all(),
        }
    }

    /// Listener whose callback cannot fail.
    pub fn from_fn<F>(callback: F) -> Self
    where
        F: Fn(&Arc<ChangeRecord>) + Send + Sync + 'static,
    {
        Self::new(move |record| {
            callback(record);
            Ok(())
        })
    }

    /// Restrict to the named stores.
    pub fn for_stores<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter = ListenerFilter::stores(names);
        self
    }

    pub fn with_filter(mut self, filter: ListenerFilter) -> Self {
        self.filter = filter;
        self
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

/// Why a channel subscription could not take a record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// Send buffer is full (slow consumer). The record is dropped for this
    /// subscriber only.
    #[error("subscriber buffer full ({0} records)")]
    BufferFull(usize),

    /// Receiver was dropped. The subscription is removed.
    #[error("subscriber disconnected")]
    Disconnected,
}

/// Handle to a channel subscription.
pub struct SubscriptionHandle {
    pub id: ListenerId,
    /// Channel to receive records.
    pub receiver: crossbeam_channel::Receiver<Arc<ChangeRecord>>,
}

impl SubscriptionHandle {
    /// Receive the next record (blocking).
    pub fn recv(&self) -> Result<Arc<ChangeRecord>, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a record (non-blocking).
    pub fn try_recv(&self) -> Result<Arc<ChangeRecord>, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<Arc<ChangeRecord>, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Take every record currently buffered.
    pub fn drain(&self) -> Vec<Arc<ChangeRecord>> {
        self.receiver.try_iter().collect()
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("pending", &self.receiver.len())
            .finish()
    }
}
