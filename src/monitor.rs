//! The state monitor: registry, recorder, pause gate and query surface.

use crate::adapter::{ChangeCallback, StoreAdapter};
use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::registry::{Registry, StoreEntry};
use crate::state::compute_diff;
use crate::subscriptions::{Listener, ListenerBus, ListenerFilter, SubscriptionHandle};
use crate::types::{ChangeRecord, ListenerId, MonitorStats, Snapshot, Timestamp};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, info, warn};

/// Outcome of a registration that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registration {
    /// The store is now observed.
    Registered,
    /// The monitor is disabled; nothing happened.
    Disabled,
    /// The name is not on the configured allow-list; nothing happened.
    Filtered,
}

static GLOBAL: OnceLock<StateMonitor> = OnceLock::new();

/// Observes registered stores, keeps a bounded history of their changes
/// and fans each change out to listeners.
///
/// `StateMonitor` is a handle: clones share one engine. All operations are
/// synchronous and run on the caller's thread; a store mutation is recorded
/// and delivered before the store's own update call returns. No lock is held
/// while calling into adapters or listeners, so both may call back into the
/// monitor.
#[derive(Clone)]
pub struct StateMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    config: MonitorConfig,
    registry: RwLock<Registry>,
    listeners: ListenerBus,
    paused: AtomicBool,
    next_generation: AtomicU64,
    next_sequence: AtomicU64,
}

impl StateMonitor {
    /// Create an isolated monitor.
    pub fn new(config: MonitorConfig) -> Self {
        if config.debug_mode {
            debug!(?config, "Initialized state monitor");
        }

        let listeners = ListenerBus::new(config.debug_mode);
        Self {
            inner: Arc::new(MonitorInner {
                config,
                registry: RwLock::new(Registry::new()),
                listeners,
                paused: AtomicBool::new(false),
                next_generation: AtomicU64::new(1),
                next_sequence: AtomicU64::new(1),
            }),
        }
    }

    /// The process-wide monitor.
    ///
    /// Created with `config` on first call and alive until the process
    /// exits. Later calls return the same instance and ignore `config`.
    pub fn global(config: MonitorConfig) -> StateMonitor {
        let mut created = false;
        let monitor = GLOBAL.get_or_init(|| {
            created = true;
            StateMonitor::new(config.clone())
        });
        if !created && config.debug_mode {
            debug!("Global state monitor already initialized; ignoring config");
        }
        monitor.clone()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    /// Whether auto-registration helpers should act on this monitor.
    pub fn auto_register_enabled(&self) -> bool {
        self.inner.config.auto_register
    }

    // --- Registry ---

    /// Start observing `adapter` under `name`.
    ///
    /// Captures the initial snapshot and subscribes to the adapter. A
    /// disabled monitor or a name outside the allow-list is not an error.
    /// Registering a taken name leaves the existing store in place and
    /// returns [`MonitorError::AlreadyRegistered`].
    pub fn register<A>(&self, name: &str, adapter: A) -> Result<Registration>
    where
        A: StoreAdapter + 'static,
    {
        self.register_entry(name, Arc::new(adapter))
            .map(|(registration, _)| registration)
    }

    /// Like [`register`](Self::register), but unregisters the store when the
    /// returned guard is dropped.
    pub fn register_scoped<A>(&self, name: &str, adapter: A) -> Result<Option<RegistrationGuard>>
    where
        A: StoreAdapter + 'static,
    {
        let (registration, generation) = self.register_entry(name, Arc::new(adapter))?;
        Ok(match registration {
            Registration::Registered => Some(RegistrationGuard {
                monitor: Arc::downgrade(&self.inner),
                name: name.to_string(),
                generation,
            }),
            Registration::Disabled | Registration::Filtered => None,
        })
    }

    fn register_entry(
        &self,
        name: &str,
        adapter: Arc<dyn StoreAdapter>,
    ) -> Result<(Registration, u64)> {
        let config = &self.inner.config;

        if !config.enabled {
            return Ok((Registration::Disabled, 0));
        }

        if self.inner.registry.read().contains(name) {
            warn!(store = name, "Store is already registered");
            return Err(MonitorError::AlreadyRegistered(name.to_string()));
        }

        if !config.filters.allows(name) {
            if config.debug_mode {
                debug!(store = name, "Store filtered out");
            }
            return Ok((Registration::Filtered, 0));
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let initial = adapter.get_state();

        let monitor = Arc::downgrade(&self.inner);
        let store_name = name.to_string();
        let callback: ChangeCallback = Arc::new(move |new_state: &Snapshot, old_state: &Snapshot| {
            if let Some(monitor) = monitor.upgrade() {
                monitor.record(&store_name, generation, new_state, old_state);
            }
        });
        let unsubscribe = adapter.subscribe(callback);

        let entry = StoreEntry::new(
            name.to_string(),
            generation,
            adapter,
            unsubscribe,
            initial,
            config.max_history_size,
        );

        // Another thread may have claimed the name while we subscribed.
        let rejected = self.inner.registry.write().insert(entry).err();
        if let Some(mut entry) = rejected {
            entry.detach();
            warn!(store = name, "Store is already registered");
            return Err(MonitorError::AlreadyRegistered(name.to_string()));
        }

        if config.debug_mode {
            debug!(store = name, "Registered store");
        }
        Ok((Registration::Registered, generation))
    }

    /// Stop observing `name`. Its history is discarded.
    pub fn unregister(&self, name: &str) -> Result<()> {
        self.inner.unregister(name, None)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.inner.registry.read().contains(name)
    }

    /// Registered store names in registration order.
    pub fn registered_stores(&self) -> Vec<String> {
        self.inner.registry.read().names()
    }

    // --- Listener Bus ---

    /// Register a listener and return its ID.
    pub fn add_listener(&self, listener: Listener) -> ListenerId {
        self.inner.listeners.add(listener)
    }

    /// Remove a listener. Unknown IDs are a no-op.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    /// Buffer matching records in a channel for polling consumers.
    pub fn subscribe(&self, filter: ListenerFilter, buffer_size: usize) -> SubscriptionHandle {
        self.inner.listeners.subscribe(filter, buffer_size)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    // --- Pause Gate ---

    /// Stop recording and notifying. Stores keep working; changes made while
    /// paused are never recorded.
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
        if self.inner.config.debug_mode {
            debug!("Paused");
        }
    }

    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::SeqCst);
        if self.inner.config.debug_mode {
            debug!("Resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    // --- Query Surface ---

    /// Live state of `name`, read from the store itself.
    pub fn get_state(&self, name: &str) -> Option<Snapshot> {
        let adapter = self.adapter(name)?;
        Some(adapter.get_state())
    }

    /// Live state of every registered store, each read once.
    pub fn get_all_states(&self) -> BTreeMap<String, Snapshot> {
        let adapters: Vec<(String, Arc<dyn StoreAdapter>)> = self
            .inner
            .registry
            .read()
            .iter()
            .map(|entry| (entry.name.clone(), Arc::clone(&entry.adapter)))
            .collect();

        adapters
            .into_iter()
            .map(|(name, adapter)| (name, adapter.get_state()))
            .collect()
    }

    /// State as of registration or the last recorded change.
    ///
    /// Unlike [`get_state`](Self::get_state) this lags behind the store
    /// while the monitor is paused.
    pub fn last_recorded_state(&self, name: &str) -> Option<Snapshot> {
        self.inner.registry.read().get(name).map(|e| e.cached.clone())
    }

    /// History of one store, oldest first, or of every store merged by
    /// timestamp. Ties are broken by arrival order at the recorder.
    pub fn get_history(&self, name: Option<&str>) -> Vec<Arc<ChangeRecord>> {
        let registry = self.inner.registry.read();

        match name {
            Some(name) => match registry.get(name) {
                Some(entry) => entry.history.to_vec(),
                None => {
                    if self.inner.config.debug_mode {
                        debug!(store = name, "History requested for unknown store");
                    }
                    Vec::new()
                }
            },
            None => {
                let mut merged: Vec<Arc<ChangeRecord>> = registry
                    .iter()
                    .flat_map(|entry| entry.history.iter().cloned())
                    .collect();
                drop(registry);

                merged.sort_by_key(|record| (record.timestamp, record.sequence));
                merged
            }
        }
    }

    /// JSON rendering of [`get_history`](Self::get_history) for display.
    pub fn history_json(&self, name: Option<&str>) -> Result<String> {
        let history = self.get_history(name);
        let records: Vec<&ChangeRecord> = history.iter().map(|record| &**record).collect();
        Ok(serde_json::to_string_pretty(&records)?)
    }

    /// Empty the history of one store, or of all stores. Live and cached
    /// state are untouched.
    pub fn clear_history(&self, name: Option<&str>) -> Result<()> {
        {
            let mut registry = self.inner.registry.write();
            match name {
                Some(name) => match registry.get_mut(name) {
                    Some(entry) => entry.history.clear(),
                    None => {
                        if self.inner.config.debug_mode {
                            debug!(store = name, "Cannot clear history of unknown store");
                        }
                        return Err(MonitorError::StoreNotRegistered(name.to_string()));
                    }
                },
                None => {
                    for entry in registry.iter_mut() {
                        entry.history.clear();
                    }
                }
            }
        }

        if self.inner.config.debug_mode {
            debug!(store = name.unwrap_or("all stores"), "Cleared history");
        }
        Ok(())
    }

    pub fn stats(&self) -> MonitorStats {
        let registry = self.inner.registry.read();
        MonitorStats {
            registered_stores: registry.len(),
            listeners: self.inner.listeners.listener_count(),
            history_records: registry.iter().map(|e| e.history.len()).sum(),
            paused: self.is_paused(),
        }
    }

    // --- Teardown ---

    /// Unsubscribe from every store and drop all stores and listeners.
    ///
    /// The monitor stays usable; new registrations start from scratch.
    pub fn destroy(&self) {
        self.inner.detach_all();
        self.inner.listeners.clear();

        if self.inner.config.debug_mode {
            debug!("Destroyed");
        }
    }

    fn adapter(&self, name: &str) -> Option<Arc<dyn StoreAdapter>> {
        self.inner
            .registry
            .read()
            .get(name)
            .map(|entry| Arc::clone(&entry.adapter))
    }
}

impl Default for StateMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

impl MonitorInner {
    /// Recorder: runs inside the store's notification path.
    fn record(&self, name: &str, generation: u64, new_state: &Snapshot, old_state: &Snapshot) {
        if self.paused.load(Ordering::SeqCst) {
            return;
        }

        let diff = compute_diff(old_state, new_state);

        let record = {
            let mut registry = self.registry.write();
            let entry = match registry.get_mut(name) {
                Some(entry) if entry.generation == generation => entry,
                _ => return,
            };

            let record = Arc::new(ChangeRecord {
                sequence: self.next_sequence.fetch_add(1, Ordering::SeqCst),
                store_name: name.to_string(),
                old_state: old_state.clone(),
                new_state: new_state.clone(),
                timestamp: Timestamp::now(),
                diff,
            });

            entry.history.push(Arc::clone(&record));
            entry.cached = new_state.clone();
            record
        };

        self.listeners.notify(&record);

        if self.config.log_changes {
            info!(
                store = name,
                sequence = record.sequence,
                diff = %record.diff.value(),
                "State changed"
            );
        }
    }

    /// Remove `name`, optionally only if it is still the given registration.
    fn unregister(&self, name: &str, generation: Option<u64>) -> Result<()> {
        let removed = {
            let mut registry = self.registry.write();
            let current = registry
                .get(name)
                .map_or(false, |entry| generation.map_or(true, |g| g == entry.generation));
            if current {
                registry.remove(name)
            } else {
                None
            }
        };

        match removed {
            Some(mut entry) => {
                entry.detach();
                if self.config.debug_mode {
                    debug!(store = name, "Unregistered store");
                }
                Ok(())
            }
            None => {
                if generation.is_none() {
                    warn!(store = name, "Store is not registered");
                }
                Err(MonitorError::StoreNotRegistered(name.to_string()))
            }
        }
    }

    fn detach_all(&self) {
        let entries = self.registry.write().drain();
        for mut entry in entries {
            entry.detach();
        }
    }
}

impl Drop for MonitorInner {
    fn drop(&mut self) {
        for entry in self.registry.get_mut().drain().iter_mut() {
            entry.detach();
        }
    }
}

/// Keeps a store registered for as long as it is alive.
///
/// Dropping the guard unregisters the store, unless it was already
/// unregistered or replaced by a later registration under the same name.
#[derive(Debug)]
pub struct RegistrationGuard {
    monitor: Weak<MonitorInner>,
    name: String,
    generation: u64,
}

impl RegistrationGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor.upgrade() {
            let _ = monitor.unregister(&self.name, Some(self.generation));
        }
    }
}
