//! Opportunistic registration of stores at construction time.
//!
//! Instead of patching a store library, the application routes store
//! construction through a factory that registers each new store with a
//! monitor. There are three ways in:
//! - [`AutoRegister::wrap`] decorates a factory directly
//! - [`FactorySlot`] + [`AutoRegister::install`] intercept a factory the
//!   application publishes, possibly later than the monitor is set up
//! - [`with_auto_register`] / [`AutoRegister::register_existing`] for
//!   one-off stores
//!
//! Nothing here ever fails loudly: a store that cannot be registered is
//! logged and returned to the caller untouched.
//!
//! # Example
//!
//! ```ignore
//! let slot = Arc::new(FactorySlot::new("stores"));
//! let auto = AutoRegister::new(monitor.clone()).exclude(["scratch"]);
//! auto.install(Arc::clone(&slot));
//!
//! slot.publish(Arc::new(|initial| Arc::new(ObservableStore::new(initial))));
//! let store = slot.create(json!({"count": 0})); // registered as "store-1"
//! ```

use crate::adapter::StoreAdapter;
use crate::error::{MonitorError, Result};
use crate::monitor::{Registration, StateMonitor};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error};

/// Delay before the single retry of a failed interception.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Creates a store from an initializer.
pub type StoreFactory<I, S> = Arc<dyn Fn(I) -> Arc<S> + Send + Sync>;

/// Derives a registration name from a freshly created store.
pub type NameExtractor<S> = Arc<dyn Fn(&S) -> String + Send + Sync>;

/// A place where the application publishes its store factory.
pub struct FactorySlot<I, S> {
    name: String,
    factory: RwLock<Option<StoreFactory<I, S>>>,
    intercepted: AtomicBool,
}

impl<I, S> FactorySlot<I, S> {
    /// Create an empty slot.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            factory: RwLock::new(None),
            intercepted: AtomicBool::new(false),
        }
    }

    /// Create a slot that already holds a factory.
    pub fn with_factory(name: impl Into<String>, factory: StoreFactory<I, S>) -> Self {
        let slot = Self::new(name);
        *slot.factory.write() = Some(factory);
        slot
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Publish (or replace) the factory.
    ///
    /// Replacing an intercepted factory removes the interception.
    pub fn publish(&self, factory: StoreFactory<I, S>) {
        *self.factory.write() = Some(factory);
        self.intercepted.store(false, Ordering::SeqCst);
    }

    /// Current factory, if one has been published.
    pub fn factory(&self) -> Option<StoreFactory<I, S>> {
        self.factory.read().clone()
    }

    /// Build a store through the current factory.
    pub fn create(&self, init: I) -> Option<Arc<S>> {
        let factory = self.factory()?;
        Some(factory(init))
    }

    pub fn is_intercepted(&self) -> bool {
        self.intercepted.load(Ordering::SeqCst)
    }
}

/// Result of [`AutoRegister::install`].
#[derive(Debug)]
pub enum InstallStatus {
    /// The factory was intercepted immediately.
    Intercepted,
    /// No factory yet; one retry runs on the returned thread, which yields
    /// whether it succeeded.
    Deferred(JoinHandle<bool>),
    /// Interception is impossible; only explicit registration works.
    ManualOnly,
}

/// Registers stores as they are created.
pub struct AutoRegister<S> {
    monitor: StateMonitor,
    exclude: Arc<HashSet<String>>,
    name_extractor: Option<NameExtractor<S>>,
    retry_delay: Duration,
    counter: Arc<AtomicU64>,
    /// Stores already registered, keyed by allocation address. The weak
    /// handle tells a live store apart from a new one at a reused address.
    seen: Arc<Mutex<HashMap<usize, Weak<S>>>>,
}

impl<S> Clone for AutoRegister<S> {
    fn clone(&self) -> Self {
        Self {
            monitor: self.monitor.clone(),
            exclude: Arc::clone(&self.exclude),
            name_extractor: self.name_extractor.clone(),
            retry_delay: self.retry_delay,
            counter: Arc::clone(&self.counter),
            seen: Arc::clone(&self.seen),
        }
    }
}

impl<S> AutoRegister<S>
where
    S: StoreAdapter + 'static,
{
    pub fn new(monitor: StateMonitor) -> Self {
        Self {
            monitor,
            exclude: Arc::new(HashSet::new()),
            name_extractor: None,
            retry_delay: DEFAULT_RETRY_DELAY,
            counter: Arc::new(AtomicU64::new(0)),
            seen: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Never register stores with these names.
    pub fn exclude<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.exclude = Arc::new(names.into_iter().map(Into::into).collect());
        self
    }

    /// Derive names from the store instead of `store-<n>`.
    pub fn name_with<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&S) -> String + Send + Sync + 'static,
    {
        self.name_extractor = Some(Arc::new(extractor));
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Decorate a factory so every store it creates is registered once.
    pub fn wrap<I: 'static>(&self, factory: StoreFactory<I, S>) -> StoreFactory<I, S> {
        let this = self.clone();
        Arc::new(move |init| {
            let store = factory(init);
            this.register_created(&store);
            store
        })
    }

    /// Register a store that came out of a wrapped factory.
    ///
    /// Returns the name it was registered under, or `None` if it was
    /// already registered, excluded or rejected.
    pub fn register_created(&self, store: &Arc<S>) -> Option<String> {
        if !self.claim(store) {
            return None;
        }

        let name = match self.name_extractor {
            Some(ref extractor) => extractor(store.as_ref()),
            None => format!("store-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1),
        };

        if self.exclude.contains(&name) {
            self.release(store);
            if self.debug() {
                debug!(store = %name, "Skipping excluded store");
            }
            return None;
        }

        if self.register_claimed(&name, store) {
            Some(name)
        } else {
            None
        }
    }

    /// Register a store created outside any wrapped factory, so a wrapped
    /// factory returning it later does not register it twice.
    pub fn register_existing(&self, name: &str, store: &Arc<S>) -> bool {
        if !self.claim(store) {
            return false;
        }
        self.register_claimed(name, store)
    }

    /// Replace the factory in `slot` with a wrapped one.
    pub fn intercept<I: 'static>(&self, slot: &FactorySlot<I, S>) -> Result<()> {
        let mut factory = slot.factory.write();

        if slot.intercepted.load(Ordering::SeqCst) {
            return Ok(());
        }

        let original = factory
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| MonitorError::FactoryUnavailable(slot.name.clone()))?;

        *factory = Some(self.wrap(original));
        slot.intercepted.store(true, Ordering::SeqCst);

        if self.debug() {
            debug!(slot = %slot.name, "Auto-register installed");
        }
        Ok(())
    }

    /// Intercept `slot` now, or once more after the retry delay.
    ///
    /// After the retry fails the monitor falls back to manual registration.
    pub fn install<I>(&self, slot: Arc<FactorySlot<I, S>>) -> InstallStatus
    where
        I: Send + Sync + 'static,
    {
        match self.intercept(&slot) {
            Ok(()) => return InstallStatus::Intercepted,
            Err(e) => {
                if self.debug() {
                    debug!(slot = %slot.name, error = %e, "Auto-register deferred");
                }
            }
        }

        let this = self.clone();
        let delay = self.retry_delay;
        let spawned = std::thread::Builder::new()
            .name("statewatch-auto-register".to_string())
            .spawn(move || {
                std::thread::sleep(delay);
                match this.intercept(&slot) {
                    Ok(()) => true,
                    Err(e) => {
                        if this.debug() {
                            debug!(
                                slot = %slot.name,
                                error = %e,
                                "Auto-register unavailable; manual registration only"
                            );
                        }
                        false
                    }
                }
            });

        match spawned {
            Ok(handle) => InstallStatus::Deferred(handle),
            Err(e) => {
                if self.debug() {
                    debug!(error = %e, "Could not schedule auto-register retry");
                }
                InstallStatus::ManualOnly
            }
        }
    }

    fn debug(&self) -> bool {
        self.monitor.config().debug_mode
    }

    fn key(store: &Arc<S>) -> usize {
        Arc::as_ptr(store) as *const () as usize
    }

    /// Reserve `store` for registration. False if it is already taken.
    fn claim(&self, store: &Arc<S>) -> bool {
        let mut seen = self.seen.lock();
        seen.retain(|_, weak| weak.strong_count() > 0);

        let key = Self::key(store);
        if seen.contains_key(&key) {
            return false;
        }
        seen.insert(key, Arc::downgrade(store));
        true
    }

    fn release(&self, store: &Arc<S>) {
        self.seen.lock().remove(&Self::key(store));
    }

    fn register_claimed(&self, name: &str, store: &Arc<S>) -> bool {
        match self.monitor.register(name, Arc::clone(store)) {
            Ok(Registration::Registered) => {
                if self.debug() {
                    debug!(store = name, "Auto-registered store");
                }
                true
            }
            Ok(outcome) => {
                self.release(store);
                if self.debug() {
                    debug!(store = name, ?outcome, "Auto-registration skipped");
                }
                false
            }
            Err(e) => {
                self.release(store);
                error!(store = name, error = %e, "Failed to auto-register store");
                false
            }
        }
    }
}

/// Create a store and register it under `name`.
///
/// The store is returned even if registration fails.
pub fn with_auto_register<S, F>(monitor: &StateMonitor, name: &str, create: F) -> Arc<S>
where
    S: StoreAdapter + 'static,
    F: FnOnce() -> Arc<S>,
{
    let store = create();

    match monitor.register(name, Arc::clone(&store)) {
        Ok(outcome) => {
            if monitor.config().debug_mode {
                debug!(store = name, ?outcome, "Registered store with with_auto_register");
            }
        }
        Err(e) => error!(store = name, error = %e, "Failed to register store"),
    }

    store
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ObservableStore;
    use crate::config::MonitorConfig;
    use serde_json::{json, Value};

    fn factory() -> StoreFactory<Value, ObservableStore> {
        Arc::new(|initial| Arc::new(ObservableStore::new(initial)))
    }

    #[test]
    fn test_wrap_registers_with_generated_names() {
        let monitor = StateMonitor::default();
        let auto = AutoRegister::new(monitor.clone());
        let create = auto.wrap(factory());

        let a = create(json!({"a": 1}));
        let _b = create(json!({"b": 1}));

        assert_eq!(monitor.registered_stores(), vec!["store-1", "store-2"]);

        a.set_state(json!({"a": 2}));
        assert_eq!(monitor.get_history(Some("store-1")).len(), 1);
    }

    #[test]
    fn test_same_store_registered_once() {
        let monitor = StateMonitor::default();
        let auto = AutoRegister::new(monitor.clone());

        let shared = Arc::new(ObservableStore::new(json!(0)));
        let handle = Arc::clone(&shared);
        let create: StoreFactory<(), ObservableStore> =
            auto.wrap(Arc::new(move |_: ()| Arc::clone(&handle)));

        create(());
        create(());
        create(());

        assert_eq!(monitor.registered_stores().len(), 1);
        assert_eq!(shared.subscriber_count(), 1);
    }

    #[test]
    fn test_exclude_and_custom_names() {
        let monitor = StateMonitor::default();
        let auto = AutoRegister::new(monitor.clone())
            .name_with(|store: &ObservableStore| {
                store.state()["kind"].as_str().unwrap_or("unnamed").to_string()
            })
            .exclude(["scratch"]);
        let create = auto.wrap(factory());

        create(json!({"kind": "cart"}));
        create(json!({"kind": "scratch"}));

        assert_eq!(monitor.registered_stores(), vec!["cart"]);
    }

    #[test]
    fn test_register_existing_blocks_wrapped_duplicate() {
        let monitor = StateMonitor::default();
        let auto = AutoRegister::new(monitor.clone());

        let store = Arc::new(ObservableStore::new(json!(0)));
        assert!(auto.register_existing("main", &store));
        assert!(auto.register_created(&store).is_none());
        assert!(!auto.register_existing("again", &store));
        assert_eq!(monitor.registered_stores(), vec!["main"]);
    }

    #[test]
    fn test_intercept_missing_factory_fails() {
        let monitor = StateMonitor::default();
        let auto: AutoRegister<ObservableStore> = AutoRegister::new(monitor);
        let slot: FactorySlot<Value, ObservableStore> = FactorySlot::new("stores");

        assert!(matches!(
            auto.intercept(&slot),
            Err(MonitorError::FactoryUnavailable(_))
        ));
        assert!(slot.create(json!(0)).is_none());
    }

    #[test]
    fn test_install_immediate() {
        let monitor = StateMonitor::default();
        let auto = AutoRegister::new(monitor.clone());
        let slot = Arc::new(FactorySlot::with_factory("stores", factory()));

        assert!(matches!(auto.install(Arc::clone(&slot)), InstallStatus::Intercepted));
        assert!(slot.is_intercepted());

        // Intercepting twice does not double-wrap
        auto.intercept(&slot).unwrap();
        slot.create(json!({"x": 1})).unwrap();
        assert_eq!(monitor.registered_stores(), vec!["store-1"]);
    }

    #[test]
    fn test_install_retries_once() {
        let monitor = StateMonitor::default();
        let auto = AutoRegister::new(monitor.clone()).retry_delay(Duration::from_millis(50));
        let slot = Arc::new(FactorySlot::new("stores"));

        let status = auto.install(Arc::clone(&slot));
        slot.publish(factory());

        let handle = match status {
            InstallStatus::Deferred(handle) => handle,
            other => panic!("Expected deferred install, got {:?}", other),
        };
        assert!(handle.join().unwrap());

        slot.create(json!({"late": true})).unwrap();
        assert_eq!(monitor.registered_stores(), vec!["store-1"]);
    }

    #[test]
    fn test_install_gives_up_after_retry() {
        let monitor = StateMonitor::default();
        let auto = AutoRegister::new(monitor.clone()).retry_delay(Duration::from_millis(1));
        let slot: Arc<FactorySlot<Value, ObservableStore>> = Arc::new(FactorySlot::new("stores"));

        match auto.install(Arc::clone(&slot)) {
            InstallStatus::Deferred(handle) => assert!(!handle.join().unwrap()),
            other => panic!("Expected deferred install, got {:?}", other),
        }

        // Publishing afterwards works, but nothing is auto-registered
        slot.publish(factory());
        slot.create(json!(0)).unwrap();
        assert!(monitor.registered_stores().is_empty());
    }

    #[test]
    fn test_with_auto_register() {
        let monitor = StateMonitor::default();
        let store = with_auto_register(&monitor, "todos", || {
            Arc::new(ObservableStore::new(json!({"todos": []})))
        });

        store.set_state(json!({"todos": ["a"]}));
        assert_eq!(monitor.get_history(Some("todos")).len(), 1);
    }

    #[test]
    fn test_filtered_store_is_not_claimed() {
        let monitor = StateMonitor::new(MonitorConfig::default().with_store_names(["store-2"]));
        let auto = AutoRegister::new(monitor.clone());

        let store = Arc::new(ObservableStore::new(json!(0)));
        assert!(auto.register_created(&store).is_none());
        // Retried under the next generated name, which passes the filter
        assert_eq!(auto.register_created(&store).as_deref(), Some("store-2"));
    }
}
