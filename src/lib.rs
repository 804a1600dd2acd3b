//! # State Watch
//!
//! An observation engine for mutable state containers. It subscribes to
//! registered stores, records every transition with a shallow diff in a
//! bounded per-store history, and hands those records to any number of
//! independent listeners, without ever being able to break the stores it
//! observes.
//!
//! ## Core Concepts
//!
//! - **Stores**: anything implementing [`StoreAdapter`] (read a snapshot,
//!   subscribe to changes)
//! - **Change records**: immutable old/new snapshots, diff and timestamp
//! - **Listeners**: callbacks or channel subscriptions, filtered by store
//!   name and isolated from each other's failures
//! - **Pause gate**: suspends recording while stores keep working
//!
//! ## Example
//!
//! ```ignore
//! use statewatch::{Listener, MonitorConfig, ObservableStore, StateMonitor};
//!
//! let monitor = StateMonitor::new(MonitorConfig::default());
//! let counter = Arc::new(ObservableStore::new(json!({"count": 0})));
//! monitor.register("counter", Arc::clone(&counter))?;
//!
//! monitor.add_listener(Listener::from_fn(|record| {
//!     println!("{} changed: {}", record.store_name, record.diff.value());
//! }));
//!
//! counter.set_state(json!({"count": 1}));
//! assert_eq!(monitor.get_history(Some("counter")).len(), 1);
//! ```

pub mod adapter;
pub mod auto_register;
pub mod config;
pub mod error;
pub mod monitor;
mod registry;
pub mod state;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use adapter::{ChangeCallback, ObservableStore, StoreAdapter, Unsubscribe};
pub use auto_register::{
    with_auto_register, AutoRegister, FactorySlot, InstallStatus, NameExtractor, StoreFactory,
    DEFAULT_RETRY_DELAY,
};
pub use config::{FilterConfig, MonitorConfig, DEFAULT_MAX_HISTORY_SIZE};
pub use error::{MonitorError, Result};
pub use monitor::{Registration, RegistrationGuard, StateMonitor};
pub use state::{compute_diff, HistoryRing};
pub use subscriptions::{
    DeliveryError, Listener, ListenerBus, ListenerCallback, ListenerError, ListenerFilter,
    ListenerResult, SubscriptionHandle,
};
pub use types::*;
