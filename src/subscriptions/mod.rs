//! Listener bus for recorded state changes.
//!
//! Every committed [`ChangeRecord`](crate::ChangeRecord) is fanned out to the
//! registered listeners whose filter matches the record's store:
//! - callback listeners run synchronously on the mutating thread
//! - channel subscriptions buffer records for consumers that poll
//!
//! A failing listener (error or panic) is logged and skipped; it never
//! affects other listeners or the store that produced the change.
//!
//! # Example
//!
//! ```ignore
//! let bus = ListenerBus::new(false);
//!
//! // Callback listener for one store
//! let id = bus.add(Listener::new(|record| {
//!     println!("{} changed: {:?}", record.store_name, record.diff);
//!     Ok(())
//! }).for_stores(["counter"]));
//!
//! // Polling subscription for every store
//! let handle = bus.subscribe(ListenerFilter::all(), 256);
//! for record in handle.drain() {
//!     println!("{}", record.sequence);
//! }
//! ```

mod manager;
mod types;

pub use manager::ListenerBus;
pub use types::{
    DeliveryError, Listener, ListenerCallback, ListenerError, ListenerFilter, ListenerResult,
    SubscriptionHandle,
};
