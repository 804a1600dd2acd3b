//! Error handling and edge case tests.

use serde_json::json;
use statewatch::{
    ChangeCallback, Listener, MonitorConfig, MonitorError, ObservableStore, Registration,
    Snapshot, StateMonitor, StoreAdapter, Unsubscribe,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Adapter that counts how often it is unsubscribed.
struct CountingAdapter {
    inner: ObservableStore,
    unsubscribes: Arc<AtomicUsize>,
}

impl StoreAdapter for CountingAdapter {
    fn get_state(&self) -> Snapshot {
        self.inner.get_state()
    }

    fn subscribe(&self, callback: ChangeCallback) -> Unsubscribe {
        let inner = self.inner.subscribe(callback);
        let counter = Arc::clone(&self.unsubscribes);
        Unsubscribe::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            inner.call();
        })
    }
}

// --- Registration Errors ---

#[test]
fn test_duplicate_registration() {
    init_tracing();
    let monitor = StateMonitor::default();

    monitor
        .register("a", ObservableStore::new(json!({"v": 1})))
        .unwrap();
    let result = monitor.register("a", ObservableStore::new(json!({"v": 2})));

    assert!(matches!(result, Err(MonitorError::AlreadyRegistered(ref name)) if name == "a"));
    assert_eq!(*monitor.get_state("a").unwrap(), json!({"v": 1}));
}

#[test]
fn test_filtered_registration_is_not_an_error() {
    init_tracing();
    let monitor = StateMonitor::new(
        MonitorConfig::default()
            .with_store_names(["only"])
            .with_debug_mode(true),
    );
    let store = Arc::new(ObservableStore::new(json!(0)));

    let outcome = monitor.register("other", Arc::clone(&store)).unwrap();
    assert_eq!(outcome, Registration::Filtered);
    assert_eq!(store.subscriber_count(), 0);
    assert!(monitor.registered_stores().is_empty());
}

#[test]
fn test_disabled_monitor() {
    let monitor = StateMonitor::new(MonitorConfig {
        enabled: false,
        ..Default::default()
    });

    let outcome = monitor.register("a", ObservableStore::new(json!(0))).unwrap();
    assert_eq!(outcome, Registration::Disabled);
    assert!(monitor
        .register_scoped("b", ObservableStore::new(json!(0)))
        .unwrap()
        .is_none());
    assert!(!monitor.is_registered("a"));
}

// --- Unknown Stores ---

#[test]
fn test_unregister_unknown_store() {
    init_tracing();
    let monitor = StateMonitor::default();

    let result = monitor.unregister("ghost");
    assert!(matches!(result, Err(MonitorError::StoreNotRegistered(_))));
}

#[test]
fn test_queries_on_unknown_store() {
    let monitor = StateMonitor::default();

    assert!(monitor.get_state("ghost").is_none());
    assert!(monitor.last_recorded_state("ghost").is_none());
    assert!(monitor.get_history(Some("ghost")).is_empty());
    assert!(matches!(
        monitor.clear_history(Some("ghost")),
        Err(MonitorError::StoreNotRegistered(_))
    ));
    assert!(!monitor.is_registered("ghost"));
}

#[test]
fn test_unsubscribe_called_exactly_once() {
    let monitor = StateMonitor::default();
    let unsubscribes = Arc::new(AtomicUsize::new(0));

    monitor
        .register(
            "s",
            CountingAdapter {
                inner: ObservableStore::new(json!(0)),
                unsubscribes: Arc::clone(&unsubscribes),
            },
        )
        .unwrap();

    monitor.unregister("s").unwrap();
    let _ = monitor.unregister("s");
    monitor.destroy();

    assert_eq!(unsubscribes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_destroy_unsubscribes_each_store_once() {
    let monitor = StateMonitor::default();
    let unsubscribes = Arc::new(AtomicUsize::new(0));

    for name in ["a", "b", "c"] {
        monitor
            .register(
                name,
                CountingAdapter {
                    inner: ObservableStore::new(json!(0)),
                    unsubscribes: Arc::clone(&unsubscribes),
                },
            )
            .unwrap();
    }

    monitor.destroy();
    monitor.destroy();
    drop(monitor);

    assert_eq!(unsubscribes.load(Ordering::SeqCst), 3);
}

// --- Listener Failures ---

#[test]
fn test_panicking_listener_does_not_reach_store() {
    init_tracing();
    let monitor = StateMonitor::default();
    let store = Arc::new(ObservableStore::new(json!({"count": 0})));
    monitor.register("counter", Arc::clone(&store)).unwrap();

    monitor.add_listener(Listener::from_fn(|_| panic!("listener bug")));
    let count = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&count);
    monitor.add_listener(Listener::from_fn(move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    }));

    for i in 1..=5 {
        store.set_state(json!({"count": i}));
    }

    assert_eq!(*store.state(), json!({"count": 5}));
    assert_eq!(count.load(Ordering::SeqCst), 5);
    assert_eq!(monitor.get_history(Some("counter")).len(), 5);
}

#[test]
fn test_listener_error_with_log_changes() {
    init_tracing();
    let monitor = StateMonitor::new(MonitorConfig {
        log_changes: true,
        debug_mode: true,
        ..Default::default()
    });
    let store = Arc::new(ObservableStore::new(json!({"a": 1})));
    monitor.register("s", Arc::clone(&store)).unwrap();
    monitor.add_listener(Listener::new(|record| {
        Err(format!("cannot render {}", record.store_name).into())
    }));

    store.set_state(json!({"a": 2}));
    assert_eq!(monitor.get_history(Some("s")).len(), 1);
}

// --- Edge Cases ---

#[test]
fn test_scalar_state_diff() {
    let monitor = StateMonitor::default();
    let store = Arc::new(ObservableStore::new(json!({"a": 1})));
    monitor.register("s", Arc::clone(&store)).unwrap();

    store.set_state(json!(5));
    store.set_state(json!("text"));

    let history = monitor.get_history(Some("s"));
    assert_eq!(*history[0].diff, json!(5));
    assert_eq!(*history[1].diff, json!("text"));
    assert!(history[0].changed_keys().is_empty());
}

#[test]
fn test_unchanged_set_records_empty_diff() {
    let monitor = StateMonitor::default();
    let store = Arc::new(ObservableStore::new(json!({"a": 1})));
    monitor.register("s", Arc::clone(&store)).unwrap();

    store.set_state(json!({"a": 1}));

    let history = monitor.get_history(Some("s"));
    assert_eq!(history.len(), 1);
    assert_eq!(*history[0].diff, json!({}));
}

#[test]
fn test_exclude_keys_is_not_applied() {
    let monitor = StateMonitor::new(MonitorConfig {
        filters: statewatch::FilterConfig {
            store_names: vec![],
            exclude_keys: vec!["secret".to_string()],
        },
        ..Default::default()
    });
    let store = Arc::new(ObservableStore::new(json!({"secret": 1})));
    monitor.register("s", Arc::clone(&store)).unwrap();

    store.set_state(json!({"secret": 2}));
    assert_eq!(
        *monitor.get_history(Some("s"))[0].diff,
        json!({"secret": 2})
    );
}
