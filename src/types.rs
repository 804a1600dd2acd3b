//! Core types for the state monitor.

use crate::error::Result;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    ///
    /// A clock set before the epoch reads as zero rather than failing; the
    /// recorder never depends on timestamps for per-store ordering.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        Timestamp(millis)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The full state value of a store at one instant.
///
/// Snapshots are immutable and shared: cloning one only bumps a reference
/// count, so a record's `old_state` and the previous record's `new_state`
/// can point at the same allocation. JSON objects are the keyed (composite)
/// case; every other JSON value is treated as an opaque scalar by the diff.
#[derive(Clone, PartialEq)]
pub struct Snapshot(Arc<Value>);

impl Snapshot {
    /// Wrap a JSON value.
    pub fn new(value: Value) -> Self {
        Snapshot(Arc::new(value))
    }

    /// Capture typed state through its serde representation.
    pub fn from_serialize<T: Serialize + ?Sized>(state: &T) -> Result<Self> {
        Ok(Snapshot::new(serde_json::to_value(state)?))
    }

    /// Decode the snapshot back into a typed value.
    pub fn to_typed<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        Ok(T::deserialize(self.0.as_ref())?)
    }

    /// Borrow the underlying value.
    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Whether the snapshot is key-addressable.
    pub fn is_composite(&self) -> bool {
        self.0.is_object()
    }

    /// True if both handles share one allocation.
    pub fn ptr_eq(a: &Snapshot, b: &Snapshot) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl Deref for Snapshot {
    type Target = Value;

    fn deref(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for Snapshot {
    fn from(value: Value) -> Self {
        Snapshot::new(value)
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Snapshot::new(Value::Null)
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Snapshot({})", self.0)
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.as_ref().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Snapshot::new)
    }
}

/// An immutable record of one observed transition.
#[derive(Clone, Debug, Serialize)]
pub struct ChangeRecord {
    /// Engine-wide arrival order (assigned by the recorder).
    pub sequence: u64,

    /// Which store changed.
    pub store_name: String,

    /// State before the change.
    pub old_state: Snapshot,

    /// State after the change.
    pub new_state: Snapshot,

    /// When the change was recorded.
    pub timestamp: Timestamp,

    /// Changed top-level keys mapped to their new values, or the whole new
    /// state when either side is not an object.
    pub diff: Snapshot,
}

impl ChangeRecord {
    /// Keys present in the diff. Empty for a non-composite diff.
    pub fn changed_keys(&self) -> Vec<&str> {
        match self.diff.value() {
            Value::Object(map) if self.old_state.is_composite() && self.new_state.is_composite() => {
                map.keys().map(String::as_str).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// Unique identifier for a registered listener.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

impl fmt::Debug for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListenerId({})", self.0)
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener_{}", self.0)
    }
}

/// Monitor statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    pub registered_stores: usize,
    pub listeners: usize,
    pub history_records: usize,
    pub paused: bool,
}
