//! Shallow diffing between snapshots.

use crate::types::Snapshot;
use serde_json::{Map, Value};

/// Compute the top-level difference between two snapshots.
///
/// If either side is not an object the diff is the whole new state. Otherwise
/// the diff maps every key present in either object whose value differs to
/// its new value; keys that disappeared map to `null`. Only top-level keys
/// are compared, nested values are never walked for a finer-grained diff.
pub fn compute_diff(old: &Snapshot, new: &Snapshot) -> Snapshot {
    let (old_map, new_map) = match (old.value(), new.value()) {
        (Value::Object(old_map), Value::Object(new_map)) => (old_map, new_map),
        _ => return new.clone(),
    };

    if Snapshot::ptr_eq(old, new) {
        return Snapshot::new(Value::Object(Map::new()));
    }

    let mut diff = Map::new();

    for (key, new_value) in new_map {
        if old_map.get(key) != Some(new_value) {
            diff.insert(key.clone(), new_value.clone());
        }
    }

    for key in old_map.keys() {
        if !new_map.contains_key(key) {
            diff.insert(key.clone(), Value::Null);
        }
    }

    Snapshot::new(Value::Object(diff))
}
