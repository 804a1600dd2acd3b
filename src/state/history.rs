//! Bounded per-store history.

use crate::types::ChangeRecord;
use std::collections::VecDeque;
use std::sync::Arc;

/// FIFO ring of change records holding at most `capacity` entries.
#[derive(Debug, Clone)]
pub struct HistoryRing {
    records: VecDeque<Arc<ChangeRecord>>,
    capacity: usize,
}

impl HistoryRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append a record, evicting the oldest one on overflow.
    ///
    /// Returns the evicted record, if any. With a capacity of zero the new
    /// record itself is returned.
    pub fn push(&mut self, record: Arc<ChangeRecord>) -> Option<Arc<ChangeRecord>> {
        self.records.push_back(record);
        if self.records.len() > self.capacity {
            self.records.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Records oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ChangeRecord>> {
        self.records.iter()
    }

    /// Shared handles to every record, oldest first.
    pub fn to_vec(&self) -> Vec<Arc<ChangeRecord>> {
        self.records.iter().cloned().collect()
    }

    pub fn last(&self) -> Option<&Arc<ChangeRecord>> {
        self.records.back()
    }
}
