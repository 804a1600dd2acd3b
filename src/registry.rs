//! Name-keyed registry of monitored stores.

use crate::adapter::{StoreAdapter, Unsubscribe};
use crate::state::HistoryRing;
use crate::types::Snapshot;
use std::collections::HashMap;
use std::sync::Arc;

/// One monitored store.
pub(crate) struct StoreEntry {
    pub name: String,

    /// Distinguishes successive registrations under the same name.
    pub generation: u64,

    pub adapter: Arc<dyn StoreAdapter>,

    /// Taken exactly once, when the entry leaves the registry.
    unsubscribe: Option<Unsubscribe>,

    /// State as of registration or the last recorded change.
    pub cached: Snapshot,

    pub history: HistoryRing,
}

impl StoreEntry {
    pub fn new(
        name: String,
        generation: u64,
        adapter: Arc<dyn StoreAdapter>,
        unsubscribe: Unsubscribe,
        initial: Snapshot,
        max_history: usize,
    ) -> Self {
        Self {
            name,
            generation,
            adapter,
            unsubscribe: Some(unsubscribe),
            cached: initial,
            history: HistoryRing::new(max_history),
        }
    }

    /// Detach from the adapter. Later calls do nothing.
    pub fn detach(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe.call();
        }
    }
}

/// Insertion-ordered map from store name to entry.
#[derive(Default)]
pub(crate) struct Registry {
    entries: HashMap<String, StoreEntry>,
    order: Vec<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Insert an entry. Hands it back if the name is taken.
    pub fn insert(&mut self, entry: StoreEntry) -> std::result::Result<(), StoreEntry> {
        if self.entries.contains_key(&entry.name) {
            return Err(entry);
        }
        self.order.push(entry.name.clone());
        self.entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<StoreEntry> {
        let entry = self.entries.remove(name)?;
        self.order.retain(|n| n != name);
        Some(entry)
    }

    pub fn get(&self, name: &str) -> Option<&StoreEntry> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut StoreEntry> {
        self.entries.get_mut(name)
    }

    /// Names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &StoreEntry> {
        self.order.iter().filter_map(|name| self.entries.get(name))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StoreEntry> {
        self.entries.values_mut()
    }

    /// Remove every entry, in registration order.
    pub fn drain(&mut self) -> Vec<StoreEntry> {
        let order = std::mem::take(&mut self.order);
        order
            .into_iter()
            .filter_map(|name| self.entries.remove(&name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
