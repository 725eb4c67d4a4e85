use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use hive_core::DataKey;

use crate::DataObject;

/// Slot-independent, versioned, read-mostly store.
///
/// Each key holds versions valid from a given event number onward; a
/// lookup for event `n` returns the latest version whose start is `<= n`.
#[derive(Default)]
pub struct ConditionStore {
    entries: RwLock<HashMap<DataKey, BTreeMap<u64, DataObject>>>,
}

impl ConditionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a version of `key` valid from `valid_from` onward. A
    /// version with the same start replaces the previous one.
    pub fn insert(&self, key: DataKey, valid_from: u64, object: DataObject) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .insert(valid_from, object);
    }

    /// Version of `key` valid for `event_number`.
    pub fn get(&self, key: &DataKey, event_number: u64) -> Option<DataObject> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)?
            .range(..=event_number)
            .next_back()
            .map(|(_, object)| Arc::clone(object))
    }

    pub fn get_as<T: Any + Send + Sync>(&self, key: &DataKey, event_number: u64) -> Option<Arc<T>> {
        self.get(key, event_number).and_then(crate::downcast::<T>)
    }

    pub fn versions(&self, key: &DataKey) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}
