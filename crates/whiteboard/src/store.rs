use std::collections::HashMap;

use hive_core::DataKey;

use crate::DataObject;

/// Key → object map for the event occupying one slot.
#[derive(Default)]
pub struct SlotStore {
    /// Event currently using the slot; `None` while the slot is free.
    event_number: Option<u64>,
    data: HashMap<DataKey, DataObject>,
}

impl SlotStore {
    pub fn event_number(&self) -> Option<u64> {
        self.event_number
    }

    pub fn is_in_use(&self) -> bool {
        self.event_number.is_some()
    }

    /// Insert unless the key is already populated; returns whether it was stored.
    pub fn insert(&mut self, key: DataKey, object: DataObject) -> bool {
        if self.data.contains_key(&key) {
            return false;
        }
        self.data.insert(key, object);
        true
    }

    pub fn get(&self, key: &DataKey) -> Option<&DataObject> {
        self.data.get(key)
    }

    pub fn contains(&self, key: &DataKey) -> bool {
        self.data.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Keys present in the slot, sorted.
    pub fn keys(&self) -> Vec<DataKey> {
        let mut keys: Vec<DataKey> = self.data.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub(crate) fn occupy(&mut self, event_number: u64) {
        self.data.clear();
        self.event_number = Some(event_number);
    }

    pub(crate) fn clear(&mut self) {
        self.data.clear();
        self.event_number = None;
    }
}

impl std::fmt::Debug for SlotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotStore")
            .field("event_number", &self.event_number)
            .field("keys", &self.keys())
            .finish()
    }
}
