use std::any::Any;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use hive_core::{DataKey, HiveError, HiveResult};
use tracing::debug;

use crate::store::SlotStore;
use crate::DataObject;

/// One data store per concurrency slot.
///
/// Each slot has its own lock, so algorithms working on different events
/// never contend. Availability is tracked by the scheduler, so `get` never
/// waits for data.
pub struct Whiteboard {
    slots: Vec<RwLock<SlotStore>>,
    free: Mutex<BTreeSet<usize>>,
}

impl Whiteboard {
    pub fn new(number_of_stores: usize) -> Self {
        Self {
            slots: (0..number_of_stores).map(|_| RwLock::default()).collect(),
            free: Mutex::new((0..number_of_stores).collect()),
        }
    }

    pub fn number_of_stores(&self) -> usize {
        self.slots.len()
    }

    pub fn free_slots(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Claim the lowest free slot for `event_number`. `None` when all
    /// slots are in use.
    pub fn allocate(&self, event_number: u64) -> Option<usize> {
        let slot = {
            let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
            free.pop_first()?
        };
        self.write(slot).occupy(event_number);
        debug!(slot, event = event_number, "whiteboard slot allocated");
        Some(slot)
    }

    /// Drop the slot's data and return it to the free list.
    pub fn release(&self, slot: usize) -> HiveResult<()> {
        if slot >= self.slots.len() {
            return Err(HiveError::InvalidSlot(slot));
        }
        {
            let mut store = self.write(slot);
            if !store.is_in_use() {
                return Err(HiveError::InvalidSlot(slot));
            }
            store.clear();
        }
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(slot);
        debug!(slot, "whiteboard slot released");
        Ok(())
    }

    /// Store an object; each key may be written once per event.
    pub fn put(&self, slot: usize, key: DataKey, object: DataObject) -> HiveResult<()> {
        if slot >= self.slots.len() {
            return Err(HiveError::InvalidSlot(slot));
        }
        let mut store = self.write(slot);
        if !store.is_in_use() {
            return Err(HiveError::InvalidSlot(slot));
        }
        if store.contains(&key) {
            return Err(HiveError::DuplicateProduction { key, slot });
        }
        store.insert(key, object);
        Ok(())
    }

    /// The object stored under `key`, or `None` if not (yet) produced.
    pub fn get(&self, slot: usize, key: &DataKey) -> Option<DataObject> {
        if slot >= self.slots.len() {
            return None;
        }
        self.read(slot).get(key).cloned()
    }

    pub fn get_as<T: Any + Send + Sync>(&self, slot: usize, key: &DataKey) -> Option<Arc<T>> {
        self.get(slot, key).and_then(crate::downcast::<T>)
    }

    pub fn contains(&self, slot: usize, key: &DataKey) -> bool {
        slot < self.slots.len() && self.read(slot).contains(key)
    }

    /// Event number occupying the slot, if any.
    pub fn event_number(&self, slot: usize) -> Option<u64> {
        if slot >= self.slots.len() {
            return None;
        }
        self.read(slot).event_number()
    }

    /// Keys currently present in the slot, sorted.
    pub fn keys(&self, slot: usize) -> Vec<DataKey> {
        if slot >= self.slots.len() {
            return Vec::new();
        }
        self.read(slot).keys()
    }

    fn read(&self, slot: usize) -> RwLockReadGuard<'_, SlotStore> {
        self.slots[slot].read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, slot: usize) -> RwLockWriteGuard<'_, SlotStore> {
        self.slots[slot].write().unwrap_or_else(PoisonError::into_inner)
    }
}
