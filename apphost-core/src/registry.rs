//! String-keyed owning registry guarded by a reader/writer lock.
//! Once sealed it is empty for good: lookups miss and inserts are refused.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

struct Slots<V> {
    entries: HashMap<String, V>,
    sealed: bool,
}

pub struct Registry<V> {
    slots: RwLock<Slots<V>>,
}

impl<V> Registry<V> {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(Slots {
                entries: HashMap::new(),
                sealed: false,
            }),
        }
    }

    // Entries are plain values; a panic elsewhere cannot leave the map half-updated.
    fn read(&self) -> RwLockReadGuard<'_, Slots<V>> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Slots<V>> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value` under `key`, replacing any previous entry.
    /// Hands the value back if the registry is sealed so the caller can dispose of it.
    pub fn insert(&self, key: &str, value: V) -> Result<(), V> {
        let mut slots = self.write();
        if slots.sealed {
            return Err(value);
        }
        slots.entries.insert(key.to_string(), value);
        Ok(())
    }

    /// Remove and return the entry. Exactly one caller can win a given key.
    pub fn remove(&self, key: &str) -> Option<V> {
        let mut slots = self.write();
        if slots.sealed {
            return None;
        }
        slots.entries.remove(key)
    }

    /// Remove the entry only if `pred` accepts the stored value.
    pub fn remove_if(&self, key: &str, pred: impl FnOnce(&V) -> bool) -> Option<V> {
        let mut slots = self.write();
        if slots.sealed {
            return None;
        }
        match slots.entries.get(key) {
            Some(v) if pred(v) => slots.entries.remove(key),
            _ => None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        let slots = self.read();
        !slots.sealed && slots.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_sealed(&self) -> bool {
        self.read().sealed
    }

    /// Take the write lock for a teardown. Hold it while sealing sibling registries
    /// so no reader sees one registry torn down and the other still live.
    pub fn lock_exclusive(&self) -> Exclusive<'_, V> {
        Exclusive { guard: self.write() }
    }
}

impl<V: Clone> Registry<V> {
    pub fn get(&self, key: &str) -> Option<V> {
        let slots = self.read();
        if slots.sealed {
            return None;
        }
        slots.entries.get(key).cloned()
    }
}

impl<V> Default for Registry<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Write access held across a teardown.
pub struct Exclusive<'a, V> {
    guard: RwLockWriteGuard<'a, Slots<V>>,
}

impl<V> Exclusive<'_, V> {
    pub fn is_sealed(&self) -> bool {
        self.guard.sealed
    }

    /// Empty the registry and mark it sealed. Returns what was stored.
    pub fn seal(&mut self) -> Vec<(String, V)> {
        self.guard.sealed = true;
        self.guard.entries.drain().collect()
    }
}
