use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Map keyed by the identity of an `Arc`, holding only a weak reference to the key
///
/// The cache never keeps the key's value alive: once every strong reference is dropped, the entry
/// is considered stale, is never returned again, and gets purged on the next insertion. Keying by
/// address is sound because the `Weak` we hold keeps the allocation (not the value) reserved, so
/// the address cannot be handed out to a different `Arc` while the entry exists.
pub struct WeakKeyCache<K: ?Sized, V> {
    entries: Mutex<HashMap<usize, (Weak<K>, V)>>,
}

impl<K: ?Sized, V: Clone> WeakKeyCache<K, V> {
    pub fn new() -> WeakKeyCache<K, V> {
        WeakKeyCache {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn address(key: &Arc<K>) -> usize {
        Arc::as_ptr(key) as *const () as usize
    }

    /// Look up the value associated with a live key
    pub fn get(&self, key: &Arc<K>) -> Option<V> {
        let entries = self.entries.lock();
        entries
            .get(&Self::address(key))
            .filter(|(weak, _)| weak.strong_count() > 0)
            .map(|(_, value)| value.clone())
    }

    /// Associate a value with a key, dropping entries whose keys are gone
    pub fn insert(&self, key: &Arc<K>, value: V) {
        let mut entries = self.entries.lock();
        entries.retain(|_, (weak, _)| weak.strong_count() > 0);
        entries.insert(Self::address(key), (Arc::downgrade(key), value));
    }

    /// Number of entries whose keys are still alive
    #[cfg(test)]
    pub fn live_len(&self) -> usize {
        let entries = self.entries.lock();
        entries
            .values()
            .filter(|(weak, _)| weak.strong_count() > 0)
            .count()
    }
}

impl<K: ?Sized, V: Clone> Default for WeakKeyCache<K, V> {
    fn default() -> Self {
        WeakKeyCache::new()
    }
}
