//! A settings map that can be locked after initialization.
//!
//! Once [`FreezableMap::freeze`] has been called, every mutating call is a no-op:
//! the write is dropped without an error, so call sites never have to check whether
//! the configuration phase is over. Intended for configuration snapshots only; every
//! access takes a lock.

use std::{
    borrow::Borrow,
    hash::Hash,
    sync::{
        RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use ahash::AHashMap;

pub struct FreezableMap<K, V> {
    entries: RwLock<AHashMap<K, V>>,
    frozen: AtomicBool,
}

impl<K, V> FreezableMap<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> FreezableMap<K, V> {
        FreezableMap {
            entries: RwLock::new(AHashMap::new()),
            frozen: AtomicBool::new(false),
        }
    }

    /// Creates a map with the given entries that is already frozen.
    pub fn frozen(entries: impl IntoIterator<Item = (K, V)>) -> FreezableMap<K, V> {
        let map = FreezableMap {
            entries: RwLock::new(entries.into_iter().collect()),
            frozen: AtomicBool::new(false),
        };
        map.freeze();
        map
    }

    /// Locks the map. Returns `false` if it was already frozen.
    ///
    /// Writes that started before this call have completed once it returns.
    pub fn freeze(&self) -> bool {
        let _entries = self.entries.write().unwrap();
        !self.frozen.swap(true, Ordering::SeqCst)
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    /// Applies `op` under the write lock unless the map is frozen.
    fn mutate(&self, op: impl FnOnce(&mut AHashMap<K, V>)) -> bool {
        let mut entries = self.entries.write().unwrap();
        // Checked under the lock: `freeze` holds it while setting the flag.
        if self.is_frozen() {
            log::trace!("dropping write to a frozen map");
            return false;
        }
        op(&mut entries);
        true
    }

    /// Inserts an entry. Returns `true` if the map accepted the write.
    pub fn insert(&self, key: K, value: V) -> bool {
        self.mutate(|entries| {
            entries.insert(key, value);
        })
    }

    /// Copies all entries in. Returns `true` if the map accepted the write.
    pub fn extend(&self, entries: impl IntoIterator<Item = (K, V)>) -> bool {
        self.mutate(|map| map.extend(entries))
    }

    /// Removes an entry. Returns `true` if the map accepted the write.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.mutate(|entries| {
            entries.remove(key);
        })
    }

    pub fn clear(&self) -> bool {
        self.mutate(|entries| entries.clear())
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.entries.read().unwrap().get(key).cloned()
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.read().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> AHashMap<K, V>
    where
        K: Clone,
        V: Clone,
    {
        self.entries.read().unwrap().clone()
    }
}

impl<K, V> Default for FreezableMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for FreezableMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// The clone shares no state with the original but keeps its frozen flag.
    fn clone(&self) -> Self {
        FreezableMap {
            entries: RwLock::new(self.snapshot()),
            frozen: AtomicBool::new(self.is_frozen()),
        }
    }
}

impl<K, V> std::fmt::Debug for FreezableMap<K, V>
where
    K: std::fmt::Debug,
    V: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FreezableMap")
            .field("frozen", &self.frozen.load(Ordering::SeqCst))
            .field("entries", &*self.entries.read().unwrap())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_writes_before_freeze() {
        let map = FreezableMap::new();
        assert!(map.insert("max_threads".to_string(), "4".to_string()));
        assert!(map.insert("readonly".to_string(), "1".to_string()));
        assert!(map.remove("readonly"));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("max_threads").as_deref(), Some("4"));
    }

    #[test]
    fn test_writes_after_freeze_are_dropped() {
        let map = FreezableMap::new();
        map.insert("a", 1);
        assert!(map.freeze());
        assert!(!map.freeze());

        assert!(!map.insert("a", 2));
        assert!(!map.insert("b", 3));
        assert!(!map.remove("a"));
        assert!(!map.clear());
        assert!(!map.extend([("c", 4)]));

        assert_eq!(map.get("a"), Some(1));
        assert!(!map.contains_key("b"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_frozen_constructor_and_clone() {
        let map = FreezableMap::frozen([(1u32, "x")]);
        assert!(map.is_frozen());
        let copy = map.clone();
        assert!(copy.is_frozen());
        assert!(!copy.insert(2, "y"));
        assert_eq!(copy.snapshot().len(), 1);
    }

    #[test]
    fn test_shared_across_threads() {
        let map = Arc::new(FreezableMap::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let map = map.clone();
                std::thread::spawn(move || map.insert(i, i * 10))
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap());
        }
        map.freeze();
        assert_eq!(map.len(), 4);
        assert!(!map.insert(5, 50));
    }

    #[test]
    fn test_no_write_lands_after_freeze() {
        for _ in 0..20 {
            let map = Arc::new(FreezableMap::new());
            let writers: Vec<_> = (0..4u32)
                .map(|t| {
                    let map = map.clone();
                    std::thread::spawn(move || {
                        (0..500u32).filter(|i| map.insert(t * 1000 + i, *i)).count()
                    })
                })
                .collect();
            std::thread::yield_now();
            map.freeze();
            let at_freeze = map.len();
            let accepted: usize = writers.into_iter().map(|w| w.join().unwrap()).sum();
            assert_eq!(map.len(), at_freeze);
            assert_eq!(accepted, at_freeze);
        }
    }
}
