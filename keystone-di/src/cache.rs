//! Singleton cache and per-key instantiation locks

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::trace;

use crate::error::{DiError, DiResult};
use crate::instance::{DependencyValue, Injectable};
use crate::key::DependencyKey;

#[derive(Clone)]
struct SingletonEntry {
    value: DependencyValue,
    /// `Debug` rendering of explicitly added values
    repr: Option<Arc<str>>,
}

impl SingletonEntry {
    fn describe(&self) -> String {
        match &self.repr {
            Some(repr) => repr.to_string(),
            None => format!("<{}>", (*self.value).type_name()),
        }
    }
}

/// Batch of singletons to add to a container.
///
/// Inserting the same key twice keeps the last value.
#[derive(Default)]
pub struct SingletonMap {
    entries: Vec<(DependencyKey, SingletonEntry)>,
}

impl SingletonMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<DependencyKey>,
        V: Injectable + fmt::Debug,
    {
        self.insert(key, value);
        self
    }

    pub fn insert<K, V>(&mut self, key: K, value: V)
    where
        K: Into<DependencyKey>,
        V: Injectable + fmt::Debug,
    {
        let key = key.into();
        let entry = SingletonEntry {
            repr: Some(Arc::from(format!("{:?}", value))),
            value: Arc::new(value),
        };
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = entry,
            None => self.entries.push((key, entry)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for SingletonMap
where
    K: Into<DependencyKey>,
    V: Injectable + fmt::Debug,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = SingletonMap::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for SingletonMap
where
    K: Into<DependencyKey>,
    V: Injectable + fmt::Debug,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Unscoped cache of values computed once, append-only
#[derive(Default)]
pub(crate) struct SingletonCache {
    entries: RwLock<FxHashMap<DependencyKey, SingletonEntry>>,
}

impl SingletonCache {
    pub(crate) fn get(&self, key: &DependencyKey) -> Option<DependencyValue> {
        let value = self.entries.read().get(key).map(|entry| entry.value.clone());
        if value.is_some() {
            trace!("Singleton cache hit: {}", key);
        }
        value
    }

    #[cfg(test)]
    fn contains(&self, key: &DependencyKey) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Description of the cached value, used in duplicate errors
    pub(crate) fn describe(&self, key: &DependencyKey) -> Option<String> {
        self.entries.read().get(key).map(SingletonEntry::describe)
    }

    /// Add every entry of `map`, or none of them if any key is already cached
    pub(crate) fn add_all(&self, map: SingletonMap) -> DiResult<()> {
        let mut entries = self.entries.write();
        if let Some((key, existing)) = map
            .entries
            .iter()
            .find_map(|(key, _)| entries.get(key).map(|existing| (key, existing)))
        {
            return Err(DiError::DuplicateDependency {
                key: key.clone(),
                existing: format!("singleton {}", existing.describe()),
            });
        }
        entries.extend(map.entries);
        Ok(())
    }

    /// Store a computed value; the first writer wins and its value is returned
    pub(crate) fn store(&self, key: &DependencyKey, value: DependencyValue) -> DependencyValue {
        self.entries
            .write()
            .entry(key.clone())
            .or_insert(SingletonEntry { value, repr: None })
            .value
            .clone()
    }

    pub(crate) fn snapshot(&self, keep_entries: bool) -> Self {
        let entries = if keep_entries {
            self.entries.read().clone()
        } else {
            FxHashMap::default()
        };
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub(crate) fn keys(&self) -> Vec<DependencyKey> {
        self.entries.read().keys().cloned().collect()
    }
}

/// One mutex per key being instantiated.
///
/// Concurrent first resolutions of the same key block on the same mutex,
/// different keys never contend. Entries are dropped once nobody waits.
///
/// The table also records which thread owns each key and which key each
/// blocked thread waits for. A thread about to wait on a key whose owner
/// (transitively) waits on a key it owns itself would deadlock; it fails
/// with a cycle instead.
#[derive(Default)]
pub(crate) struct KeyLocks {
    table: Mutex<LockTable>,
}

#[derive(Default)]
struct LockTable {
    slots: FxHashMap<DependencyKey, Arc<Mutex<()>>>,
    owners: FxHashMap<DependencyKey, ThreadId>,
    waiting: FxHashMap<ThreadId, DependencyKey>,
}

impl LockTable {
    /// Keys forming a wait-for cycle if `thread` blocked on `key`
    fn wait_cycle(&self, key: &DependencyKey, thread: ThreadId) -> Option<Vec<DependencyKey>> {
        let mut chain = vec![key.clone()];
        let mut current = key;

        // Every hop visits a distinct owned key, or the walk already looped
        // among other threads.
        for _ in 0..=self.owners.len() {
            let owner = *self.owners.get(current)?;
            if owner == thread {
                chain.push(key.clone());
                return Some(chain);
            }
            current = self.waiting.get(&owner)?;
            chain.push(current.clone());
        }
        None
    }
}

impl KeyLocks {
    pub(crate) fn with_lock<T>(
        &self,
        key: &DependencyKey,
        f: impl FnOnce() -> DiResult<T>,
    ) -> DiResult<T> {
        let thread = thread::current().id();

        let slot = {
            let mut table = self.table.lock();
            if let Some(chain) = table.wait_cycle(key, thread) {
                trace!("Cross-thread cycle on {}", key);
                return Err(DiError::DependencyCycle { chain });
            }
            table.waiting.insert(thread, key.clone());
            table.slots.entry(key.clone()).or_default().clone()
        };

        let _held = slot.lock();
        let _owned = OwnedSlot::acquire(self, key, &slot, thread);
        f()
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.table.lock().slots.len()
    }
}

/// Ownership of a locked slot, released on drop, also while unwinding
struct OwnedSlot<'a> {
    locks: &'a KeyLocks,
    key: &'a DependencyKey,
    slot: &'a Arc<Mutex<()>>,
}

impl<'a> OwnedSlot<'a> {
    fn acquire(
        locks: &'a KeyLocks,
        key: &'a DependencyKey,
        slot: &'a Arc<Mutex<()>>,
        thread: ThreadId,
    ) -> Self {
        let mut table = locks.table.lock();
        table.waiting.remove(&thread);
        table.owners.insert(key.clone(), thread);
        Self { locks, key, slot }
    }
}

impl Drop for OwnedSlot<'_> {
    fn drop(&mut self) {
        let mut table = self.locks.table.lock();
        table.owners.remove(self.key);
        // Only the table and this call hold the slot: nobody is waiting.
        if Arc::strong_count(self.slot) == 2 {
            table.slots.remove(self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_add_all_is_atomic() {
        let cache = SingletonCache::default();
        cache
            .add_all(SingletonMap::new().with("x", 1_i32))
            .unwrap();

        let err = cache
            .add_all(SingletonMap::new().with("y", 2_i32).with("x", 3_i32))
            .unwrap_err();
        match err {
            DiError::DuplicateDependency { key, existing } => {
                assert_eq!(key, DependencyKey::from("x"));
                assert_eq!(existing, "singleton 1");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(!cache.contains(&DependencyKey::from("y")));
        let x = cache.get(&DependencyKey::from("x")).unwrap();
        assert_eq!(x.downcast_ref::<i32>(), Some(&1));
    }

    #[test]
    fn test_store_first_writer_wins() {
        let cache = SingletonCache::default();
        let key = DependencyKey::from("service");
        let first: DependencyValue = Arc::new(1_u8);
        let second: DependencyValue = Arc::new(2_u8);

        let stored = cache.store(&key, first.clone());
        assert!(Arc::ptr_eq(&stored, &first));
        let stored = cache.store(&key, second);
        assert!(Arc::ptr_eq(&stored, &first));
        assert_eq!(cache.describe(&key).as_deref(), Some("<u8>"));
    }

    #[test]
    fn test_singleton_map_last_insert_wins() {
        let map: SingletonMap = [("a", 1_i32), ("a", 2_i32), ("b", 3_i32)].into();
        assert_eq!(map.len(), 2);

        let cache = SingletonCache::default();
        cache.add_all(map).unwrap();
        assert_eq!(
            cache
                .get(&DependencyKey::from("a"))
                .unwrap()
                .downcast_ref::<i32>(),
            Some(&2)
        );
    }

    #[test]
    fn test_key_locks_serialize_same_key() {
        let locks = Arc::new(KeyLocks::default());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                thread::spawn(move || {
                    locks.with_lock(&DependencyKey::from("k"), || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(std::time::Duration::from_millis(2));
                        inside.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.pending(), 0);
    }

    #[test]
    fn test_wait_cycle_follows_owners() {
        let me = thread::current().id();
        let other = thread::spawn(|| {}).thread().id();
        let a = DependencyKey::from("a");
        let b = DependencyKey::from("b");

        let mut table = LockTable::default();
        table.owners.insert(a.clone(), me);
        table.owners.insert(b.clone(), other);
        assert_eq!(table.wait_cycle(&b, me), None);

        table.waiting.insert(other, a.clone());
        assert_eq!(
            table.wait_cycle(&b, me),
            Some(vec![b.clone(), a.clone(), b.clone()])
        );
        assert_eq!(table.wait_cycle(&DependencyKey::from("free"), me), None);
    }

    #[test]
    fn test_panicking_owner_releases_slot() {
        let locks = KeyLocks::default();
        let key = DependencyKey::from("k");

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            locks.with_lock(&key, || -> DiResult<()> { panic!("provider blew up") })
        }));
        assert!(result.is_err());
        assert_eq!(locks.pending(), 0);
        assert!(locks.table.lock().owners.is_empty());
        assert!(locks.with_lock(&key, || Ok(1)).is_ok());
    }
}
