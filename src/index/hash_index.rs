/*!
Double-buffered object index.

Two copies of the same hash map are kept. Readers always work on the copy that is
currently primary and never take a lock that a writer could hold. Writers are
serialised by a mutex and apply every change twice:

1. to the secondary copy, which no reader can enter;
2. the copies are swapped, so readers move to the freshly updated map;
3. the old primary is closed to new readers and the writer waits until the
   readers already inside it have left;
4. the same change is applied to it, after which both copies are identical again.

Each copy carries a reader counter and a "closed" flag. A reader increments the
counter and then checks the flag; a writer sets the flag and then waits for the
counter to drop to zero. Both sides use sequentially consistent operations, so at
least one of them observes the other and a reader never looks at a map that is
being modified.
*/

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
    },
};

use parking_lot::{Mutex, RwLock};

struct IndexCopy<K, V: ?Sized> {
    // Only the writer ever locks this for writing, and only after all readers
    // have drained, so read locks taken by readers are never contended.
    map: RwLock<HashMap<K, Arc<V>>>,
    readers: AtomicU32,
    closed: AtomicBool,
}

impl<K, V: ?Sized> IndexCopy<K, V> {
    fn new(closed: bool) -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
            readers: AtomicU32::new(0),
            closed: AtomicBool::new(closed),
        }
    }

    fn wait_for_readers(&self) {
        while self.readers.load(Ordering::SeqCst) != 0 {
            std::hint::spin_loop();
        }
    }
}

/// Reader registration on one copy; leaves the copy on drop.
struct ReadGuard<'a, K, V: ?Sized> {
    copy: &'a IndexCopy<K, V>,
}

impl<K, V: ?Sized> Drop for ReadGuard<'_, K, V> {
    fn drop(&mut self) {
        self.copy.readers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Read-mostly index from a fixed-width key to a shared object.
///
/// Lookups never block; `put` and `remove` are serialised among themselves and
/// wait only for readers that are already inside the copy being updated.
pub struct HashIndex<K, V: ?Sized> {
    copies: [IndexCopy<K, V>; 2],
    primary: AtomicUsize,
    writer: Mutex<()>,
}

impl<K, V> Default for HashIndex<K, V>
where
    K: Eq + Hash + Clone,
    V: ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> HashIndex<K, V>
where
    K: Eq + Hash + Clone,
    V: ?Sized,
{
    pub fn new() -> Self {
        Self {
            // copy 0 starts as primary; the other one is closed to readers
            copies: [IndexCopy::new(false), IndexCopy::new(true)],
            primary: AtomicUsize::new(0),
            writer: Mutex::new(()),
        }
    }

    fn acquire(&self) -> ReadGuard<'_, K, V> {
        loop {
            let copy = &self.copies[self.primary.load(Ordering::SeqCst)];
            copy.readers.fetch_add(1, Ordering::SeqCst);
            if !copy.closed.load(Ordering::SeqCst) {
                return ReadGuard { copy };
            }
            // a writer took this copy over; retry against the new primary
            copy.readers.fetch_sub(1, Ordering::SeqCst);
            std::hint::spin_loop();
        }
    }

    fn read<R>(&self, f: impl FnOnce(&HashMap<K, Arc<V>>) -> R) -> R {
        let guard = self.acquire();
        let map = guard.copy.map.read();
        f(&map)
    }

    /// Applies `mutation` to both copies following the swap protocol and returns
    /// the result of its first application.
    fn write<R>(&self, mut mutation: impl FnMut(&mut HashMap<K, Arc<V>>) -> R) -> R {
        let _writer = self.writer.lock();
        let primary = self.primary.load(Ordering::SeqCst);
        let secondary = 1 - primary;

        let result = mutation(&mut self.copies[secondary].map.write());

        self.copies[secondary].closed.store(false, Ordering::SeqCst);
        self.primary.store(secondary, Ordering::SeqCst);
        self.copies[primary].closed.store(true, Ordering::SeqCst);
        self.copies[primary].wait_for_readers();

        mutation(&mut self.copies[primary].map.write());
        result
    }

    /// Inserts or replaces the object for `key`. Returns true if an existing entry was replaced.
    pub fn put(&self, key: K, object: Arc<V>) -> bool {
        self.write(|map| map.insert(key.clone(), Arc::clone(&object)).is_some())
    }

    /// Removes `key`; absent keys are ignored.
    pub fn remove(&self, key: &K) {
        self.write(|map| {
            map.remove(key);
        })
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.read(|map| map.get(key).cloned())
    }

    /// First object matching `predicate`, in unspecified order.
    pub fn find(&self, mut predicate: impl FnMut(&V) -> bool) -> Option<Arc<V>> {
        self.read(|map| map.values().find(|v| predicate(v)).cloned())
    }

    pub fn size(&self) -> usize {
        self.read(|map| map.len())
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Snapshot of all objects accepted by `filter`.
    pub fn get_objects(&self, mut filter: impl FnMut(&V) -> bool) -> Vec<Arc<V>> {
        self.read(|map| map.values().filter(|v| filter(v)).cloned().collect())
    }

    /// Calls `callback` for every entry of the current primary copy.
    ///
    /// The callback runs while the copy is held, so it must not write to this index.
    pub fn for_each(&self, mut callback: impl FnMut(&K, &Arc<V>)) {
        self.read(|map| map.iter().for_each(|(k, v)| callback(k, v)))
    }
}
