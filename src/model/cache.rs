use std::collections::BTreeMap;
use std::collections::HashMap;
use std::hash::Hash;

/// bounded least-recently-used cache. recency is tracked with a monotonic
/// stamp per key; eviction drops the smallest stamp.
pub struct Lru<K, V> {
    capacity: usize,
    stamp: u64,
    entries: HashMap<K, (V, u64)>,
    order: BTreeMap<u64, K>,
}

impl<K, V> Lru<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            capacity,
            stamp: 0,
            entries: HashMap::with_capacity(capacity),
            order: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        self.stamp += 1;
        let stamp = self.stamp;
        match self.entries.get_mut(key) {
            None => None,
            Some((value, old)) => {
                self.order.remove(old);
                self.order.insert(stamp, key.clone());
                *old = stamp;
                Some(value.clone())
            }
        }
    }

    pub fn put(&mut self, key: K, value: V) {
        self.stamp += 1;
        let stamp = self.stamp;
        if let Some((_, old)) = self.entries.remove(&key) {
            self.order.remove(&old);
        }
        self.entries.insert(key.clone(), (value, stamp));
        self.order.insert(stamp, key);
        if self.entries.len() > self.capacity {
            if let Some((_, evicted)) = self.order.pop_first() {
                self.entries.remove(&evicted);
            }
        }
    }
}
