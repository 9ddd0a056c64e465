use std::{borrow::Borrow, collections::HashMap, hash::Hash, num::NonZeroUsize};

use slabmap::SlabMap;

use crate::{Error, Result};


struct CacheNode<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Bounded least-recently-used store.
///
/// Entries live in a [`SlabMap`] and are linked to each other by slab key, so lookup,
/// promotion, insertion and eviction are all O(1).
/// `head` is the most recently used entry and `tail` the least recently used one.
pub struct Cache<K, V> {
    map: HashMap<K, usize>,
    nodes: SlabMap<CacheNode<K, V>>,
    head: Option<usize>,
    tail: Option<usize>,
    capacity: usize,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a cache holding at most `capacity` entries.
    ///
    /// Fails with [`Error::Configuration`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| Error::config("cache capacity must be greater than 0"))?;
        Ok(Self::with_capacity(capacity))
    }

    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            map: HashMap::new(),
            nodes: SlabMap::new(),
            head: None,
            tail: None,
            capacity: capacity.get(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Changes the capacity, evicting least recently used entries that no longer fit.
    ///
    /// Fails with [`Error::Configuration`] if `capacity` is zero.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<()> {
        if capacity < 1 {
            return Err(Error::config("cache capacity must be greater than 0"));
        }
        self.capacity = capacity;
        while self.map.len() > capacity {
            self.evict();
        }
        Ok(())
    }
    pub fn len(&self) -> usize {
        self.map.len()
    }
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns `true` if the key is present. Does not change the recency order.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Gets the value for `key` and marks it as most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = *self.map.get(key)?;
        self.promote(index);
        Some(&self.nodes[index].value)
    }

    /// Mutably gets the value for `key` and marks it as most recently used.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = *self.map.get(key)?;
        self.promote(index);
        Some(&mut self.nodes[index].value)
    }

    /// Inserts or updates `key`, making it the most recently used entry.
    ///
    /// When a new key is inserted into a full cache, the least recently used entry is evicted first.
    pub fn set(&mut self, key: K, value: V) {
        if let Some(&index) = self.map.get(&key) {
            self.nodes[index].value = value;
            self.promote(index);
            return;
        }
        if self.map.len() >= self.capacity {
            self.evict();
        }
        let index = self.nodes.insert(CacheNode {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        });
        self.push_front(index);
        self.map.insert(key, index);
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = self.map.remove(key)?;
        self.detach(index);
        self.nodes.remove(index).map(|node| node.value)
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.nodes.clear();
        self.head = None;
        self.tail = None;
    }

    /// Keys ordered from most to least recently used.
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let node = &self.nodes[cursor?];
            cursor = node.next;
            Some(&node.key)
        })
    }

    fn evict(&mut self) {
        let Some(tail) = self.tail else {
            return;
        };
        self.detach(tail);
        if let Some(node) = self.nodes.remove(tail) {
            self.map.remove(&node.key);
        }
    }

    fn promote(&mut self, index: usize) {
        if self.head == Some(index) {
            return;
        }
        self.detach(index);
        self.push_front(index);
    }

    fn detach(&mut self, index: usize) {
        let node = &mut self.nodes[index];
        let prev = node.prev.take();
        let next = node.next.take();
        match prev {
            Some(prev) => self.nodes[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.nodes[next].prev = prev,
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, index: usize) {
        let head = self.head;
        {
            let node = &mut self.nodes[index];
            node.prev = None;
            node.next = head;
        }
        match head {
            Some(head) => self.nodes[head].prev = Some(index),
            None => self.tail = Some(index),
        }
        self.head = Some(index);
    }
}

impl<K, V> std::fmt::Debug for Cache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("capacity", &self.capacity)
            .field("keys", &self.keys().collect::<Vec<_>>())
            .finish()
    }
}
