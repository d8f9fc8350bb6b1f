//! Ordered index and LRU list primitives (C2), used by the cache (C10) and
//! conceptually by the timer wheel (C3, which instead uses a `BTreeMap`
//! directly since its ordering key already is the lookup key).
//!
//! The source embeds rb-tree and doubly-linked-list nodes inside each index
//! entry so that removal from the LRU is O(1) given a handle and lookup by
//! key is O(log n). Safe Rust has no intrusive pointers, so per spec §9's
//! prescribed strategy this is a slab of nodes addressed by index ("handle"),
//! a `HashMap<K, usize>` for keyed lookup, and `prev`/`next` indices threading
//! the same slab into a doubly-linked LRU list. Removal by handle is O(1);
//! removal by key is O(1) amortized (hash lookup) instead of the source's
//! O(log n) (rb-tree lookup) — a strict improvement that preserves every
//! invariant the spec actually tests (LRU order, O(1) removal by handle).

use std::collections::HashMap;
use std::hash::Hash;

pub type Handle = usize;

struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<Handle>,
    next: Option<Handle>,
}

/// A keyed index with an independent LRU ordering over the same entries.
/// Newest (most recently touched) lives at the head; eviction walks from the
/// tail, matching the source's "LRU is... newest at head".
pub struct IndexedLru<K, V> {
    slab: Vec<Option<Node<K, V>>>,
    free: Vec<Handle>,
    map: HashMap<K, Handle>,
    head: Option<Handle>,
    tail: Option<Handle>,
    len: usize,
}

impl<K: Eq + Hash + Clone, V> IndexedLru<K, V> {
    pub fn new() -> Self {
        Self {
            slab: Vec::new(),
            free: Vec::new(),
            map: HashMap::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.map.get(key).and_then(|&h| self.slab[h].as_ref()).map(|n| &n.value)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let h = *self.map.get(key)?;
        self.slab[h].as_mut().map(|n| &mut n.value)
    }

    pub fn handle_of(&self, key: &K) -> Option<Handle> {
        self.map.get(key).copied()
    }

    pub fn get_by_handle(&self, h: Handle) -> Option<&V> {
        self.slab.get(h).and_then(|n| n.as_ref()).map(|n| &n.value)
    }

    pub fn key_by_handle(&self, h: Handle) -> Option<&K> {
        self.slab.get(h).and_then(|n| n.as_ref()).map(|n| &n.key)
    }

    pub fn get_by_handle_mut(&mut self, h: Handle) -> Option<&mut V> {
        self.slab.get_mut(h).and_then(|n| n.as_mut()).map(|n| &mut n.value)
    }

    /// Inserts a new entry at the LRU head. Returns the handle. Caller must
    /// ensure `key` is not already present (cache index checks this under
    /// the zone lock before calling).
    pub fn insert_front(&mut self, key: K, value: V) -> Handle {
        let h = match self.free.pop() {
            Some(h) => h,
            None => {
                self.slab.push(None);
                self.slab.len() - 1
            }
        };
        self.slab[h] = Some(Node { key: key.clone(), value, prev: None, next: self.head });
        if let Some(old_head) = self.head {
            if let Some(n) = self.slab[old_head].as_mut() {
                n.prev = Some(h);
            }
        }
        self.head = Some(h);
        if self.tail.is_none() {
            self.tail = Some(h);
        }
        self.map.insert(key, h);
        self.len += 1;
        h
    }

    pub fn remove_by_handle(&mut self, h: Handle) -> Option<(K, V)> {
        if self.slab.get(h).and_then(|n| n.as_ref()).is_none() {
            return None;
        }
        self.unlink_keep_value(h)
    }

    fn unlink_keep_value(&mut self, h: Handle) -> Option<(K, V)> {
        let (prev, next, key, value) = {
            let node = self.slab[h].take()?;
            (node.prev, node.next, node.key, node.value)
        };
        match prev {
            Some(p) => {
                if let Some(n) = self.slab[p].as_mut() {
                    n.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(node) = self.slab[n].as_mut() {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        self.map.remove(&key);
        self.free.push(h);
        self.len -= 1;
        Some((key, value))
    }

    /// Moves an existing entry to the LRU head ("touch"), e.g. on cache hit,
    /// or when the cache manager re-queues a still-referenced expired entry
    /// (spec §4.7 / §9 — deliberately against strict LRU order, preserved).
    pub fn touch(&mut self, key: &K) {
        let Some(&h) = self.map.get(key) else { return };
        if self.head == Some(h) {
            return;
        }
        let (prev, next) = {
            let n = self.slab[h].as_ref().unwrap();
            (n.prev, n.next)
        };
        match prev {
            Some(p) => self.slab[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slab[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
        {
            let n = self.slab[h].as_mut().unwrap();
            n.prev = None;
            n.next = self.head;
        }
        if let Some(old_head) = self.head {
            self.slab[old_head].as_mut().unwrap().prev = Some(h);
        }
        self.head = Some(h);
        if self.tail.is_none() {
            self.tail = Some(h);
        }
    }

    /// Returns the handle at the LRU tail (the next eviction candidate),
    /// without removing it.
    pub fn tail_handle(&self) -> Option<Handle> {
        self.tail
    }

    /// Iterates handles from LRU tail to head (eviction order).
    pub fn iter_from_tail(&self) -> impl Iterator<Item = Handle> + '_ {
        std::iter::successors(self.tail, move |&h| self.slab[h].as_ref().unwrap().prev)
    }
}

impl<K: Eq + Hash + Clone, V> Default for IndexedLru<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone, V> IndexedLru<K, V> {
    pub fn remove_by_key(&mut self, key: &K) -> Option<V> {
        let h = *self.map.get(key)?;
        self.unlink_keep_value(h).map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lru_order() {
        let mut lru: IndexedLru<&str, i32> = IndexedLru::new();
        lru.insert_front("a", 1);
        lru.insert_front("b", 2);
        lru.insert_front("c", 3);
        let order: Vec<_> = lru.iter_from_tail().map(|h| *lru.get_by_handle(h).unwrap()).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn touch_moves_to_head() {
        let mut lru: IndexedLru<&str, i32> = IndexedLru::new();
        lru.insert_front("a", 1);
        lru.insert_front("b", 2);
        lru.insert_front("c", 3);
        lru.touch(&"a");
        let order: Vec<_> = lru.iter_from_tail().map(|h| *lru.get_by_handle(h).unwrap()).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn remove_by_handle_unlinks() {
        let mut lru: IndexedLru<&str, i32> = IndexedLru::new();
        let hb = lru.insert_front("a", 1);
        lru.insert_front("b", 2);
        lru.remove_by_handle(hb);
        assert_eq!(lru.len(), 1);
        assert!(lru.get(&"a").is_none());
        assert_eq!(lru.get(&"b"), Some(&2));
    }

    #[test]
    fn remove_by_key_then_reinsert_reuses_slot() {
        let mut lru: IndexedLru<&str, i32> = IndexedLru::new();
        lru.insert_front("a", 1);
        lru.remove_by_key(&"a");
        assert!(lru.is_empty());
        lru.insert_front("b", 2);
        assert_eq!(lru.get(&"b"), Some(&2));
    }
}
