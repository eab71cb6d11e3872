//! LRU Index Module
//!
//! Lookup table and recency list kept together as one structure.
//!
//! Entries live in an arena of slots addressed by index. The slots form a
//! doubly-linked list through `prev`/`next` indices:
//! - Head = Most recently used
//! - Tail = Least recently used
//!
//! A `HashMap<K, usize>` maps each key to its slot, so lookup, reorder,
//! insert and evict are all O(1) amortized. Freed slots are recycled.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

use crate::cache::Entry;

/// Null link in the recency list.
const NIL: usize = usize::MAX;

#[derive(Debug)]
struct Slot<K, V> {
    entry: Option<Entry<K, V>>,
    prev: usize,
    next: usize,
}

// == LRU Index ==
/// Key lookup plus recency ordering over the same set of entries.
#[derive(Debug)]
pub struct LruIndex<K, V> {
    /// Key to slot index
    map: HashMap<K, usize>,
    /// Entry arena
    slots: Vec<Slot<K, V>>,
    /// Recyclable slot indices
    free: Vec<usize>,
    /// Most recently used slot
    head: usize,
    /// Least recently used slot
    tail: usize,
    /// Sum of live entry costs
    total_cost: u64,
}

impl<K, V> Default for LruIndex<K, V> {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            slots: Vec::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            total_cost: 0,
        }
    }
}

impl<K, V> LruIndex<K, V> {
    // == Constructor ==
    /// Creates a new empty index.
    pub fn new() -> Self {
        Self::default()
    }

    // == Length ==
    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the sum of live entry costs.
    pub fn total_cost(&self) -> u64 {
        self.total_cost
    }

    // == Peek LRU ==
    /// Returns the least recently used entry without removing it.
    pub fn peek_lru(&self) -> Option<&Entry<K, V>> {
        if self.tail == NIL {
            return None;
        }
        self.slots[self.tail].entry.as_ref()
    }

    // == Drain ==
    /// Removes every entry, returning them in no particular order.
    pub fn drain(&mut self) -> Vec<Entry<K, V>> {
        let entries = self
            .slots
            .drain(..)
            .filter_map(|slot| slot.entry)
            .collect();
        self.map.clear();
        self.free.clear();
        self.head = NIL;
        self.tail = NIL;
        self.total_cost = 0;
        entries
    }

    // == Iteration ==
    /// Iterates entries from most to least recently used.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            slots: &self.slots,
            current: self.head,
        }
    }
}

impl<K: Hash + Eq + Clone, V> LruIndex<K, V> {
    // == Contains ==
    /// Checks if a key is present without touching recency.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    // == Peek ==
    /// Returns the entry for `key` without touching recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<&Entry<K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.slots[idx].entry.as_ref()
    }

    // == Touch ==
    /// Marks a key as used at `now` and moves it to the front.
    ///
    /// Returns the entry, or None if the key is absent.
    pub fn touch<Q>(&mut self, key: &Q, now: Instant) -> Option<&Entry<K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.move_to_front(idx);
        let entry = self.slots[idx].entry.as_mut()?;
        entry.touch(now);
        Some(&*entry)
    }

    // == Insert ==
    /// Inserts an entry at the front, replacing any entry with the same key.
    ///
    /// On replace the new entry takes over the old slot and the old entry is
    /// returned. With `preserve_created` the old creation time carries over.
    pub fn insert(
        &mut self,
        mut entry: Entry<K, V>,
        preserve_created: bool,
    ) -> Option<Entry<K, V>> {
        if let Some(&idx) = self.map.get(&entry.key) {
            let slot = &mut self.slots[idx];
            if preserve_created {
                if let Some(old) = slot.entry.as_ref() {
                    entry.created_at = old.created_at;
                }
            }
            let new_cost = entry.cost;
            let old = slot.entry.replace(entry);
            let old_cost = old.as_ref().map_or(0, |old| old.cost);
            self.total_cost = self
                .total_cost
                .saturating_sub(old_cost)
                .saturating_add(new_cost);
            self.move_to_front(idx);
            return old;
        }

        let key = entry.key.clone();
        self.total_cost = self.total_cost.saturating_add(entry.cost);
        let idx = self.alloc(entry);
        self.push_front(idx);
        self.map.insert(key, idx);
        None
    }

    // == Remove ==
    /// Removes a key, returning its entry if present.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<Entry<K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = self.map.remove(key)?;
        self.detach(idx)
    }

    // == Pop LRU ==
    /// Removes and returns the least recently used entry.
    pub fn pop_lru(&mut self) -> Option<Entry<K, V>> {
        if self.tail == NIL {
            return None;
        }
        let idx = self.tail;
        let entry = self.detach(idx)?;
        self.map.remove(&entry.key);
        Some(entry)
    }

    // == Eviction Passes ==
    /// Evicts from the tail until at most `count` entries remain, removing
    /// no more than `max` entries.
    pub fn evict_to_count(&mut self, count: usize, max: usize) -> Vec<Entry<K, V>> {
        let mut evicted = Vec::new();
        while self.len() > count && evicted.len() < max {
            match self.pop_lru() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        evicted
    }

    /// Evicts from the tail until the total cost is at most `cost`, removing
    /// no more than `max` entries.
    pub fn evict_to_cost(&mut self, cost: u64, max: usize) -> Vec<Entry<K, V>> {
        let mut evicted = Vec::new();
        while self.total_cost > cost && evicted.len() < max {
            match self.pop_lru() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        evicted
    }

    /// Evicts from the tail while the tail entry is older than `age`,
    /// removing no more than `max` entries.
    ///
    /// Stops at the first tail entry within the limit, so an old entry that
    /// was recently used shields older ones behind it.
    pub fn evict_older_than(
        &mut self,
        age: Duration,
        now: Instant,
        max: usize,
    ) -> Vec<Entry<K, V>> {
        let mut evicted = Vec::new();
        while evicted.len() < max {
            match self.peek_lru() {
                Some(tail) if tail.is_older_than(age, now) => {}
                _ => break,
            }
            match self.pop_lru() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        evicted
    }

    /// Returns true if the tail entry is older than `age`.
    pub fn has_expired_tail(&self, age: Duration, now: Instant) -> bool {
        self.peek_lru()
            .is_some_and(|tail| tail.is_older_than(age, now))
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<K> {
        self.iter().map(|entry| entry.key.clone()).collect()
    }

    // == Integrity ==
    /// Checks that map, list and cost total describe the same entries.
    pub fn is_consistent(&self) -> bool {
        let mut walked = 0usize;
        let mut cost = 0u64;
        let mut prev = NIL;
        let mut current = self.head;

        while current != NIL {
            let Some(slot) = self.slots.get(current) else {
                return false;
            };
            let Some(entry) = slot.entry.as_ref() else {
                return false;
            };
            if slot.prev != prev || self.map.get(&entry.key) != Some(&current) {
                return false;
            }
            walked += 1;
            if walked > self.map.len() {
                return false;
            }
            cost = cost.saturating_add(entry.cost);
            prev = current;
            current = slot.next;
        }

        let free_ok = self
            .free
            .iter()
            .all(|&idx| self.slots.get(idx).is_some_and(|slot| slot.entry.is_none()));

        prev == self.tail
            && walked == self.map.len()
            && cost == self.total_cost
            && walked + self.free.len() == self.slots.len()
            && free_ok
    }

    // == Internal Linked-List Operations ==
    fn alloc(&mut self, entry: Entry<K, V>) -> usize {
        let slot = Slot {
            entry: Some(entry),
            prev: NIL,
            next: NIL,
        };
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = slot;
                idx
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        }
    }

    /// Unlinks a slot, frees it and returns its entry. The map is left to
    /// the caller.
    fn detach(&mut self, idx: usize) -> Option<Entry<K, V>> {
        self.unlink(idx);
        let entry = self.slots[idx].entry.take()?;
        self.free.push(idx);
        self.total_cost = self.total_cost.saturating_sub(entry.cost);
        Some(entry)
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let slot = &self.slots[idx];
            (slot.prev, slot.next)
        };

        if prev != NIL {
            self.slots[prev].next = next;
        } else {
            self.head = next;
        }

        if next != NIL {
            self.slots[next].prev = prev;
        } else {
            self.tail = prev;
        }

        self.slots[idx].prev = NIL;
        self.slots[idx].next = NIL;
    }

    fn push_front(&mut self, idx: usize) {
        self.slots[idx].prev = NIL;
        self.slots[idx].next = self.head;

        if self.head != NIL {
            self.slots[self.head].prev = idx;
        }
        self.head = idx;

        if self.tail == NIL {
            self.tail = idx;
        }
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == idx {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }
}

// == Iterator ==
/// Iterator over entries from most to least recently used.
pub struct Iter<'a, K, V> {
    slots: &'a [Slot<K, V>],
    current: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = &'a Entry<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current == NIL {
            return None;
        }
        let slot = &self.slots[self.current];
        self.current = slot.next;
        slot.entry.as_ref()
    }
}
