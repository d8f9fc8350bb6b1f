//! Event demultiplexer wrapper and connection pool (C4, C5).
//!
//! `mio::Poll` already is the kernel readiness wrapper (epoll/kqueue
//! equivalent); what this module adds on top is everything the spec assigns
//! to C4/C5 beyond that: a posted-event queue drained between readiness
//! batches, a fixed-capacity per-worker connection pool addressed by
//! generational index (defeating stale events against reused fds, spec §9),
//! a reusable-connection LRU for eviction under pool pressure, and the
//! accept-mutex state machine for cross-worker accept load balancing.

use crate::rbtree::IndexedLru;
use std::collections::VecDeque;

/// Generational index into the connection pool (spec §9: "Generational index
/// (slot, generation) keyed into the event demultiplexer; stale events with
/// mismatched generation are discarded"). Packs into a single `mio::Token`
/// via `ConnKey::to_token`/`from_token` so the reactor can hand mio a plain
/// `usize` while still detecting a reused fd's stale event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnKey {
    pub slot: u32,
    pub generation: u32,
}

impl ConnKey {
    pub fn to_token(self) -> mio::Token {
        mio::Token(((self.generation as usize) << 32) | self.slot as usize)
    }

    pub fn from_token(token: mio::Token) -> Self {
        let raw = token.0;
        ConnKey { slot: (raw & 0xFFFF_FFFF) as u32, generation: (raw >> 32) as u32 }
    }
}

struct Slot<C> {
    conn: Option<C>,
    generation: u32,
}

/// A run-this-later queue of request handles drained by the reactor between
/// readiness batches (spec §4.2 "Subrequest posting", §9
/// "`ngx_http_posted_request_t` linked list").
pub struct PostedQueue<T> {
    queue: VecDeque<T>,
}

impl<T> PostedQueue<T> {
    pub fn new() -> Self {
        Self { queue: VecDeque::new() }
    }

    pub fn post(&mut self, item: T) {
        self.queue.push_back(item);
    }

    pub fn take_all(&mut self) -> Vec<T> {
        self.queue.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<T> Default for PostedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub enum AcquireError {
    SlotExhaustion,
}

/// Fixed-capacity per-worker pool of connections, addressed by `ConnKey`.
/// Reusable (idle keepalive) connections additionally live in an LRU so
/// `drain_connections` can evict from the tail under pressure (spec §3,
/// §4.1).
pub struct ConnectionPool<C> {
    slots: Vec<Slot<C>>,
    free: Vec<u32>,
    capacity: usize,
    reusable: IndexedLru<u32, ()>,
}

impl<C> ConnectionPool<C> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            capacity,
            reusable: IndexedLru::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `acquire_connection(fd, log) -> Connection | ErrSlotExhaustion` (spec
    /// §4.1). Zeroes (overwrites) the slot; the generation counter increments
    /// so any in-flight kernel event carrying the old generation is
    /// discarded by `is_current`.
    pub fn acquire<F: FnOnce() -> C>(&mut self, make: F) -> Result<ConnKey, AcquireError> {
        if let Some(slot) = self.free.pop() {
            let generation = self.slots[slot as usize].generation.wrapping_add(1);
            self.slots[slot as usize] = Slot { conn: Some(make()), generation };
            return Ok(ConnKey { slot, generation });
        }
        if self.slots.len() < self.capacity {
            let slot = self.slots.len() as u32;
            self.slots.push(Slot { conn: Some(make()), generation: 0 });
            return Ok(ConnKey { slot, generation: 0 });
        }
        Err(AcquireError::SlotExhaustion)
    }

    pub fn get(&self, key: ConnKey) -> Option<&C> {
        let slot = self.slots.get(key.slot as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.conn.as_ref()
    }

    pub fn get_mut(&mut self, key: ConnKey) -> Option<&mut C> {
        let slot = self.slots.get_mut(key.slot as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.conn.as_mut()
    }

    /// `release_connection(c)`: returns the slot to the free list.
    pub fn release(&mut self, key: ConnKey) -> Option<C> {
        let slot = self.slots.get_mut(key.slot as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let conn = slot.conn.take();
        if conn.is_some() {
            self.reusable.remove_by_key(&key.slot);
            self.free.push(key.slot);
        }
        conn
    }

    /// `mark_reusable(c, yes|no)`: moves the connection in/out of the
    /// reusable LRU.
    pub fn mark_reusable(&mut self, key: ConnKey, yes: bool) {
        if self.get(key).is_none() {
            return;
        }
        if yes {
            if self.reusable.get(&key.slot).is_none() {
                self.reusable.insert_front(key.slot, ());
            } else {
                self.reusable.touch(&key.slot);
            }
        } else {
            self.reusable.remove_by_key(&key.slot);
        }
    }

    pub fn reusable_count(&self) -> usize {
        self.reusable.len()
    }

    /// Evicts up to `min(32, reusable/8)` connections from the LRU tail,
    /// calling `on_evict` with each key's synthetic close before releasing
    /// it. Run once when the pool is exhausted (spec §3).
    ///
    /// The source's `ngx_drain_connections` re-enters the last handler up to
    /// twice in one call (spec §9 open question); this is modeled here as a
    /// second bounded pass sharing the same eviction budget, since a
    /// synthetic close can itself free a further slot synchronously (e.g. a
    /// connection whose close cascades into reaping a CGI child that was
    /// itself occupying a slot).
    pub fn drain_connections(&mut self, mut on_evict: impl FnMut(&mut Self, ConnKey)) -> usize {
        let budget = (self.reusable.len() / 8).min(32);
        let mut evicted = 0;
        for _pass in 0..2 {
            if evicted >= budget {
                break;
            }
            let mut progressed = false;
            while evicted < budget {
                let Some(handle) = self.reusable.tail_handle() else { break };
                let Some(&slot) = self.reusable.key_by_handle(handle) else { break };
                let Some(conn_slot) = self.slots.get(slot as usize) else { break };
                let key = ConnKey { slot, generation: conn_slot.generation };
                self.reusable.remove_by_handle(handle);
                on_evict(self, key);
                evicted += 1;
                progressed = true;
            }
            if !progressed {
                break;
            }
        }
        evicted
    }
}

/// State machine of the accept mutex for one worker (spec §4.1). Only one
/// worker process may hold the mutex at a time; the holder alone enables
/// accept readiness on the shared listen sockets. The master/worker fork
/// model itself is out of scope (spec §1); this crate runs a single worker,
/// so the mutex is always uncontested, but the state machine and
/// `accept_disabled` backoff are implemented in full since they are part of
/// C5's contract, not of the fork model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptMutexState {
    Idle,
    Held,
    Accepting,
}

pub struct AcceptMutex {
    state: AcceptMutexState,
    accept_disabled: i64,
    accepted_since_rearm: u32,
}

impl AcceptMutex {
    pub fn new() -> Self {
        Self { state: AcceptMutexState::Idle, accept_disabled: 0, accepted_since_rearm: 0 }
    }

    /// `accept_disabled` is `connection_n/8 - free_connection_n`; recomputed
    /// once per cycle from the pool's current occupancy.
    pub fn recompute_backoff(&mut self, connection_n: usize, free_connection_n: usize) {
        self.accept_disabled = (connection_n / 8) as i64 - free_connection_n as i64;
    }

    /// Attempts to acquire the mutex for this cycle. Returns `true` if this
    /// worker now holds it and should enable accept events.
    pub fn try_lock(&mut self) -> bool {
        if self.accept_disabled > 0 {
            self.accept_disabled -= 1;
            return false;
        }
        match self.state {
            AcceptMutexState::Idle => {
                self.state = AcceptMutexState::Held;
                true
            }
            AcceptMutexState::Held | AcceptMutexState::Accepting => true,
        }
    }

    pub fn fail_to_lock(&mut self) {
        self.state = AcceptMutexState::Idle;
    }

    /// Call once per accepted connection. Every 16 accepts the mutex is
    /// released so other workers get a turn at the shared listener, even
    /// under edge-triggered exclusive accept (spec §4.1).
    pub fn on_accept(&mut self) {
        self.state = AcceptMutexState::Accepting;
        self.accepted_since_rearm += 1;
        if self.accepted_since_rearm >= 16 {
            self.accepted_since_rearm = 0;
            self.state = AcceptMutexState::Idle;
        } else {
            self.state = AcceptMutexState::Held;
        }
    }

    pub fn state(&self) -> AcceptMutexState {
        self.state
    }
}

impl Default for AcceptMutex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conn_key_token_roundtrip() {
        let key = ConnKey { slot: 42, generation: 7 };
        let token = key.to_token();
        assert_eq!(ConnKey::from_token(token), key);
    }

    #[test]
    fn acquire_release_reuses_slot_with_new_generation() {
        let mut pool: ConnectionPool<u32> = ConnectionPool::new(4);
        let k1 = pool.acquire(|| 1).unwrap();
        assert_eq!(k1.generation, 0);
        pool.release(k1);
        let k2 = pool.acquire(|| 2).unwrap();
        assert_eq!(k2.slot, k1.slot);
        assert_ne!(k2.generation, k1.generation);
        // stale key from before release must not resolve
        assert!(pool.get(k1).is_none());
        assert_eq!(*pool.get(k2).unwrap(), 2);
    }

    #[test]
    fn acquire_fails_when_pool_exhausted() {
        let mut pool: ConnectionPool<u32> = ConnectionPool::new(1);
        pool.acquire(|| 1).unwrap();
        assert!(matches!(pool.acquire(|| 2), Err(AcquireError::SlotExhaustion)));
    }

    #[test]
    fn accept_mutex_backs_off_when_disabled() {
        let mut m = AcceptMutex::new();
        m.recompute_backoff(32, 0); // disabled = 4
        assert!(!m.try_lock());
        assert!(!m.try_lock());
        assert!(!m.try_lock());
        assert!(!m.try_lock());
        assert!(m.try_lock());
    }
}
