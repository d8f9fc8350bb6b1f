//! Monotonic-msec keyed timer tree (C3): min-lookup, lazy-update,
//! cancellation. One instance per worker, as the source's single per-worker
//! rb-tree of timers (spec §5 "Timers").
//!
//! The source embeds an rb-tree node per event; here the ordering key
//! (expiry in monotonic milliseconds) already *is* the lookup key, so a
//! `BTreeMap<u64, Vec<TimerId>>` gives the same O(log n) min/insert/remove
//! behavior without intrusive nodes, plus an index to find an id's current
//! key for cancellation and the lazy-update rule.

use std::collections::BTreeMap;

pub type TimerId = usize;

/// Re-adding the same event with a new expiry within this many milliseconds
/// of its current expiry is a no-op, to avoid rb-tree churn (spec §3, §8).
pub const LAZY_UPDATE_WINDOW_MS: u64 = 300;

pub struct TimerWheel {
    by_expiry: BTreeMap<u64, Vec<TimerId>>,
    expiry_of: std::collections::HashMap<TimerId, u64>,
    next_id: TimerId,
}

impl TimerWheel {
    pub fn new() -> Self {
        Self {
            by_expiry: BTreeMap::new(),
            expiry_of: std::collections::HashMap::new(),
            next_id: 1,
        }
    }

    fn fresh_id(&mut self) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Schedules a new timer, returning its id.
    pub fn add(&mut self, now_ms: u64, delay_ms: u64) -> TimerId {
        let id = self.fresh_id();
        let expiry = now_ms + delay_ms;
        self.by_expiry.entry(expiry).or_default().push(id);
        self.expiry_of.insert(id, expiry);
        id
    }

    /// Re-arms an existing timer to a new expiry. A no-op if the new expiry
    /// is within `LAZY_UPDATE_WINDOW_MS` of the current one.
    pub fn rearm(&mut self, id: TimerId, new_expiry_ms: u64) {
        let Some(&current) = self.expiry_of.get(&id) else { return };
        let delta = current.abs_diff(new_expiry_ms);
        if delta < LAZY_UPDATE_WINDOW_MS {
            return;
        }
        self.remove_from_bucket(id, current);
        self.by_expiry.entry(new_expiry_ms).or_default().push(id);
        self.expiry_of.insert(id, new_expiry_ms);
    }

    pub fn cancel(&mut self, id: TimerId) {
        if let Some(expiry) = self.expiry_of.remove(&id) {
            self.remove_from_bucket(id, expiry);
        }
    }

    fn remove_from_bucket(&mut self, id: TimerId, expiry: u64) {
        if let Some(bucket) = self.by_expiry.get_mut(&expiry) {
            bucket.retain(|&x| x != id);
            if bucket.is_empty() {
                self.by_expiry.remove(&expiry);
            }
        }
    }

    /// The expiry of the earliest pending timer, if any — drives the
    /// reactor's `poll` timeout.
    pub fn next_expiry(&self) -> Option<u64> {
        self.by_expiry.keys().next().copied()
    }

    /// Pops every timer whose expiry is `<= now_ms`, earliest first.
    pub fn expired(&mut self, now_ms: u64) -> Vec<TimerId> {
        let mut result = Vec::new();
        let expired_keys: Vec<u64> = self.by_expiry.range(..=now_ms).map(|(&k, _)| k).collect();
        for key in expired_keys {
            if let Some(ids) = self.by_expiry.remove(&key) {
                for id in &ids {
                    self.expiry_of.remove(id);
                }
                result.extend(ids);
            }
        }
        result
    }

    pub fn len(&self) -> usize {
        self.expiry_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expiry_of.is_empty()
    }
}

impl Default for TimerWheel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_returns_in_order() {
        let mut w = TimerWheel::new();
        w.add(0, 100);
        w.add(0, 50);
        w.add(0, 75);
        assert_eq!(w.next_expiry(), Some(50));
        let fired = w.expired(80);
        assert_eq!(fired.len(), 2);
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn lazy_update_within_window_is_noop() {
        let mut w = TimerWheel::new();
        let id = w.add(0, 1000);
        w.rearm(id, 1100); // delta 100ms < 300ms window
        assert_eq!(w.next_expiry(), Some(1000));
    }

    #[test]
    fn rearm_outside_window_moves_bucket() {
        let mut w = TimerWheel::new();
        let id = w.add(0, 1000);
        w.rearm(id, 2000); // delta 1000ms >= 300ms
        assert_eq!(w.next_expiry(), Some(2000));
    }

    #[test]
    fn cancel_removes_timer() {
        let mut w = TimerWheel::new();
        let id = w.add(0, 500);
        w.cancel(id);
        assert!(w.is_empty());
        assert!(w.expired(1000).is_empty());
    }
}
