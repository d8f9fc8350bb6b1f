//! Keyed cache index + LRU (C10; spec §4.5).
//!
//! The source keeps this in a shared-memory rb-tree/LRU guarded by a robust
//! futex so any worker process can look an entry up. This binary runs
//! workers as threads in one process, so a `Mutex<IndexedLru<..>>` gives the
//! same single-writer-per-key guarantee without the shared-memory slab.

use crate::rbtree::IndexedLru;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub valid_sec: u64,
    pub updating_sec: u64,
    pub error_sec: u64,
    pub updating: bool,
    pub lock_time: u64,
    pub refcount: u32,
    pub exists: bool,
    /// Inactive-timeout deadline (spec §4.7: "expire < now" drives manager
    /// eviction). Distinct from `valid_sec`/`updating_sec`/`error_sec`, which
    /// only govern freshness/stale-while-revalidate, not LRU inactivity.
    pub expire: u64,
    pub inactive_secs: u64,
    /// On-disk size of the cached body, for the zone's `max_size_bytes`
    /// budget (spec §4.7). Zero for entries whose size wasn't reported at
    /// store time.
    pub size_bytes: u64,
}

#[derive(Debug, PartialEq, Eq)]
pub enum LookupResult {
    Hit,
    /// Caller should revalidate; `is_updater` is true if this caller won the
    /// right to do so (only one updater per entry at a time).
    Stale { is_updater: bool, use_stale_while: StaleReason },
    Updating,
    Miss,
}

#[derive(Debug, PartialEq, Eq)]
pub enum StaleReason {
    Updating,
    Error,
    None,
}

pub fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// One `keys_zone` worth of cache state.
pub struct CacheZone {
    inner: Mutex<IndexedLru<Vec<u8>, CacheEntry>>,
    pub cold: std::sync::atomic::AtomicBool,
    /// Zone's configured `inactive` window (spec §4.7), set once from
    /// `CacheZoneConfig::inactive_secs` when the zone is wired up in
    /// `Server::new`/`run_cache_managers`. New entries inherit it at
    /// `store` time; a lookup later may call `configure` again if the
    /// config was reloaded.
    default_inactive_secs: std::sync::atomic::AtomicU64,
    /// Running total of `CacheEntry::size_bytes` across the zone, kept in
    /// sync on insert/replace/evict so the manager can check it against
    /// `max_size_bytes` without walking the whole LRU (spec §4.7).
    total_bytes: std::sync::atomic::AtomicU64,
}

impl CacheZone {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(IndexedLru::new()),
            cold: std::sync::atomic::AtomicBool::new(true),
            default_inactive_secs: std::sync::atomic::AtomicU64::new(600),
            total_bytes: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Current sum of stored entries' `size_bytes`, for the manager's
    /// `max_size_bytes` check.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Sets the zone's inactive-timeout window. Idempotent; safe to call
    /// every time the owning `CacheZoneConfig` is (re)read.
    pub fn configure(&self, inactive_secs: u64) {
        self.default_inactive_secs.store(inactive_secs, std::sync::atomic::Ordering::Relaxed);
    }

    /// Inserts or refreshes an entry after a successful fetch, at the LRU
    /// head per spec's "newest at head" ordering. The entry's `expire`
    /// deadline (spec §4.7's inactive-timeout field, distinct from the
    /// freshness windows) is set from the zone's configured `inactive_secs`
    /// and refreshed on every access via `lookup`.
    pub fn store(&self, key: Vec<u8>, valid_sec: u64, updating_sec: u64, error_sec: u64) {
        self.store_sized(key, valid_sec, updating_sec, error_sec, 0)
    }

    /// Same as `store`, but also records the body's on-disk size so the
    /// manager can weigh the zone against `max_size_bytes` (spec §4.7).
    pub fn store_sized(&self, key: Vec<u8>, valid_sec: u64, updating_sec: u64, error_sec: u64, size_bytes: u64) {
        let mut index = self.inner.lock().unwrap();
        let inactive_secs = self.default_inactive_secs.load(std::sync::atomic::Ordering::Relaxed);
        let entry = CacheEntry {
            valid_sec,
            updating_sec,
            error_sec,
            updating: false,
            lock_time: 0,
            refcount: 0,
            exists: true,
            expire: now_secs() + inactive_secs,
            inactive_secs,
            size_bytes,
        };
        if let Some(h) = index.handle_of(&key) {
            let old_size = index.get_by_handle(h).map(|e| e.size_bytes).unwrap_or(0);
            if let Some(e) = index.get_by_handle_mut(h) {
                *e = entry;
            }
            index.touch(&key);
            self.total_bytes.fetch_add(size_bytes, std::sync::atomic::Ordering::Relaxed);
            self.total_bytes.fetch_sub(old_size, std::sync::atomic::Ordering::Relaxed);
        } else {
            index.insert_front(key, entry);
            self.total_bytes.fetch_add(size_bytes, std::sync::atomic::Ordering::Relaxed);
        }
    }

    /// Implements the stale-while-revalidate / cache-lock transition from
    /// spec §4.5 step 5, atomically under the zone lock.
    pub fn lookup(&self, key: &[u8], lock_age_secs: u64) -> LookupResult {
        let mut index = self.inner.lock().unwrap();
        let key_vec = key.to_vec();
        let Some(h) = index.handle_of(&key_vec) else {
            return LookupResult::Miss;
        };
        index.touch(&key_vec);
        let now = now_secs();
        let entry = index.get_by_handle_mut(h).unwrap();
        entry.expire = now + entry.inactive_secs;

        if entry.valid_sec >= now {
            return LookupResult::Hit;
        }

        let stale_updating = entry.valid_sec + entry.updating_sec >= now;
        let stale_error = entry.valid_sec + entry.error_sec >= now;

        if entry.updating && entry.lock_time > now {
            return LookupResult::Updating;
        }

        entry.updating = true;
        entry.lock_time = now + lock_age_secs;

        let reason = if stale_updating {
            StaleReason::Updating
        } else if stale_error {
            StaleReason::Error
        } else {
            StaleReason::None
        };
        LookupResult::Stale { is_updater: true, use_stale_while: reason }
    }

    pub fn finish_update(&self, key: &[u8]) {
        let mut index = self.inner.lock().unwrap();
        if let Some(h) = index.handle_of(&key.to_vec()) {
            if let Some(e) = index.get_by_handle_mut(h) {
                e.updating = false;
                e.lock_time = 0;
            }
        }
    }

    pub fn acquire(&self, key: &[u8]) {
        let mut index = self.inner.lock().unwrap();
        if let Some(h) = index.handle_of(&key.to_vec()) {
            if let Some(e) = index.get_by_handle_mut(h) {
                e.refcount += 1;
            }
        }
    }

    pub fn release(&self, key: &[u8]) {
        let mut index = self.inner.lock().unwrap();
        if let Some(h) = index.handle_of(&key.to_vec()) {
            if let Some(e) = index.get_by_handle_mut(h) {
                e.refcount = e.refcount.saturating_sub(1);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    /// Walks the LRU from the tail, evicting inactive entries, per spec
    /// §4.7's manager loop. Returns the number of entries removed.
    pub fn evict_inactive(&self, budget_files: usize) -> usize {
        let mut index = self.inner.lock().unwrap();
        let now = now_secs();
        let mut evicted = 0;

        while evicted < budget_files {
            let Some(tail) = index.tail_handle() else { break };
            let Some(entry) = index.get_by_handle(tail) else { break };

            if entry.expire >= now {
                break;
            }

            if entry.refcount > 0 {
                // Still referenced but past its expiry: bump to head with a
                // fresh window instead of deleting out from under a reader,
                // matching the "survives worker crashes without leaking
                // shared memory" note in spec §4.7. Logged once by the
                // caller (manager loop), not here, to avoid log spam per
                // zone-lock hold.
                let key = index.key_by_handle(tail).cloned();
                let inactive_secs = entry.inactive_secs;
                if let Some(e) = index.get_by_handle_mut(tail) {
                    e.expire = now + inactive_secs;
                }
                if let Some(key) = key {
                    index.touch(&key);
                }
                break;
            }

            let size_bytes = entry.size_bytes;
            index.remove_by_handle(tail);
            self.total_bytes.fetch_sub(size_bytes, std::sync::atomic::Ordering::Relaxed);
            evicted += 1;
        }

        evicted
    }
}

impl Default for CacheZone {
    fn default() -> Self {
        Self::new()
    }
}

/// All configured cache zones, looked up by `keys_zone` name.
#[derive(Default)]
pub struct CacheIndex {
    zones: std::collections::HashMap<String, std::sync::Arc<CacheZone>>,
}

impl CacheIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zone(&mut self, name: &str) -> std::sync::Arc<CacheZone> {
        std::sync::Arc::clone(
            self.zones
                .entry(name.to_string())
                .or_insert_with(|| std::sync::Arc::new(CacheZone::new())),
        )
    }

    pub fn get_zone(&self, name: &str) -> Option<std::sync::Arc<CacheZone>> {
        self.zones.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entry_is_a_hit() {
        let zone = CacheZone::new();
        let key = b"k1".to_vec();
        zone.store(key.clone(), now_secs() + 60, 30, 30);
        assert_eq!(zone.lookup(&key, 5), LookupResult::Hit);
    }

    #[test]
    fn expired_entry_grants_exactly_one_updater() {
        let zone = CacheZone::new();
        let key = b"k2".to_vec();
        zone.store(key.clone(), now_secs().saturating_sub(5), 30, 30);

        match zone.lookup(&key, 5) {
            LookupResult::Stale { is_updater: true, .. } => {}
            other => panic!("expected first lookup to be the updater: {other:?}"),
        }
        assert_eq!(zone.lookup(&key, 5), LookupResult::Updating);

        zone.finish_update(&key);
        match zone.lookup(&key, 5) {
            LookupResult::Stale { is_updater: true, .. } => {}
            other => panic!("expected a fresh updater after finish_update: {other:?}"),
        }
    }

    #[test]
    fn unknown_key_is_a_miss() {
        let zone = CacheZone::new();
        assert_eq!(zone.lookup(b"nope", 5), LookupResult::Miss);
    }
}
