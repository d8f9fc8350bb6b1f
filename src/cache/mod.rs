//! Disk response cache (C10, C11; spec §4.5-§4.7, §6).
//!
//! The source keeps the keyed index in a shared-memory rb-tree + LRU so
//! every worker process sees the same cache state. This process is
//! single-binary/multi-worker-as-threads rather than multi-process, so the
//! index lives behind a `Mutex` instead of a shared-memory slab + robust
//! futex - same single-writer-per-key guarantee, no IPC needed. Everything
//! else (header layout, path hashing, stale-while-revalidate windows, the
//! manager/loader split) is a direct port of spec §4.5-§4.7.

mod header;
mod index;
mod loader;
mod manager;
mod path;
mod store;

pub use header::CacheHeader;
pub use index::{now_secs, CacheIndex, CacheZone, LookupResult};
pub use loader::load_zone;
pub use manager::run_manager_cycle;
pub use path::{cache_path, md5_key};
pub use store::{
    read_cached_response, update_header_only, write_cached_response, CacheWriteError,
    ExpectedCacheFile,
};
