//! Cache loader (spec §4.7): walks a zone's on-disk tree once at startup so
//! warm entries survive a restart, then clears the zone's `cold` flag.

use crate::cache::index::{now_secs, CacheZone};
use crate::cache::path::is_temp_filename;
use std::path::Path;
use std::time::{Duration, Instant};

const KEY_HEX_LEN: usize = 32;

pub struct LoaderStats {
    pub loaded: usize,
    pub skipped: usize,
}

/// Walks `base` recursively, throttled by `files_per_batch` / `sleep` /
/// `threshold_ms`, indexing every file whose name is a bare 32-char hex key
/// (non-hex or `.NNNNNNNNNN`-suffixed names are unfinished temp files and
/// are skipped).
pub fn load_zone(
    zone: &CacheZone,
    base: &str,
    files_per_batch: usize,
    sleep: Duration,
    threshold_ms: u64,
) -> LoaderStats {
    let mut stats = LoaderStats { loaded: 0, skipped: 0 };
    let threshold = Duration::from_millis(threshold_ms);
    let start = Instant::now();
    let mut batch = 0usize;

    walk(Path::new(base), &mut |path, name| {
        if start.elapsed() >= threshold {
            return false;
        }
        if is_temp_filename(name) || name.len() != KEY_HEX_LEN || !name.bytes().all(|b| b.is_ascii_hexdigit()) {
            stats.skipped += 1;
            return true;
        }

        if let Ok(metadata) = std::fs::metadata(path) {
            let valid_sec = now_secs() + 1; // refreshed by the next manager cycle
            zone.store_sized(name.as_bytes().to_vec(), valid_sec, 0, 0, metadata.len());
            stats.loaded += 1;
        }

        batch += 1;
        if batch >= files_per_batch {
            batch = 0;
            std::thread::sleep(sleep);
        }
        true
    });

    zone.cold.store(false, std::sync::atomic::Ordering::Release);
    stats
}

/// Depth-first walk invoking `visit(path, filename)` for every regular
/// file; `visit` returning false aborts the walk early (threshold hit).
fn walk(dir: &Path, visit: &mut impl FnMut(&Path, &str) -> bool) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else { continue };
        if file_type.is_dir() {
            walk(&path, visit);
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        if !visit(&path, name) {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loader_indexes_hex_named_files_and_skips_temp() {
        let dir = tempfile::tempdir().unwrap();
        let hex_name = "0".repeat(KEY_HEX_LEN);
        fs::write(dir.path().join(&hex_name), b"data").unwrap();
        fs::write(dir.path().join(format!("{hex_name}.0000000001")), b"data").unwrap();
        fs::write(dir.path().join("not-hex-at-all"), b"data").unwrap();

        let zone = CacheZone::new();
        let stats = load_zone(&zone, &dir.path().to_string_lossy(), 100, Duration::from_millis(0), 60_000);

        assert_eq!(stats.loaded, 1);
        assert_eq!(stats.skipped, 2);
        assert_eq!(zone.len(), 1);
        assert!(!zone.cold.load(std::sync::atomic::Ordering::Acquire));
    }
}
