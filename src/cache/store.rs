//! Cache file store (C11; spec §4.6, §6): reading and writing the on-disk
//! hashed file layout described in `header.rs`.

use crate::cache::header::{CacheHeader, KEY_MAGIC};
use crate::cache::path::{cache_path, temp_path};
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

#[derive(Debug)]
pub enum CacheWriteError {
    Io(io::Error),
}

impl std::fmt::Display for CacheWriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheWriteError::Io(e) => write!(f, "cache write failed: {e}"),
        }
    }
}
impl std::error::Error for CacheWriteError {}
impl From<io::Error> for CacheWriteError {
    fn from(e: io::Error) -> Self {
        CacheWriteError::Io(e)
    }
}

pub struct CachedResponse {
    pub header: CacheHeader,
    pub key_parts_joined: String,
    pub body: Vec<u8>,
}

/// Reads a cached file, validating the header's declared `body_start`
/// against the zone's configured offset and the crc32 over the key parts.
/// A mismatch is treated as corruption, per spec §6, and surfaces as `None`
/// so the caller re-fetches from upstream.
pub fn read_cached_response(path: &Path, configured_body_start: u16) -> io::Result<Option<CachedResponse>> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let header = CacheHeader::read_from(&mut file)?;
    if !header.is_consistent_with(configured_body_start) {
        return Ok(None);
    }

    let key_len = header.body_start as usize - header.header_start as usize - KEY_MAGIC.len() - 1;
    let mut magic = [0u8; 6];
    file.read_exact(&mut magic)?;
    if &magic != KEY_MAGIC {
        return Ok(None);
    }

    let mut key_buf = vec![0u8; key_len];
    file.read_exact(&mut key_buf)?;
    let mut newline = [0u8; 1];
    file.read_exact(&mut newline)?;

    let key_parts_joined = String::from_utf8_lossy(&key_buf).into_owned();
    if CacheHeader::compute_crc32(&[&key_parts_joined]) != header.crc32 {
        return Ok(None);
    }

    file.seek(SeekFrom::Start(header.body_start as u64))?;
    let mut body = Vec::new();
    file.read_to_end(&mut body)?;

    Ok(Some(CachedResponse { header, key_parts_joined, body }))
}

/// Writes a fresh cache entry: builds the temp file under a `.DDDDDDDDDD`
/// suffix, then atomically renames it into place so the loader never
/// observes a half-written entry (spec §6).
pub fn write_cached_response(
    base: &str,
    key: &[u8; 16],
    levels: &str,
    key_parts: &[&str],
    body: &[u8],
    valid_sec: u64,
    updating_sec: u64,
    error_sec: u64,
    sequence: u64,
) -> Result<std::path::PathBuf, CacheWriteError> {
    let key_blob = key_parts.join("");
    let header_start = CacheHeader::new(0).header_start;
    let body_start = header_start as usize + KEY_MAGIC.len() + key_blob.len() + 1;

    let mut header = CacheHeader::new(body_start as u16);
    header.valid_sec = valid_sec;
    header.updating_sec = updating_sec;
    header.error_sec = error_sec;
    header.crc32 = CacheHeader::compute_crc32(&[&key_blob]);

    let tmp = temp_path(base, key, levels, sequence);
    if let Some(parent) = tmp.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = File::create(&tmp)?;
    header.write_to(&mut file)?;
    file.write_all(KEY_MAGIC)?;
    file.write_all(key_blob.as_bytes())?;
    file.write_all(b"\n")?;
    file.write_all(body)?;
    file.sync_all()?;

    let dest = cache_path(base, key, levels);
    fs::rename(&tmp, &dest)?;
    Ok(dest)
}

/// Snapshot of the file identity a header-only update must still match
/// before it's safe to overwrite in place (spec §4.6: `uniq`+size+version+
/// crc+header-start+body-start). Captured at the time the caller last read
/// the entry (e.g. the lookup that triggered revalidation).
pub struct ExpectedCacheFile {
    pub inode: u64,
    pub size: u64,
    pub version_tag: u64,
    pub crc32: u32,
    pub header_start: u16,
    pub body_start: u16,
}

/// Header-only in-place update, for a 304 revalidation that refreshes
/// freshness windows without refetching the body (spec §4.6). Reopens the
/// file and verifies it is still the same content the caller last saw
/// before touching it; any mismatch (rotated file, concurrent rewrite)
/// aborts silently, leaving the file untouched, per spec.
pub fn update_header_only(
    path: &Path,
    expected: &ExpectedCacheFile,
    valid_sec: u64,
    updating_sec: u64,
    error_sec: u64,
) -> io::Result<()> {
    use std::os::unix::fs::MetadataExt;

    let mut file = fs::OpenOptions::new().read(true).write(true).open(path)?;
    let metadata = file.metadata()?;
    if metadata.ino() != expected.inode || metadata.len() != expected.size {
        return Ok(());
    }

    let mut header = CacheHeader::read_from(&mut file)?;
    if header.version_tag != expected.version_tag
        || header.crc32 != expected.crc32
        || header.header_start != expected.header_start
        || header.body_start != expected.body_start
    {
        return Ok(());
    }

    header.valid_sec = valid_sec;
    header.updating_sec = updating_sec;
    header.error_sec = error_sec;
    file.seek(SeekFrom::Start(0))?;
    header.write_to(&mut file)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_back_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_string_lossy().to_string();
        let key = crate::cache::path::md5_key(&["GET", "http://example.com/"]);

        let dest = write_cached_response(
            &base,
            &key,
            "1:2",
            &["GET", "http://example.com/"],
            b"hello from upstream",
            9_999_999_999,
            30,
            30,
            1,
        )
        .unwrap();

        let configured_body_start = {
            let mut f = File::open(&dest).unwrap();
            CacheHeader::read_from(&mut f).unwrap().body_start
        };

        let cached = read_cached_response(&dest, configured_body_start).unwrap().unwrap();
        assert_eq!(cached.body, b"hello from upstream");
        assert_eq!(cached.header.valid_sec, 9_999_999_999);
    }

    #[test]
    fn corrupt_crc_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_string_lossy().to_string();
        let key = crate::cache::path::md5_key(&["GET", "http://example.com/x"]);

        let dest = write_cached_response(
            &base,
            &key,
            "1:2",
            &["GET", "http://example.com/x"],
            b"body",
            1,
            1,
            1,
            2,
        )
        .unwrap();

        let mut bytes = fs::read(&dest).unwrap();
        // Flip a byte inside the crc32 field.
        bytes[48] ^= 0xFF;
        fs::write(&dest, &bytes).unwrap();

        let result = read_cached_response(&dest, u16::MAX).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn header_only_update_aborts_silently_on_mismatch() {
        use std::os::unix::fs::MetadataExt;

        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_string_lossy().to_string();
        let key = crate::cache::path::md5_key(&["GET", "http://example.com/y"]);

        let dest = write_cached_response(
            &base,
            &key,
            "1:2",
            &["GET", "http://example.com/y"],
            b"original body",
            100,
            30,
            30,
            3,
        )
        .unwrap();

        let bogus = ExpectedCacheFile {
            inode: fs::metadata(&dest).unwrap().ino() + 1,
            size: fs::metadata(&dest).unwrap().len(),
            version_tag: 1,
            crc32: CacheHeader::compute_crc32(&["GET", "http://example.com/y"]),
            header_start: CacheHeader::new(0).header_start,
            body_start: CacheHeader::read_from(&mut File::open(&dest).unwrap()).unwrap().body_start,
        };

        update_header_only(&dest, &bogus, 999, 30, 30).unwrap();

        let header = CacheHeader::read_from(&mut File::open(&dest).unwrap()).unwrap();
        assert_eq!(header.valid_sec, 100, "mismatched inode must leave the header untouched");
    }
}
