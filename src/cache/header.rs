//! Bit-exact on-disk cache header (spec §6). All multi-byte fields are
//! little-endian; the struct is written/read field-by-field rather than
//! transmuted so layout never depends on repr tricks or host endianness.

use std::io::{self, Read, Write};

pub const KEY_MAGIC: &[u8; 6] = b"\nKEY: ";
const MAX_ETAG: usize = 42;
const MAX_VARY: usize = 42;

/// `sizeof(cache_header)` per spec §6: 6 u64 + u32 + 3 u16 + etag_len/etag +
/// vary_len/vary + variant[16].
pub const HEADER_LEN: usize = 6 * 8 + 4 + 3 * 2 + 1 + MAX_ETAG + 1 + MAX_VARY + 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHeader {
    pub version_tag: u64,
    pub valid_sec: u64,
    pub updating_sec: u64,
    pub error_sec: u64,
    pub last_modified: u64,
    pub date: u64,
    pub crc32: u32,
    pub valid_msec: u16,
    pub header_start: u16,
    pub body_start: u16,
    pub etag: Vec<u8>,
    pub vary: Vec<u8>,
    pub variant: [u8; 16],
}

impl CacheHeader {
    pub fn new(body_start: u16) -> Self {
        Self {
            version_tag: 1,
            valid_sec: 0,
            updating_sec: 0,
            error_sec: 0,
            last_modified: 0,
            date: 0,
            crc32: 0,
            valid_msec: 0,
            header_start: HEADER_LEN as u16,
            body_start,
            etag: Vec::new(),
            vary: Vec::new(),
            variant: [0; 16],
        }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.version_tag.to_le_bytes())?;
        w.write_all(&self.valid_sec.to_le_bytes())?;
        w.write_all(&self.updating_sec.to_le_bytes())?;
        w.write_all(&self.error_sec.to_le_bytes())?;
        w.write_all(&self.last_modified.to_le_bytes())?;
        w.write_all(&self.date.to_le_bytes())?;
        w.write_all(&self.crc32.to_le_bytes())?;
        w.write_all(&self.valid_msec.to_le_bytes())?;
        w.write_all(&self.header_start.to_le_bytes())?;
        w.write_all(&self.body_start.to_le_bytes())?;

        let etag_len = self.etag.len().min(MAX_ETAG);
        w.write_all(&[etag_len as u8])?;
        let mut etag_buf = [0u8; MAX_ETAG];
        etag_buf[..etag_len].copy_from_slice(&self.etag[..etag_len]);
        w.write_all(&etag_buf)?;

        let vary_len = self.vary.len().min(MAX_VARY);
        w.write_all(&[vary_len as u8])?;
        let mut vary_buf = [0u8; MAX_VARY];
        vary_buf[..vary_len].copy_from_slice(&self.vary[..vary_len]);
        w.write_all(&vary_buf)?;

        w.write_all(&self.variant)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut u64_buf = [0u8; 8];
        let mut read_u64 = |r: &mut R| -> io::Result<u64> {
            r.read_exact(&mut u64_buf)?;
            Ok(u64::from_le_bytes(u64_buf))
        };

        let version_tag = read_u64(r)?;
        let valid_sec = read_u64(r)?;
        let updating_sec = read_u64(r)?;
        let error_sec = read_u64(r)?;
        let last_modified = read_u64(r)?;
        let date = read_u64(r)?;

        let mut u32_buf = [0u8; 4];
        r.read_exact(&mut u32_buf)?;
        let crc32 = u32::from_le_bytes(u32_buf);

        let mut u16_buf = [0u8; 2];
        let mut read_u16 = |r: &mut R| -> io::Result<u16> {
            r.read_exact(&mut u16_buf)?;
            Ok(u16::from_le_bytes(u16_buf))
        };
        let valid_msec = read_u16(r)?;
        let header_start = read_u16(r)?;
        let body_start = read_u16(r)?;

        let mut len_buf = [0u8; 1];
        r.read_exact(&mut len_buf)?;
        let etag_len = len_buf[0] as usize;
        let mut etag_buf = [0u8; MAX_ETAG];
        r.read_exact(&mut etag_buf)?;

        r.read_exact(&mut len_buf)?;
        let vary_len = len_buf[0] as usize;
        let mut vary_buf = [0u8; MAX_VARY];
        r.read_exact(&mut vary_buf)?;

        let mut variant = [0u8; 16];
        r.read_exact(&mut variant)?;

        Ok(Self {
            version_tag,
            valid_sec,
            updating_sec,
            error_sec,
            last_modified,
            date,
            crc32,
            valid_msec,
            header_start,
            body_start,
            etag: etag_buf[..etag_len.min(MAX_ETAG)].to_vec(),
            vary: vary_buf[..vary_len.min(MAX_VARY)].to_vec(),
            variant,
        })
    }

    /// crc32 is computed over the concatenated key parts (spec §6).
    pub fn compute_crc32(key_parts: &[&str]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        for part in key_parts {
            hasher.update(part.as_bytes());
        }
        hasher.finalize()
    }

    /// A file header claiming a larger `body_start` than the configured
    /// offset is corrupt (spec §6: "may be <=, never >").
    pub fn is_consistent_with(&self, configured_body_start: u16) -> bool {
        self.body_start <= configured_body_start && self.header_start as usize == HEADER_LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrips_byte_for_byte() {
        let mut h = CacheHeader::new(512);
        h.valid_sec = 12345;
        h.etag = b"\"abc123\"".to_vec();
        h.vary = b"Accept-Encoding".to_vec();
        h.variant = [9u8; 16];
        h.crc32 = CacheHeader::compute_crc32(&["GET", "http://example.com/"]);

        let mut buf = Vec::new();
        h.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_LEN);

        let parsed = CacheHeader::read_from(&mut &buf[..]).unwrap();
        assert_eq!(parsed, h);
    }

    #[test]
    fn body_start_greater_than_configured_is_inconsistent() {
        let mut h = CacheHeader::new(1024);
        assert!(h.is_consistent_with(2048));
        h.body_start = 4096;
        assert!(!h.is_consistent_with(2048));
    }
}
