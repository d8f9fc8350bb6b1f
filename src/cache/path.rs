//! Cached file path hashing (spec §6).

use std::path::PathBuf;

/// Computes `<base>/<level-dirs>/<hex>` for a 16-byte MD5 key, slicing the
/// level directories off the *tail* of the hex string per `levels` (e.g.
/// `"1:2"` on hex `...89abcdef` gives `.../f/de/0123...89abcdef`).
pub fn cache_path(base: &str, key: &[u8; 16], levels: &str) -> PathBuf {
    let hex = hex_encode(key);
    let mut path = PathBuf::from(base);

    let mut tail = hex.len();
    for part in levels.split(':').filter(|s| !s.is_empty()) {
        let width: usize = part.parse().unwrap_or(0);
        if width == 0 || width > tail {
            continue;
        }
        path.push(&hex[tail - width..tail]);
        tail -= width;
    }

    path.push(&hex);
    path
}

/// In-flight cache files are written under a `.DDDDDDDDDD` (10-digit) temp
/// suffix and renamed into place on completion; the loader skips these.
pub fn temp_path(base: &str, key: &[u8; 16], levels: &str, sequence: u64) -> PathBuf {
    let mut path = cache_path(base, key, levels);
    let name = path.file_name().unwrap().to_string_lossy().to_string();
    path.set_file_name(format!("{name}.{sequence:010}"));
    path
}

pub fn is_temp_filename(name: &str) -> bool {
    match name.rfind('.') {
        Some(idx) => {
            let suffix = &name[idx + 1..];
            suffix.len() == 10 && suffix.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

fn hex_encode(bytes: &[u8; 16]) -> String {
    let mut out = String::with_capacity(32);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

pub fn md5_key(parts: &[&str]) -> [u8; 16] {
    use md5::{Digest, Md5};
    let mut hasher = Md5::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_slice_from_the_tail() {
        let key = [0x01; 16];
        let hex = hex_encode(&key);
        let path = cache_path("/cache", &key, "1:2");
        let s = path.to_string_lossy().to_string();
        let last = &hex[hex.len() - 1..];
        let mid = &hex[hex.len() - 3..hex.len() - 1];
        assert_eq!(s, format!("/cache/{last}/{mid}/{hex}"));
    }

    #[test]
    fn temp_suffix_detection() {
        assert!(is_temp_filename("abcdef.0000000001"));
        assert!(!is_temp_filename("abcdef"));
        assert!(!is_temp_filename("abcdef.12"));
        assert!(!is_temp_filename("abcdef.notdigits"));
    }

    #[test]
    fn md5_key_is_stable() {
        let a = md5_key(&["GET", "http://example.com/"]);
        let b = md5_key(&["GET", "http://example.com/"]);
        assert_eq!(a, b);
    }
}
