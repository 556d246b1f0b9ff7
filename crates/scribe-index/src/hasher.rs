//! Content hashing used for change detection.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 digest of `content` as lowercase hex.
///
/// Two files are considered identical for indexing purposes iff their
/// digests match; timestamps are never consulted.
pub fn content_hash(content: &str) -> String {
    hash_bytes(content.as_bytes())
}

/// Hash raw bytes. `content_hash` goes through this with the UTF-8 encoding.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
