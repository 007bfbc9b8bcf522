// hasher.rs - SHA-256 helpers shared by the audit chain and snapshot store.
//
// Digests are lowercase hex. `content_id` adds the `sha256:` prefix used
// wherever a hash is shown to users or written into a redacted value.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `data`.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

/// `sha256:<hex>` form of [`hash_bytes`].
pub fn content_id(data: &[u8]) -> String {
    format!("sha256:{}", hash_bytes(data))
}
