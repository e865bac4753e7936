use sha2::{Digest, Sha256};

/// Deterministic, content-addressable key for an image reference.
///
/// The same reference always maps to the same file, across runs and
/// processes, which is what makes repeated fetches idempotent.
pub fn cache_key(reference: &str) -> String {
    hex::encode(Sha256::digest(reference.as_bytes()))
}
