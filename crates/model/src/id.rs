//! Identifier and content-hash helpers.
//!
//! Identifiers are opaque, monotonic strings: a short prefix naming the
//! record family followed by a zero-padded counter. They sort in creation
//! order, which keeps log output and store scans stable across runs.

use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic id generator for one record family.
///
/// Cheap enough to share: a single atomic increment per id. Generators are
/// typically process-wide, one per record family (`asr_`, `rel_`, `rule_`…).
#[derive(Debug)]
pub struct IdGen {
    prefix: &'static str,
    next: AtomicU64,
}

impl IdGen {
    pub const fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            next: AtomicU64::new(1),
        }
    }

    /// Produce the next id, e.g. `asr_000042`.
    pub fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}_{n:06}", self.prefix)
    }
}

/// SHA-256 of the given text, lowercase hex. Used for document content
/// hashes and as the basis of section hashes and dedup keys.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// First 16 hex chars of the content hash; enough entropy for keys that
/// also carry a tenant or document scope.
pub fn short_hash(text: &str) -> String {
    let mut h = content_hash(text);
    h.truncate(16);
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic() {
        let ids = IdGen::new("doc");
        let a = ids.next_id();
        let b = ids.next_id();
        assert!(a < b);
        assert!(a.starts_with("doc_"));
    }

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(short_hash("abc").len(), 16);
    }
}
