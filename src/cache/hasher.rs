//! Key Hasher Module
//!
//! Maps string keys to 64-bit fingerprints used for shard routing.

use std::hash::BuildHasher;

use ahash::RandomState;

// == Key Hasher ==
/// Fast, non-cryptographic key hasher.
///
/// Seeded once per cache instance, so fingerprints are stable for the
/// lifetime of the process but not across restarts.
#[derive(Debug, Clone)]
pub struct KeyHasher {
    state: RandomState,
}

impl KeyHasher {
    /// Creates a hasher with a random per-instance seed.
    pub fn new() -> Self {
        Self {
            state: RandomState::new(),
        }
    }

    /// Returns the 64-bit fingerprint of `key`.
    #[inline]
    pub fn hash(&self, key: &str) -> u64 {
        self.state.hash_one(key)
    }
}

impl Default for KeyHasher {
    fn default() -> Self {
        Self::new()
    }
}
