// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Hashing used throughout the crate: xxh3 for key hashes stored in index
//! entries (stable across process restarts is not required — the index is
//! rebuilt from segments on recovery), ahash for the manifest/segment-table
//! hash maps where DoS resistance doesn't matter but raw speed does.

pub(crate) type HashMap<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;

/// Computes the 64-bit hash stored alongside an index entry.
///
/// A 64-bit hash is used (rather than re-hashing the key on every probe)
/// because Index Entries store `hash64` directly (spec §3), so a slot scan
/// can reject non-matching entries without touching the key bytes at all.
#[must_use]
pub fn hash64(key: &[u8]) -> u64 {
    xxhash_rust::xxh3::xxh3_64(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash64(b"hello"), hash64(b"hello"));
        assert_ne!(hash64(b"hello"), hash64(b"world"));
    }
}
