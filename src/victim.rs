// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Victim-cache delegation: on eviction, a cache may hand an item down to
//! another configured cache instead of dropping it outright (spec §3,
//! "Cache Facade — victim cache"). Delegation is strictly one-way and
//! acyclic: `A`'s victim may be `B`, but `B`'s victim may never (transitively)
//! be `A` again.

use crate::value::ExpireAt;
use std::sync::Arc;

/// What a cache exposes to whatever is using it as a victim. [`crate::Cache`]
/// implements this directly; kept as a trait (rather than every caller
/// depending on the concrete `Cache` type) so the acyclicity check below can
/// be unit-tested without constructing a full cache.
pub trait VictimSink: Send + Sync {
    /// Admits an item evicted from the host cache, at the given rank.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying `put` fails.
    fn admit_from_host(&self, key: &[u8], value: &[u8], expire: ExpireAt, rank: u8) -> crate::Result<()>;

    /// Looks up `key` on a host main-miss (spec §4.5: "on main-miss +
    /// victim-hit"). Returns the value and its stored `expire` if present
    /// and not itself expired.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the backing segment fails.
    fn lookup_for_host(&self, key: &[u8]) -> crate::Result<Option<(crate::Slice, ExpireAt)>>;

    /// Removes `key` from this victim after the host has promoted it into
    /// its own main cache (spec §4.5: "re-inserted into main and deleted
    /// from victim").
    fn remove_for_host(&self, key: &[u8]);
}

/// Hands `key`/`value` down to `victim`, per spec: eviction from the host
/// never blocks on the victim's own admission policy — the victim cache is
/// given every evicted item and decides for itself whether to keep it.
///
/// # Errors
///
/// Returns an error if the victim's `put` fails.
pub fn delegate(
    victim: &Arc<dyn VictimSink>,
    key: &[u8],
    value: &[u8],
    expire: ExpireAt,
    rank: u8,
) -> crate::Result<()> {
    victim.admit_from_host(key, value, expire, rank)
}

/// Validates that the `name -> victim_name` edges across a set of
/// configured caches form a DAG (in practice: a forest of chains, since
/// each cache has at most one victim). Called once at multi-cache startup
/// (spec §3: "no cycles").
///
/// # Errors
///
/// Returns [`crate::Error::InvalidConfig`] if a cycle or a dangling
/// `victim_name` reference is found.
pub fn validate_no_cycles(edges: &[(String, Option<String>)]) -> crate::Result<()> {
    use crate::hash::HashMap;

    let by_name: HashMap<&str, Option<&str>> = edges
        .iter()
        .map(|(name, victim)| (name.as_str(), victim.as_deref()))
        .collect();

    for (name, _) in edges {
        let mut current = name.as_str();
        let mut seen = std::collections::HashSet::new();
        seen.insert(current);

        while let Some(Some(next)) = by_name.get(current) {
            let Some(next_edges) = by_name.get(next) else {
                return Err(crate::Error::InvalidConfig(format!(
                    "cache \"{name}\" has unknown victim \"{next}\""
                )));
            };
            let _ = next_edges;
            if !seen.insert(*next) {
                return Err(crate::Error::InvalidConfig(format!(
                    "victim cache cycle detected starting at \"{name}\""
                )));
            }
            current = next;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink(AtomicUsize);

    impl VictimSink for CountingSink {
        fn admit_from_host(&self, _key: &[u8], _value: &[u8], _expire: ExpireAt, _rank: u8) -> crate::Result<()> {
            self.0.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        fn lookup_for_host(&self, _key: &[u8]) -> crate::Result<Option<(crate::Slice, ExpireAt)>> {
            Ok(None)
        }

        fn remove_for_host(&self, _key: &[u8]) {}
    }

    #[test]
    fn delegate_calls_the_victim() {
        let sink: Arc<dyn VictimSink> = Arc::new(CountingSink(AtomicUsize::new(0)));
        delegate(&sink, b"k", b"v", 0, 0).unwrap();
    }

    #[test]
    fn acyclic_chain_is_valid() {
        let edges = vec![
            ("main".to_string(), Some("cold".to_string())),
            ("cold".to_string(), None),
        ];
        assert!(validate_no_cycles(&edges).is_ok());
    }

    #[test]
    fn direct_cycle_is_rejected() {
        let edges = vec![
            ("a".to_string(), Some("b".to_string())),
            ("b".to_string(), Some("a".to_string())),
        ];
        assert!(validate_no_cycles(&edges).is_err());
    }

    #[test]
    fn dangling_victim_name_is_rejected() {
        let edges = vec![("main".to_string(), Some("ghost".to_string()))];
        assert!(validate_no_cycles(&edges).is_err());
    }
}
