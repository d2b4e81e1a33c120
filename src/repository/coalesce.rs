// src/repository/coalesce.rs
//! Single-flight lookup cache
//!
//! Concurrent lookups of the same key share one in-flight call: the first
//! caller runs the lookup, the others block on the same cell and receive its
//! result. Positive results stay cached for the lifetime of the cache;
//! negative ones are dropped so a later caller looks again.

use crate::cache::ArtifactIdentity;
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::debug;

type Cell = Arc<OnceLock<Option<ArtifactIdentity>>>;

/// Per-key single-flight cache of package lookups
pub struct LookupCache<K> {
    entries: DashMap<K, Cell>,
    /// Count of calls answered without running their own lookup
    coalesced_count: AtomicU64,
}

impl<K> LookupCache<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            coalesced_count: AtomicU64::new(0),
        }
    }

    /// Return the cached result for `key`, or run `lookup` exactly once
    /// across concurrent callers
    pub fn get_or_lookup<F>(&self, key: K, lookup: F) -> Option<ArtifactIdentity>
    where
        F: FnOnce() -> Option<ArtifactIdentity>,
    {
        // Clone the cell out so the shard lock is released before blocking
        let cell: Cell = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceLock::new()))
            .clone();

        let mut ran = false;
        let result = cell
            .get_or_init(|| {
                ran = true;
                lookup()
            })
            .clone();

        if !ran {
            self.coalesced_count.fetch_add(1, Ordering::Relaxed);
            if let Some(ref identity) = result {
                debug!("{} previously found in package index", identity);
            }
        } else if result.is_none() {
            self.entries.remove_if(&key, |_, current| Arc::ptr_eq(current, &cell));
        }

        result
    }

    pub fn coalesced_count(&self) -> u64 {
        self.coalesced_count.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K> Default for LookupCache<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
