//! Per-node LM response cache
//!
//! Maps a request fingerprint (LM identity + fully assembled LM input) to
//! the raw response. Each fingerprint owns a slot guarded by its own mutex,
//! so concurrent workers asking for the same fingerprint compute it exactly
//! once: the first holder of the slot calls the LM, the others wait and are
//! served the stored response as hits. Failed LM calls are not cached.
//!
//! Persisted as `cache.json`:
//!
//! ```text
//! { "entries": { "<fingerprint>": "<response>", ... },
//!   "stats":   { "use_cache": true, "num_queries": 2, "num_hits": 0, "num_updates": 2 } }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::result::CacheStats;
use crate::hash::stable_hash_string;
use crate::lm::LmDescriptor;
use crate::store::{read_json, write_json, Store};
use crate::Result;

type Slot = Arc<Mutex<Option<String>>>;

#[derive(Serialize, Deserialize)]
struct CacheFile {
    entries: BTreeMap<String, String>,
    stats: CacheStats,
}

/// Concurrent fingerprint → response cache with usage counters.
#[derive(Debug, Default)]
pub struct LmCache {
    slots: DashMap<String, Slot>,
    queries: AtomicUsize,
    hits: AtomicUsize,
    updates: AtomicUsize,
}

impl LmCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fingerprint of a request.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if the LM identity cannot be encoded.
    pub fn fingerprint(lm: &LmDescriptor, lm_input: &str) -> Result<String> {
        stable_hash_string(&json!({ "lm": lm.identity(), "input": lm_input }))
    }

    /// Load entries from `path`; a missing file yields an empty cache.
    /// Counters always start at zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(store: &dyn Store, path: &Path) -> Result<Self> {
        let cache = Self::new();
        if let Some(file) = read_json::<CacheFile>(store, path)? {
            debug!(path = %path.display(), entries = file.entries.len(), "Loaded LM cache");
            for (key, response) in file.entries {
                cache.slots.insert(key, Arc::new(Mutex::new(Some(response))));
            }
        }
        Ok(cache)
    }

    /// Persist entries and this run's counters to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, store: &dyn Store, path: &Path) -> Result<()> {
        let entries: BTreeMap<String, String> = self
            .slots
            .iter()
            .filter_map(|slot| {
                let value = slot.value().lock().unwrap_or_else(PoisonError::into_inner).clone();
                value.map(|response| (slot.key().clone(), response))
            })
            .collect();
        debug!(path = %path.display(), entries = entries.len(), "Saving LM cache");
        write_json(store, path, &CacheFile {
            entries,
            stats: self.stats(true),
        })
    }

    /// Serve `key` from the cache, or compute it with `compute` and insert.
    ///
    /// Returns the response and whether it was a hit.
    ///
    /// # Errors
    ///
    /// Propagates the error of `compute`; nothing is inserted in that case.
    pub fn get_or_compute<F>(&self, key: &str, compute: F) -> anyhow::Result<(String, bool)>
    where
        F: FnOnce() -> anyhow::Result<String>,
    {
        self.queries.fetch_add(1, Ordering::Relaxed);
        // Clone the slot out so the shard lock is released before waiting.
        let slot: Slot = Arc::clone(self.slots.entry(key.to_string()).or_default().value());
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(response) = guard.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok((response.clone(), true));
        }
        let response = compute()?;
        *guard = Some(response.clone());
        self.updates.fetch_add(1, Ordering::Relaxed);
        Ok((response, false))
    }

    /// Count an item dispatched without consulting the cache.
    pub fn record_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    /// Counters of the current run.
    #[must_use]
    pub fn stats(&self, use_cache: bool) -> CacheStats {
        CacheStats {
            use_cache,
            num_queries: self.queries.load(Ordering::Relaxed),
            num_hits: self.hits.load(Ordering::Relaxed),
            num_updates: self.updates.load(Ordering::Relaxed),
        }
    }

    /// Number of cached responses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.value().lock().map_or(true, |v| v.is_some()))
            .count()
    }

    /// Whether no response is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
