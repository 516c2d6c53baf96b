//! In-memory store implementation using `DashMap`.
//!
//! Data is lost when the store is dropped. Directories are implicit: a
//! directory exists while some blob lives beneath it.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use dashmap::DashMap;

use super::Store;
use crate::Result;

/// In-memory store using a concurrent hashmap.
///
/// Thread-safe for the many-writer pattern of a parallel run: every node
/// writes its own artifacts while others read theirs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: DashMap<PathBuf, Vec<u8>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Check if the store holds no blobs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// All blob paths, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.blobs.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }
}

impl Store for MemoryStore {
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.get(path).map(|v| v.value().clone()))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        self.blobs.insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, path: &Path) -> Result<()> {
        self.blobs.remove(path);
        Ok(())
    }

    fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.blobs.contains_key(path))
    }

    fn list_dirs(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut dirs = BTreeSet::new();
        for entry in &self.blobs {
            let Ok(rest) = entry.key().strip_prefix(dir) else {
                continue;
            };
            let mut components = rest.components();
            if let (Some(first), Some(_)) = (components.next(), components.next()) {
                dirs.insert(dir.join(first));
            }
        }
        Ok(dirs.into_iter().collect())
    }
}
