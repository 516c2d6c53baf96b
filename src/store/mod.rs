//! Persistence layer for evaluation artifacts
//!
//! Every artifact an evaluation produces (definitions, results, caches, HTML
//! reports) is a small blob addressed by path. The [`Store`] trait is the
//! seam between the engine and wherever those blobs live:
//!
//! - [`FileStore`]: the local filesystem, with atomic write-then-rename
//! - [`MemoryStore`]: a concurrent in-memory map, for tests and dry runs
//!
//! # Example
//!
//! ```rust
//! use std::path::Path;
//! use trueno_eval::store::{MemoryStore, Store};
//!
//! # fn example() -> trueno_eval::Result<()> {
//! let store = MemoryStore::new();
//! store.write(Path::new("/runs/a/result.json"), b"{}")?;
//! assert!(store.exists(Path::new("/runs/a/result.json"))?);
//! assert_eq!(store.list_dirs(Path::new("/runs"))?, vec![Path::new("/runs/a").to_path_buf()]);
//! # Ok(())
//! # }
//! ```

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Result;

/// Blob storage addressed by path.
///
/// Implementations are synchronous: they are called from worker-pool threads
/// and from blocking tasks of the monitor.
pub trait Store: Send + Sync {
    /// Read a blob. Returns `None` if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the blob exists but cannot be read.
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>>;

    /// Write a blob, creating parent directories and replacing any existing
    /// content. Readers never observe a partially written blob.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the blob cannot be written.
    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()>;

    /// Delete a blob. No-op if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the blob exists but cannot be removed.
    fn delete(&self, path: &Path) -> Result<()>;

    /// Check if a blob exists.
    ///
    /// # Errors
    ///
    /// Returns an IO error if existence cannot be determined.
    fn exists(&self, path: &Path) -> Result<bool>;

    /// Immediate subdirectories of `dir`, sorted by path. A missing `dir`
    /// has none.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory cannot be listed.
    fn list_dirs(&self, dir: &Path) -> Result<Vec<PathBuf>>;
}

/// Read and deserialize a JSON blob.
///
/// # Errors
///
/// Returns an error if the blob cannot be read or is not valid JSON for `T`.
pub fn read_json<T: DeserializeOwned>(store: &dyn Store, path: &Path) -> Result<Option<T>> {
    store
        .read(path)?
        .map(|bytes| serde_json::from_slice(&bytes).map_err(Into::into))
        .transpose()
}

/// Serialize a value as pretty JSON and write it.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn write_json<T: Serialize + ?Sized>(store: &dyn Store, path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    store.write(path, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn stores() -> (tempfile::TempDir, Vec<(PathBuf, Box<dyn Store>)>) {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().to_path_buf();
        let stores: Vec<(PathBuf, Box<dyn Store>)> = vec![
            (root, Box::new(FileStore::new())),
            (PathBuf::from("/mem"), Box::new(MemoryStore::new())),
        ];
        (tmp, stores)
    }

    #[test]
    fn test_store_write_read_overwrite() {
        let (_tmp, stores) = stores();
        for (root, store) in &stores {
            let path = root.join("a/b/result.json");
            assert_eq!(store.read(&path).unwrap(), None);
            store.write(&path, b"one").unwrap();
            store.write(&path, b"two").unwrap();
            assert_eq!(store.read(&path).unwrap(), Some(b"two".to_vec()));
        }
    }

    #[test]
    fn test_store_delete_and_exists() {
        let (_tmp, stores) = stores();
        for (root, store) in &stores {
            let path = root.join("x.json");
            assert!(!store.exists(&path).unwrap());
            store.write(&path, b"{}").unwrap();
            assert!(store.exists(&path).unwrap());
            store.delete(&path).unwrap();
            assert!(!store.exists(&path).unwrap());
            store.delete(&path).unwrap();
        }
    }

    #[test]
    fn test_store_list_dirs_sorted_immediate() {
        let (_tmp, stores) = stores();
        for (root, store) in &stores {
            store.write(&root.join("b/experiment.json"), b"{}").unwrap();
            store.write(&root.join("a/nested/deep.json"), b"{}").unwrap();
            store.write(&root.join("top.json"), b"{}").unwrap();
            let dirs = store.list_dirs(root).unwrap();
            assert_eq!(dirs, vec![root.join("a"), root.join("b")]);
            assert!(store.list_dirs(&root.join("missing")).unwrap().is_empty());
        }
    }

    #[test]
    fn test_json_helpers() {
        let store = MemoryStore::new();
        let path = Path::new("/r/value.json");
        write_json(&store, path, &json!({"k": [1, 2]})).unwrap();
        let back: Option<Value> = read_json(&store, path).unwrap();
        assert_eq!(back, Some(json!({"k": [1, 2]})));

        store.write(path, b"not json").unwrap();
        assert!(read_json::<Value>(&store, path).is_err());
    }
}
