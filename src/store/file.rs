//! Filesystem store with atomic writes.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use super::Store;
use crate::Result;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Store backed by the local filesystem.
///
/// Writes go to a hidden sibling temp file which is then renamed over the
/// target, so a concurrent reader (e.g. the monitor) sees either the old or
/// the new content.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileStore;

impl FileStore {
    /// Create a filesystem store.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Store for FileStore {
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("blob");
        let tmp = path.with_file_name(format!(
            ".{name}.tmp.{}.{}.{}",
            std::process::id(),
            Utc::now().timestamp_micros(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn delete(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn exists(&self, path: &Path) -> Result<bool> {
        Ok(path.try_exists()?)
    }

    fn list_dirs(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}
