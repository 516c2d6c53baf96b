//! Bounded worker pool for per-item processing
//!
//! Items of one leaf run on a dedicated rayon pool of `max_workers` threads.
//! Completion order is unspecified; the returned outputs are in input order.

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use tracing::{debug, info};

use crate::{Error, Result};

/// Options for one scheduled batch.
#[derive(Debug, Clone)]
pub struct ScheduleOptions<'a> {
    /// Label used in progress logs (the node id)
    pub label: &'a str,
    /// Worker pool size (at least 1)
    pub max_workers: usize,
    /// Log progress at `info` instead of `debug`
    pub show_progress: bool,
}

/// Run `work` over every item on a pool of `max_workers` threads.
///
/// # Errors
///
/// Returns [`Error::Pool`] if the pool cannot be created, or the first error
/// returned by `work`.
pub fn run_items<I, O, F>(items: &[I], options: &ScheduleOptions<'_>, work: F) -> Result<Vec<O>>
where
    I: Sync,
    O: Send,
    F: Fn(&I) -> Result<O> + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.max_workers.max(1))
        .build()
        .map_err(|e| Error::Pool(e.to_string()))?;

    let total = items.len();
    let done = AtomicUsize::new(0);
    let label = options.label;
    pool.install(|| {
        items
            .par_iter()
            .map(|item| {
                let output = work(item)?;
                let completed = done.fetch_add(1, Ordering::Relaxed) + 1;
                if options.show_progress {
                    info!(id = %label, completed, total, "Progress");
                } else {
                    debug!(id = %label, completed, total, "Progress");
                }
                Ok(output)
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::thread;

    fn options(max_workers: usize) -> ScheduleOptions<'static> {
        ScheduleOptions {
            label: "test",
            max_workers,
            show_progress: false,
        }
    }

    #[test]
    fn test_preserves_input_order() {
        let items: Vec<u64> = (0..100).collect();
        let out = run_items(&items, &options(4), |i| Ok(i * 2)).unwrap();
        assert_eq!(out, items.iter().map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_single_worker_uses_one_thread() {
        let threads = Mutex::new(HashSet::new());
        let items: Vec<u32> = (0..20).collect();
        run_items(&items, &options(1), |_| {
            threads.lock().unwrap().insert(thread::current().id());
            Ok(())
        })
        .unwrap();
        assert_eq!(threads.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_error_propagates() {
        let items = vec![1, 2, 3];
        let err = run_items(&items, &options(2), |i| {
            if *i == 2 {
                Err(Error::config("bad item"))
            } else {
                Ok(*i)
            }
        })
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_empty_batch() {
        let items: Vec<u8> = Vec::new();
        assert!(run_items(&items, &options(3), |i| Ok(*i)).unwrap().is_empty());
    }
}
