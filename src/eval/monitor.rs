//! Summary report monitoring
//!
//! [`monitor`] renders the summary of a root directory once.
//! [`monitor_async`] keeps re-rendering it on a tokio task until
//! [`MonitorHandle::stop`] is awaited, so a report stays current while
//! experiments (possibly in other processes) are running.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use super::summary::Summary;
use super::workspace::Workspace;
use crate::{Error, Result};

/// Default re-render interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Options of [`monitor_async`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorOptions {
    /// Time between renders
    pub interval: Duration,
    /// Re-scan the directory listing on every tick instead of refreshing
    /// the experiments found by the first scan
    pub expect_new_dirs: bool,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            expect_new_dirs: false,
        }
    }
}

impl MonitorOptions {
    /// Set the interval.
    #[must_use]
    pub const fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set `expect_new_dirs`.
    #[must_use]
    pub const fn expect_new_dirs(mut self, expect_new_dirs: bool) -> Self {
        self.expect_new_dirs = expect_new_dirs;
        self
    }
}

/// Scan `root_dir` and write its summary page to `report_path`.
///
/// # Errors
///
/// Returns scan and write errors.
pub fn monitor(workspace: &Workspace, root_dir: &Path, report_path: &Path) -> Result<Summary> {
    let summary = Summary::from_dirs(workspace, root_dir, None)?;
    summary.write_html(workspace.store().as_ref(), report_path)?;
    info!(root = %root_dir.display(), leaves = summary.len(), report = %report_path.display(), "Rendered summary");
    Ok(summary)
}

/// Handle to a running [`monitor_async`] loop.
#[derive(Debug)]
pub struct MonitorHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<Summary>>,
}

impl MonitorHandle {
    /// Whether the loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the loop after a final render and return the final summary.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Monitor`] if the task panicked or was cancelled, and
    /// the error of the final render.
    pub async fn stop(self) -> Result<Summary> {
        // The loop may already be gone; joining reports why.
        let _ = self.stop.send(());
        self.task.await.map_err(|e| Error::Monitor(e.to_string()))?
    }
}

/// Re-render the summary of `root_dir` every `options.interval` on a
/// background task.
///
/// Must be called within a tokio runtime. Failed renders are logged and
/// retried on the next tick.
pub fn monitor_async(
    workspace: &Workspace,
    root_dir: impl Into<PathBuf>,
    report_path: impl Into<PathBuf>,
    options: MonitorOptions,
) -> MonitorHandle {
    let (stop, mut stopped) = oneshot::channel();
    let scan = Scan {
        workspace: workspace.clone(),
        root_dir: root_dir.into(),
        report_path: report_path.into(),
        rescan: options.expect_new_dirs,
    };
    let task = tokio::spawn(async move {
        let mut ticker = time::interval(options.interval);
        let mut summary: Option<Summary> = None;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match scan.run(summary.take()).await {
                        Ok(next) => summary = Some(next),
                        Err((previous, e)) => {
                            warn!(root = %scan.root_dir.display(), error = %e, "Summary render failed");
                            summary = previous;
                        }
                    }
                }
                _ = &mut stopped => break,
            }
        }
        debug!(root = %scan.root_dir.display(), "Monitor stopping");
        scan.run(summary).await.map_err(|(_, e)| e)
    });
    info!(interval = ?options.interval, "Monitor started");
    MonitorHandle { stop, task }
}

struct Scan {
    workspace: Workspace,
    root_dir: PathBuf,
    report_path: PathBuf,
    rescan: bool,
}

type ScanOutcome = std::result::Result<Summary, (Option<Summary>, Error)>;

impl Scan {
    /// One render on the blocking pool; on failure the previous summary is
    /// handed back.
    async fn run(&self, previous: Option<Summary>) -> ScanOutcome {
        let workspace = self.workspace.clone();
        let root_dir = self.root_dir.clone();
        let report_path = self.report_path.clone();
        let rescan = self.rescan;
        let kept = previous.clone();
        let joined = tokio::task::spawn_blocking(move || -> Result<Summary> {
            let summary = match previous {
                Some(summary) if !rescan => {
                    summary.refresh()?;
                    summary
                }
                _ => Summary::from_dirs(&workspace, &root_dir, None)?,
            };
            summary.write_html(workspace.store().as_ref(), &report_path)?;
            debug!(root = %root_dir.display(), leaves = summary.len(), "Rendered summary");
            Ok(summary)
        })
        .await;
        match joined {
            Ok(Ok(summary)) => Ok(summary),
            Ok(Err(e)) => Err((kept, e)),
            Err(e) => Err((kept, Error::Monitor(e.to_string()))),
        }
    }
}
