//! Session state shared by the batch operations
//!
//! A [`Session`] owns the current [`Snapshot`] (the last completed scan) and a
//! single-batch lock. Scans replace the snapshot wholesale; rename, convert and
//! export only ever read it. At most one batch runs at a time: starting a
//! second one fails with [`ImgInfoError::BatchBusy`] instead of waiting.

use chrono::{DateTime, Local};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

use crate::color::ColorEngine;
use crate::convert::{convert_batch, ConversionReport};
use crate::error::{ImgInfoError, Result};
use crate::export::{export_report, ExportFormat};
use crate::progress::{CancelFlag, NoProgress, ProgressSink};
use crate::rename::{rename_batch, RenameReport};
use crate::scan::{scan_directory, ScanReport};
use crate::types::{RecordMap, TargetMode};

/// Immutable result of one completed scan.
#[derive(Debug)]
pub struct Snapshot {
    pub version: u64,
    pub directory: PathBuf,
    pub records: RecordMap,
    pub scanned_at: DateTime<Local>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    Scan,
    Rename,
    Convert,
    Export,
}

impl fmt::Display for BatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BatchKind::Scan => "scan",
            BatchKind::Rename => "rename",
            BatchKind::Convert => "convert",
            BatchKind::Export => "export",
        })
    }
}

#[derive(Debug, Default)]
struct Inner {
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    active: Mutex<Option<BatchKind>>,
    next_version: AtomicU64,
}

/// Held for the duration of a batch; releases the lock on drop.
#[derive(Debug)]
#[must_use = "the batch lock is released as soon as the guard is dropped"]
pub struct BatchGuard {
    inner: Arc<Inner>,
    kind: BatchKind,
}

impl BatchGuard {
    pub fn kind(&self) -> BatchKind {
        self.kind
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let mut active = self.inner.active.lock().unwrap_or_else(|p| p.into_inner());
        *active = None;
        debug!(batch = %self.kind, "Batch lock released");
    }
}

/// Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last published snapshot, if any scan has completed.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.inner
            .snapshot
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn require_snapshot(&self) -> Result<Arc<Snapshot>> {
        self.snapshot().ok_or(ImgInfoError::NoSnapshot)
    }

    pub fn active_batch(&self) -> Option<BatchKind> {
        *self.inner.active.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn begin_batch(&self, kind: BatchKind) -> Result<BatchGuard> {
        let mut active = self.inner.active.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(running) = *active {
            return Err(ImgInfoError::BatchBusy(running.to_string()));
        }
        *active = Some(kind);
        debug!(batch = %kind, "Batch lock taken");
        Ok(BatchGuard {
            inner: Arc::clone(&self.inner),
            kind,
        })
    }

    fn publish(&self, report: ScanReport) -> Arc<Snapshot> {
        let version = self.inner.next_version.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(Snapshot {
            version,
            directory: report.directory,
            records: report.records,
            scanned_at: Local::now(),
        });
        *self.inner.snapshot.write().unwrap_or_else(|p| p.into_inner()) =
            Some(Arc::clone(&snapshot));
        info!(
            version,
            dir = %snapshot.directory.display(),
            records = snapshot.records.len(),
            "Snapshot published"
        );
        snapshot
    }

    /// Scans `dir` and publishes the result. A failed or cancelled scan leaves
    /// the previous snapshot in place.
    pub fn scan(
        &self,
        dir: &Path,
        progress: &dyn ProgressSink,
        cancel: Option<&CancelFlag>,
    ) -> Result<Arc<Snapshot>> {
        let _guard = self.begin_batch(BatchKind::Scan)?;
        self.scan_locked(dir, progress, cancel)
    }

    fn scan_locked(
        &self,
        dir: &Path,
        progress: &dyn ProgressSink,
        cancel: Option<&CancelFlag>,
    ) -> Result<Arc<Snapshot>> {
        let report = scan_directory(dir, progress, cancel)?;
        Ok(self.publish(report))
    }

    /// Renames files of the current snapshot, then rescans so the snapshot
    /// reflects the new names.
    pub fn rename(
        &self,
        progress: &dyn ProgressSink,
        cancel: Option<&CancelFlag>,
    ) -> Result<RenameReport> {
        let _guard = self.begin_batch(BatchKind::Rename)?;
        let snapshot = self.require_snapshot()?;
        let report = rename_batch(&snapshot.directory, &snapshot.records, progress, cancel)?;
        self.refresh_after_rename(&snapshot.directory, &report);
        Ok(report)
    }

    /// A failed refresh is logged, never returned: the rename outcomes must
    /// still reach the caller. Not cancellable, the files were already moved.
    fn refresh_after_rename(&self, dir: &Path, report: &RenameReport) {
        if report.renamed_count() == 0 {
            return;
        }
        if let Err(e) = self.scan_locked(dir, &NoProgress, None) {
            warn!(error = %e, "Rescan after rename failed, snapshot is stale");
        }
    }

    pub fn convert(
        &self,
        target: TargetMode,
        engine: &ColorEngine,
        progress: &dyn ProgressSink,
        cancel: Option<&CancelFlag>,
    ) -> Result<ConversionReport> {
        let _guard = self.begin_batch(BatchKind::Convert)?;
        let snapshot = self.require_snapshot()?;
        convert_batch(&snapshot.directory, &snapshot.records, target, engine, progress, cancel)
    }

    pub fn export(
        &self,
        path: &Path,
        format: ExportFormat,
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        let _guard = self.begin_batch(BatchKind::Export)?;
        let snapshot = self.require_snapshot()?;
        export_report(path, &snapshot.directory, &snapshot.records, format, progress)
    }

    // ═══════════════════════════════════════════════════════════════
    // Background variants: the lock is taken before the thread starts, so a
    // busy session is reported to the caller immediately.
    // ═══════════════════════════════════════════════════════════════

    pub fn spawn_scan<P>(
        &self,
        dir: PathBuf,
        progress: P,
        cancel: Option<CancelFlag>,
    ) -> Result<JoinHandle<Result<Arc<Snapshot>>>>
    where
        P: ProgressSink + Send + 'static,
    {
        let guard = self.begin_batch(BatchKind::Scan)?;
        let session = self.clone();
        spawn_batch(guard, move || {
            session.scan_locked(&dir, &progress, cancel.as_ref())
        })
    }

    pub fn spawn_rename<P>(
        &self,
        progress: P,
        cancel: Option<CancelFlag>,
    ) -> Result<JoinHandle<Result<RenameReport>>>
    where
        P: ProgressSink + Send + 'static,
    {
        let guard = self.begin_batch(BatchKind::Rename)?;
        let snapshot = self.require_snapshot()?;
        let session = self.clone();
        spawn_batch(guard, move || {
            let report = rename_batch(
                &snapshot.directory,
                &snapshot.records,
                &progress,
                cancel.as_ref(),
            )?;
            session.refresh_after_rename(&snapshot.directory, &report);
            Ok(report)
        })
    }

    pub fn spawn_convert<P>(
        &self,
        target: TargetMode,
        engine: Arc<ColorEngine>,
        progress: P,
        cancel: Option<CancelFlag>,
    ) -> Result<JoinHandle<Result<ConversionReport>>>
    where
        P: ProgressSink + Send + 'static,
    {
        let guard = self.begin_batch(BatchKind::Convert)?;
        let snapshot = self.require_snapshot()?;
        spawn_batch(guard, move || {
            convert_batch(
                &snapshot.directory,
                &snapshot.records,
                target,
                &engine,
                &progress,
                cancel.as_ref(),
            )
        })
    }
}

fn spawn_batch<T, F>(guard: BatchGuard, work: F) -> Result<JoinHandle<Result<T>>>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let name = format!("img-info-{}", guard.kind());
    std::thread::Builder::new()
        .name(name)
        .spawn(move || {
            let _guard = guard;
            work()
        })
        .map_err(ImgInfoError::Io)
}
