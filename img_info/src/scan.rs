//! Batch Scan Coordinator
//!
//! Fans one extraction task per candidate file out onto a bounded rayon pool.
//! Workers hand results back over a crossbeam channel sized to the file count,
//! so a send never blocks a worker; the calling thread drains the channel,
//! folds each pair into the record map and advances progress.
//!
//! A raised [`CancelFlag`] stops dispatch; queued tasks return without
//! extracting. `Finished` is still emitted and the scan reports
//! [`ImgInfoError::Cancelled`] instead of a partial record map.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tool_utils::{batch::IMAGE_EXTENSIONS, BatchResult};
use tracing::{error, info, warn};

use crate::error::{ImgInfoError, Result};
use crate::extractor::extract;
use crate::progress::{CancelFlag, ProgressEvent, ProgressSink};
use crate::types::{display_name, ImageMetadataRecord, RecordMap};

/// Outcome of scanning one directory.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub directory: PathBuf,
    pub records: RecordMap,
    pub pool_size: usize,
    pub elapsed: Duration,
}

impl ScanReport {
    /// True when the directory holds no supported images. No worker was started.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn failed_count(&self) -> usize {
        self.records.values().filter(|r| !r.is_ok()).count()
    }

    pub fn batch_result(&self) -> BatchResult {
        let mut result = BatchResult::new();
        for record in self.records.values() {
            match record.error() {
                None => result.success(),
                Some(e) => result.fail(record.source_path.clone(), e.to_string()),
            }
        }
        result
    }
}

/// Scans `dir` with the default extractor and pool size.
///
/// Fails only when the directory cannot be listed; every per-file problem ends
/// up as an error-bearing record.
pub fn scan_directory(
    dir: &Path,
    progress: &dyn ProgressSink,
    cancel: Option<&CancelFlag>,
) -> Result<ScanReport> {
    let start = Instant::now();
    let files = tool_utils::collect_files(dir, IMAGE_EXTENSIONS).map_err(|e| {
        error!(dir = %dir.display(), error = %e, "Directory scan failed");
        ImgInfoError::FatalScan {
            path: dir.to_path_buf(),
            reason: format!("{:#}", e),
        }
    })?;

    let pool_size = tool_utils::scan_pool_size();
    let records = if files.is_empty() {
        info!(dir = %dir.display(), "No supported images found");
        progress.emit(ProgressEvent::Started { total: 0 });
        progress.emit(ProgressEvent::Finished { total: 0 });
        RecordMap::new()
    } else {
        info!(dir = %dir.display(), files = files.len(), pool_size, "Scan started");
        scan_files_with(&files, pool_size, progress, cancel, extract)?
    };

    let report = ScanReport {
        directory: dir.to_path_buf(),
        records,
        pool_size,
        elapsed: start.elapsed(),
    };
    info!(
        dir = %dir.display(),
        total = report.records.len(),
        failed = report.failed_count(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Scan finished"
    );
    Ok(report)
}

/// Runs `extractor` over `files` on a pool of `pool_size` workers.
///
/// Always yields one record per distinct display name. A panicking extractor
/// becomes an error record for that file only.
pub fn scan_files_with<F>(
    files: &[PathBuf],
    pool_size: usize,
    progress: &dyn ProgressSink,
    cancel: Option<&CancelFlag>,
    extractor: F,
) -> Result<RecordMap>
where
    F: Fn(&Path) -> (String, ImageMetadataRecord) + Sync,
{
    let total = files.len();
    progress.emit(ProgressEvent::Started { total });

    let pool = tool_utils::build_pool(pool_size, "img-scan").map_err(|e| ImgInfoError::FatalScan {
        path: files
            .first()
            .and_then(|p| p.parent())
            .map(Path::to_path_buf)
            .unwrap_or_default(),
        reason: e.to_string(),
    })?;

    let cancelled = || cancel.is_some_and(CancelFlag::is_cancelled);
    // None: the task saw the cancel flag and did no work
    let (tx, rx) = crossbeam_channel::bounded::<Option<(String, ImageMetadataRecord)>>(total.max(1));
    let mut records = RecordMap::new();

    pool.in_place_scope(|scope| {
        for path in files {
            if cancelled() {
                break;
            }
            let tx = tx.clone();
            let extractor = &extractor;
            let cancelled = &cancelled;
            scope.spawn(move |_| {
                if cancelled() {
                    let _ = tx.send(None);
                    return;
                }
                let pair = catch_unwind(AssertUnwindSafe(|| extractor(path))).unwrap_or_else(|panic| {
                    let reason = panic_message(panic.as_ref());
                    warn!(file = %path.display(), reason = %reason, "Extraction panicked");
                    (
                        display_name(path),
                        ImageMetadataRecord::failed(path.clone(), format!("unexpected failure: {}", reason)),
                    )
                });
                let _ = tx.send(Some(pair));
            });
        }
        drop(tx);

        for (done, (name, record)) in rx.iter().flatten().enumerate() {
            records.insert(name.clone(), record);
            progress.emit(ProgressEvent::Advanced {
                done: done + 1,
                total,
                name,
            });
        }
    });

    progress.emit(ProgressEvent::Finished { total });
    if cancelled() {
        warn!(total, extracted = records.len(), "Scan cancelled");
        return Err(ImgInfoError::Cancelled);
    }
    Ok(records)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
