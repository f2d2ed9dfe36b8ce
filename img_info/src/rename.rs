//! Rename Planner
//!
//! Renames readable images in place to `<base>_<W>x<H>cm<ext>` where W and H
//! are the physical size in whole centimetres. Collisions with files on disk,
//! or with names claimed earlier in the same run, get `_1`, `_2`, ... appended
//! before the extension.
//!
//! The set of existing names is read once per run and updated only after a
//! rename actually succeeds. Renaming is destructive; callers confirm first
//! (see [`plan_renames`] for a dry run).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tool_utils::{split_file_name, BatchResult};
use tracing::{debug, info, warn};

use crate::error::{ImgInfoError, Result};
use crate::progress::{CancelFlag, ProgressEvent, ProgressSink, CANCELLED};
use crate::types::{ImageMetadataRecord, PhysicalSize, RecordMap, RenameOutcome, RenameStatus};

/// `photo.JPG` at 7.62 x 10.16 cm → `photo_8x10cm.jpg`
pub fn target_name(file_name: &str, size: &PhysicalSize) -> String {
    suffixed_name(file_name, size, None)
}

fn suffixed_name(file_name: &str, size: &PhysicalSize, counter: Option<u32>) -> String {
    let (base, ext) = split_file_name(file_name);
    let (w, h) = size.rounded_cm();
    match counter {
        None => format!("{}_{}x{}cm{}", base, w, h, ext.to_lowercase()),
        Some(n) => format!("{}_{}x{}cm_{}{}", base, w, h, n, ext.to_lowercase()),
    }
}

/// One rename that would be performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRename {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone)]
pub struct RenameReport {
    pub directory: PathBuf,
    pub outcomes: Vec<RenameOutcome>,
    /// Files whose resolved name equals their current name; nothing was done.
    pub unchanged: usize,
    pub elapsed: Duration,
}

impl RenameReport {
    /// No readable image was eligible.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty() && self.unchanged == 0
    }

    pub fn renamed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, RenameStatus::Renamed { .. }))
            .count()
    }

    pub fn batch_result(&self) -> BatchResult {
        let mut result = BatchResult::new();
        for outcome in &self.outcomes {
            match &outcome.status {
                RenameStatus::Renamed { .. } => result.success(),
                RenameStatus::Skipped(_) => result.skip(),
                RenameStatus::Failed(reason) => {
                    result.fail(PathBuf::from(&outcome.file_name), reason.clone())
                }
            }
        }
        result
    }
}

/// Directory entries captured once per run. Every entry, whatever its type,
/// blocks its name; only regular files are rename candidates.
///
/// Blocking is case-insensitive: on the default macOS and Windows filesystems
/// `fs::rename` onto `PHOTO_8x10cm.jpg` would replace it silently.
struct NameSet {
    /// lowercased name → number of entries with that spelling
    blocked: HashMap<String, usize>,
    files: HashSet<String>,
}

impl NameSet {
    fn capture(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| ImgInfoError::FatalScan {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mut set = Self {
            blocked: HashMap::new(),
            files: HashSet::new(),
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            // follows symlinks, like the scan does
            if entry.path().is_file() {
                set.files.insert(name.clone());
            }
            set.block(&name);
        }
        Ok(set)
    }

    fn block(&mut self, name: &str) {
        *self.blocked.entry(name.to_lowercase()).or_insert(0) += 1;
    }

    fn unblock(&mut self, name: &str) {
        let key = name.to_lowercase();
        if let Some(count) = self.blocked.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                self.blocked.remove(&key);
            }
        }
    }

    fn is_blocked(&self, name: &str) -> bool {
        self.blocked.contains_key(&name.to_lowercase())
    }

    fn is_file(&self, name: &str) -> bool {
        self.files.contains(name)
    }

    /// First free name for `original`. The file's own name, in any case,
    /// never counts as taken, so a case-only change is still a rename.
    fn resolve(&self, original: &str, size: &PhysicalSize) -> String {
        let own = original.to_lowercase();
        let taken = |name: &str| name.to_lowercase() != own && self.is_blocked(name);
        let mut candidate = target_name(original, size);
        let mut counter = 1;
        while taken(&candidate) {
            candidate = suffixed_name(original, size, Some(counter));
            counter += 1;
        }
        candidate
    }

    fn commit(&mut self, original: &str, renamed: &str) {
        self.unblock(original);
        self.block(renamed);
        self.files.remove(original);
        self.files.insert(renamed.to_string());
    }
}

/// Readable records whose file is still in the directory.
fn eligible<'a>(
    records: &'a RecordMap,
    names: &NameSet,
) -> Vec<(&'a String, &'a ImageMetadataRecord, PhysicalSize)> {
    records
        .iter()
        .filter(|(name, _)| names.is_file(name))
        .filter_map(|(name, record)| record.details().map(|d| (name, record, d.physical_size)))
        .collect()
}

/// Dry run: the renames [`rename_batch`] would perform if every one succeeded.
/// Files whose resolved name equals their current name are left out.
pub fn plan_renames(dir: &Path, records: &RecordMap) -> Result<Vec<PlannedRename>> {
    let mut names = NameSet::capture(dir)?;
    let mut plan = Vec::new();
    for (name, _, size) in eligible(records, &names) {
        let to = names.resolve(name, &size);
        if &to != name {
            names.commit(name, &to);
            plan.push(PlannedRename {
                from: name.clone(),
                to,
            });
        }
    }
    Ok(plan)
}

/// Renames every eligible file in `dir`.
///
/// Only a directory that cannot be listed fails the batch; per-file rename
/// errors become `Failed` outcomes and the run continues.
pub fn rename_batch(
    dir: &Path,
    records: &RecordMap,
    progress: &dyn ProgressSink,
    cancel: Option<&CancelFlag>,
) -> Result<RenameReport> {
    let start = Instant::now();
    let mut names = NameSet::capture(dir)?;
    let work = eligible(records, &names);
    let total = work.len();
    info!(dir = %dir.display(), files = total, "Rename started");
    progress.emit(ProgressEvent::Started { total });

    let mut outcomes = Vec::new();
    let mut unchanged = 0;
    for (done, (name, _, size)) in work.into_iter().enumerate() {
        let status = if cancel.is_some_and(CancelFlag::is_cancelled) {
            Some(RenameStatus::Skipped(CANCELLED.to_string()))
        } else {
            let to = names.resolve(name, &size);
            if &to == name {
                debug!(file = %name, "Name already matches physical size");
                unchanged += 1;
                None
            } else {
                match std::fs::rename(dir.join(name), dir.join(&to)) {
                    Ok(()) => {
                        info!(from = %name, to = %to, "Renamed");
                        names.commit(name, &to);
                        Some(RenameStatus::Renamed {
                            from: name.clone(),
                            to,
                        })
                    }
                    Err(source) => {
                        let err = ImgInfoError::RenameIo {
                            from: name.clone(),
                            to,
                            source,
                        };
                        warn!(error = %err, "重命名失败");
                        Some(RenameStatus::Failed(err.to_string()))
                    }
                }
            }
        };

        if let Some(status) = status {
            outcomes.push(RenameOutcome {
                file_name: name.clone(),
                status,
            });
        }
        progress.emit(ProgressEvent::Advanced {
            done: done + 1,
            total,
            name: name.clone(),
        });
    }
    progress.emit(ProgressEvent::Finished { total });

    let report = RenameReport {
        directory: dir.to_path_buf(),
        outcomes,
        unchanged,
        elapsed: start.elapsed(),
    };
    info!(
        dir = %dir.display(),
        renamed = report.renamed_count(),
        unchanged,
        failed = report.batch_result().failed,
        "Rename finished"
    );
    Ok(report)
}
