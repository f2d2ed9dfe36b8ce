//! Batch Processing Module
//!
//! Candidate file collection and per-batch success/failure bookkeeping.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::common_utils::{has_extension, is_hidden_file};

/// Supported raster extensions, compared case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "tiff", "tif"];

/// Collects the regular, non-hidden files directly inside `dir` whose extension
/// is in `extensions`. Symlinks are followed so a linked file counts as the file
/// it points at. The result is sorted by path.
///
/// Fails only when `dir` itself cannot be listed; unreadable entries are skipped.
pub fn collect_files(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("Not a directory: {}", dir.display());
    }
    std::fs::read_dir(dir).with_context(|| format!("Failed to read directory: {}", dir.display()))?;

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable directory entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter(|e| !is_hidden_file(e.path()))
        .filter(|e| has_extension(e.path(), extensions))
        .map(|e| e.path().to_path_buf())
        .collect();

    files.sort();
    Ok(files)
}

/// Per-item tally of one batch run. `total` always equals
/// `succeeded + failed + skipped`.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Failed items in the order they were reported.
    pub errors: Vec<(PathBuf, String)>,
}

impl BatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success(&mut self) {
        self.total += 1;
        self.succeeded += 1;
    }

    pub fn fail(&mut self, path: PathBuf, error: String) {
        self.total += 1;
        self.failed += 1;
        self.errors.push((path, error));
    }

    pub fn skip(&mut self) {
        self.total += 1;
        self.skipped += 1;
    }

    /// Percentage of items that succeeded; an empty batch counts as 100%.
    pub fn success_rate(&self) -> f64 {
        match self.total {
            0 => 100.0,
            n => self.succeeded as f64 * 100.0 / n as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn names(files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_only_top_level_images_are_collected() {
        let dir = TempDir::new().unwrap();
        for name in ["poster.JPG", "logo.png", "scan.tif", ".thumb.jpg", "readme.txt", "clip.webp"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        // a directory with an image extension, holding an image
        fs::create_dir(dir.path().join("CMYK_Converted.png")).unwrap();
        fs::write(dir.path().join("CMYK_Converted.png").join("inner.jpg"), b"x").unwrap();

        let files = collect_files(dir.path(), IMAGE_EXTENSIONS).unwrap();
        assert_eq!(names(&files), vec!["logo.png", "poster.JPG", "scan.tif"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_image_is_collected() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("real.png"), b"x").unwrap();
        std::os::unix::fs::symlink(outside.path().join("real.png"), dir.path().join("link.png"))
            .unwrap();

        let files = collect_files(dir.path(), IMAGE_EXTENSIONS).unwrap();
        assert_eq!(names(&files), vec!["link.png"]);
    }

    #[test]
    fn test_unlistable_paths_are_errors() {
        let dir = TempDir::new().unwrap();
        assert!(collect_files(dir.path(), IMAGE_EXTENSIONS).unwrap().is_empty());
        assert!(collect_files(&dir.path().join("missing"), IMAGE_EXTENSIONS).is_err());

        let file = dir.path().join("a.jpg");
        fs::write(&file, b"x").unwrap();
        assert!(collect_files(&file, IMAGE_EXTENSIONS).is_err());
    }

    #[test]
    fn test_tally_stays_consistent() {
        let mut result = BatchResult::new();
        result.success();
        result.skip();
        result.fail(PathBuf::from("broken.png"), "cannot decode".into());
        result.success();

        assert_eq!((result.total, result.succeeded, result.failed, result.skipped), (4, 2, 1, 1));
        assert_eq!(result.errors, vec![(PathBuf::from("broken.png"), "cannot decode".to_string())]);
        assert!((result.success_rate() - 50.0).abs() < 1e-9);
        assert_eq!(BatchResult::default().success_rate(), 100.0);
    }
}
