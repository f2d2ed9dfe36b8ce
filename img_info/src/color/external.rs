//! ImageMagick strategy
//!
//! Writes the RGB buffer to a private temp dir as PNG, runs
//! `magick input.png -colorspace CMYK output.tif` under a hard timeout and
//! reads the TIFF back with the `tiff` crate.

use image::{ImageFormat, RgbImage};
use std::ffi::OsStr;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tiff::decoder::{Decoder, DecodingResult};

use super::{CmykImage, ColorConverter};
use crate::error::StrategyError;

/// ImageMagick 7 first, then the 6.x entry point.
#[cfg(not(windows))]
pub const MAGICK_CANDIDATES: &[&str] = &["magick", "convert"];

/// `convert` on Windows PATH is System32's FAT→NTFS converter.
#[cfg(windows)]
pub const MAGICK_CANDIDATES: &[&str] = &["magick"];

pub const DEFAULT_MAGICK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ExternalStrategy {
    tool: Option<PathBuf>,
    timeout: Duration,
}

impl ExternalStrategy {
    pub const NAME: &'static str = "imagemagick";

    /// Looks the tool up on PATH. A missing tool is not an error here; the
    /// strategy then fails on every call and the chain moves on.
    pub fn discover(timeout: Duration) -> Self {
        Self {
            tool: tool_utils::find_tool(MAGICK_CANDIDATES),
            timeout,
        }
    }

    pub fn with_tool(tool: PathBuf, timeout: Duration) -> Self {
        Self {
            tool: Some(tool),
            timeout,
        }
    }

    pub fn tool(&self) -> Option<&Path> {
        self.tool.as_deref()
    }

    fn tool_label(tool: &Path) -> String {
        tool.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| tool.display().to_string())
    }
}

impl ColorConverter for ExternalStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn to_cmyk(&self, rgb: &RgbImage) -> Result<CmykImage, StrategyError> {
        let tool = self
            .tool
            .as_deref()
            .ok_or_else(|| StrategyError::ToolMissing(MAGICK_CANDIDATES.join(" / ")))?;
        let label = Self::tool_label(tool);

        // removed on drop, including every early return below
        let work = tempfile::Builder::new().prefix("img-info-cmyk-").tempdir()?;
        let input = work.path().join("input.png");
        let output = work.path().join("output.tif");

        rgb.save_with_format(&input, ImageFormat::Png)
            .map_err(|e| StrategyError::Io(std::io::Error::other(e.to_string())))?;

        let args: [&OsStr; 4] = [
            input.as_os_str(),
            OsStr::new("-colorspace"),
            OsStr::new("CMYK"),
            output.as_os_str(),
        ];
        let result = tool_utils::run_with_timeout(tool, &args, self.timeout).map_err(|e| {
            StrategyError::ToolFailed {
                tool: label.clone(),
                code: None,
                stderr: format!("{:#}", e),
            }
        })?;

        if result.timed_out {
            return Err(StrategyError::Timeout {
                tool: label,
                after: self.timeout,
            });
        }
        if !result.success() {
            return Err(StrategyError::ToolFailed {
                tool: label,
                code: result.exit_code,
                stderr: result.stderr.trim().to_string(),
            });
        }

        read_cmyk_tiff(&output)
    }
}

/// Reads an 8-bit interleaved CMYK TIFF.
pub(crate) fn read_cmyk_tiff(path: &Path) -> Result<CmykImage, StrategyError> {
    let bad = |e: tiff::TiffError| StrategyError::BadOutput(e.to_string());

    let file = File::open(path)?;
    let mut decoder = Decoder::new(BufReader::new(file)).map_err(bad)?;
    let (width, height) = decoder.dimensions().map_err(bad)?;
    match decoder.colortype().map_err(bad)? {
        tiff::ColorType::CMYK(8) => {}
        other => {
            return Err(StrategyError::BadOutput(format!(
                "expected 8-bit CMYK, got {:?}",
                other
            )))
        }
    }
    match decoder.read_image().map_err(bad)? {
        DecodingResult::U8(data) => CmykImage::new(width, height, data).ok_or_else(|| {
            StrategyError::BadOutput(format!("pixel buffer does not match {}x{}", width, height))
        }),
        _ => Err(StrategyError::BadOutput("unexpected sample type".into())),
    }
}
