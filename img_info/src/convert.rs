//! Batch Conversion Coordinator
//!
//! Converts every readable record to the target mode and writes the results
//! into `<source>/<MODE>_Converted/`. Sources are only ever read.
//!
//! Output policy:
//! - CMYK: always `<stem>.jpg`, quality 95, source DPI as JFIF density
//! - RGB: source file name kept; JPEG written at quality 95, other formats
//!   with encoder defaults
//!
//! Each output is written to a hidden temp file in the destination and moved
//! into place once complete, so a failed item never leaves a truncated file.

use image::codecs::jpeg::{JpegEncoder, PixelDensity, PixelDensityUnit};
use image::{ImageFormat, RgbImage};
use std::collections::HashSet;
use std::io::{BufWriter, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tool_utils::{get_extension_lowercase, split_file_name, BatchResult};
use tracing::{debug, error, info, warn};

use crate::color::{CmykImage, ColorEngine, ConvertedImage};
use crate::error::{ImgInfoError, Result};
use crate::extractor::open_image;
use crate::progress::{CancelFlag, ProgressEvent, ProgressSink, CANCELLED};
use crate::types::{
    ConversionOutcome, ConversionStatus, Dpi, ImageMetadataRecord, RecordMap, TargetMode,
};

pub const JPEG_QUALITY: u8 = 95;

#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub target: TargetMode,
    pub destination: PathBuf,
    pub outcomes: Vec<ConversionOutcome>,
    pub elapsed: Duration,
}

impl ConversionReport {
    pub fn converted_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, ConversionStatus::Converted { .. }))
            .count()
    }

    pub fn batch_result(&self) -> BatchResult {
        let mut result = BatchResult::new();
        for outcome in &self.outcomes {
            match &outcome.status {
                ConversionStatus::Converted { .. } => result.success(),
                ConversionStatus::Skipped(_) => result.skip(),
                ConversionStatus::Failed(reason) => {
                    result.fail(PathBuf::from(&outcome.file_name), reason.clone())
                }
            }
        }
        result
    }
}

/// `<source_dir>/CMYK_Converted` or `<source_dir>/RGB_Converted`.
pub fn destination_dir(source_dir: &Path, target: TargetMode) -> PathBuf {
    source_dir.join(target.output_dir_name())
}

/// Converts every error-free record in `records` to `target`.
///
/// Fails as a whole only when the destination directory cannot be created.
/// Items are processed in filename order; anything going wrong with one item
/// is recorded as its `Failed` outcome.
pub fn convert_batch(
    source_dir: &Path,
    records: &RecordMap,
    target: TargetMode,
    engine: &ColorEngine,
    progress: &dyn ProgressSink,
    cancel: Option<&CancelFlag>,
) -> Result<ConversionReport> {
    let start = Instant::now();
    let destination = destination_dir(source_dir, target);
    std::fs::create_dir_all(&destination).map_err(|source| {
        error!(dir = %destination.display(), error = %source, "Cannot create output directory");
        ImgInfoError::DestinationSetup {
            path: destination.clone(),
            source,
        }
    })?;

    let eligible: Vec<(&String, &ImageMetadataRecord)> =
        records.iter().filter(|(_, r)| r.is_ok()).collect();
    let total = eligible.len();
    info!(
        target = %target,
        destination = %destination.display(),
        files = total,
        strategies = ?engine.strategy_names(),
        "Conversion started"
    );
    progress.emit(ProgressEvent::Started { total });

    let mut names = OutputNames::default();
    let mut outcomes = Vec::with_capacity(total);
    for (done, (name, record)) in eligible.into_iter().enumerate() {
        let status = if cancel.is_some_and(CancelFlag::is_cancelled) {
            ConversionStatus::Skipped(CANCELLED.to_string())
        } else {
            catch_unwind(AssertUnwindSafe(|| {
                convert_one(record, target, engine, &destination, &mut names)
            }))
            .unwrap_or_else(|_| ConversionStatus::Failed("unexpected failure during conversion".into()))
        };

        match &status {
            ConversionStatus::Converted { output, strategy } => {
                info!(file = %name, output = %output.display(), strategy, "Converted")
            }
            ConversionStatus::Skipped(reason) => debug!(file = %name, reason = %reason, "Skipped"),
            ConversionStatus::Failed(reason) => warn!(file = %name, reason = %reason, "转换失败"),
        }
        outcomes.push(ConversionOutcome {
            file_name: name.clone(),
            status,
        });
        progress.emit(ProgressEvent::Advanced {
            done: done + 1,
            total,
            name: name.clone(),
        });
    }
    progress.emit(ProgressEvent::Finished { total });

    let report = ConversionReport {
        target,
        destination,
        outcomes,
        elapsed: start.elapsed(),
    };
    let summary = report.batch_result();
    info!(
        target = %target,
        converted = summary.succeeded,
        skipped = summary.skipped,
        failed = summary.failed,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Conversion finished"
    );
    Ok(report)
}

fn convert_one(
    record: &ImageMetadataRecord,
    target: TargetMode,
    engine: &ColorEngine,
    destination: &Path,
    names: &mut OutputNames,
) -> ConversionStatus {
    let Some(details) = record.details() else {
        return ConversionStatus::Failed("record has no metadata".into());
    };
    if details.color_mode == target.color_mode() {
        return ConversionStatus::Skipped(format!("already {}", target));
    }

    let (img, _) = match open_image(&record.source_path) {
        Ok(decoded) => decoded,
        Err(e) => return ConversionStatus::Failed(e.to_string()),
    };
    let conversion = engine.convert(&img, target);
    drop(img);

    let source_name = record.display_name();
    let output = destination.join(names.claim(&output_file_name(&source_name, target)));
    let written = match &conversion.image {
        ConvertedImage::Cmyk(cmyk) => write_output(&output, destination, |w| {
            write_cmyk_jpeg(w, cmyk, &output, details.dpi)
        }),
        ConvertedImage::Rgb(rgb) => write_output(&output, destination, |w| {
            write_rgb(w, rgb, &output, details.dpi)
        }),
    };
    match written {
        Ok(()) => ConversionStatus::Converted {
            output,
            strategy: conversion.strategy,
        },
        Err(e) => ConversionStatus::Failed(e.to_string()),
    }
}

/// CMYK always lands in `.jpg`; RGB keeps the source name.
pub fn output_file_name(source_name: &str, target: TargetMode) -> String {
    match target {
        TargetMode::Cmyk => {
            let (stem, _) = split_file_name(source_name);
            format!("{}.jpg", stem)
        }
        TargetMode::Rgb => source_name.to_string(),
    }
}

/// Output names claimed in this batch. Two sources that map to the same
/// output (`a.png`, `a.jpg` → `a.jpg`) get `_1`, `_2`, ... suffixes.
#[derive(Debug, Default)]
struct OutputNames {
    claimed: HashSet<String>,
}

impl OutputNames {
    fn claim(&mut self, wanted: &str) -> String {
        // case-insensitive filesystems treat A.jpg and a.jpg as the same file
        if self.claimed.insert(wanted.to_lowercase()) {
            return wanted.to_string();
        }
        let (stem, ext) = split_file_name(wanted);
        let mut n = 1u32;
        loop {
            let candidate = format!("{}_{}{}", stem, n, ext);
            if self.claimed.insert(candidate.to_lowercase()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Writes through a temp file in `dir`, then moves it over `output`.
fn write_output<F>(output: &Path, dir: &Path, encode: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&mut std::fs::File>) -> Result<()>,
{
    let io_err = |reason: String| ImgInfoError::ConversionIo {
        path: output.to_path_buf(),
        reason,
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".img-info-")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|e| io_err(e.to_string()))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        encode(&mut writer)?;
        writer.flush().map_err(|e| io_err(e.to_string()))?;
    }
    tmp.persist(output).map_err(|e| io_err(e.error.to_string()))?;
    Ok(())
}

fn write_cmyk_jpeg<W: Write>(writer: &mut W, cmyk: &CmykImage, output: &Path, dpi: Dpi) -> Result<()> {
    let (width, height) = jpeg_dimensions(output, cmyk.width, cmyk.height)?;
    let mut encoder = jpeg_encoder::Encoder::new(writer, JPEG_QUALITY);
    encoder.set_density(jpeg_encoder::Density::Inch {
        x: clamp_density(dpi.x),
        y: clamp_density(dpi.y),
    });
    encoder
        .encode(cmyk.as_raw(), width, height, jpeg_encoder::ColorType::Cmyk)
        .map_err(|e| ImgInfoError::ConversionIo {
            path: output.to_path_buf(),
            reason: format!("CMYK JPEG encoding failed: {}", e),
        })
}

fn write_rgb<W: Write>(writer: &mut W, rgb: &RgbImage, output: &Path, dpi: Dpi) -> Result<()> {
    let ext = get_extension_lowercase(output);
    if ext == "jpg" || ext == "jpeg" {
        jpeg_dimensions(output, rgb.width(), rgb.height())?;
        let mut encoder = JpegEncoder::new_with_quality(writer, JPEG_QUALITY);
        encoder.set_pixel_density(PixelDensity {
            density: (clamp_density(dpi.x), clamp_density(dpi.y)),
            unit: PixelDensityUnit::Inches,
        });
        encoder.encode_image(rgb)?;
        return Ok(());
    }

    let format = ImageFormat::from_extension(&ext).ok_or_else(|| ImgInfoError::ConversionIo {
        path: output.to_path_buf(),
        reason: format!("no encoder for extension '{}'", ext),
    })?;
    // image's writers need Seek for some formats, so encode into memory first
    let mut buf = std::io::Cursor::new(Vec::new());
    rgb.write_to(&mut buf, format)?;
    writer.write_all(buf.get_ref())?;
    Ok(())
}

fn jpeg_dimensions(output: &Path, width: u32, height: u32) -> Result<(u16, u16)> {
    match (u16::try_from(width), u16::try_from(height)) {
        (Ok(w), Ok(h)) => Ok((w, h)),
        _ => Err(ImgInfoError::ConversionIo {
            path: output.to_path_buf(),
            reason: format!("{}x{} exceeds the JPEG size limit of 65535", width, height),
        }),
    }
}

fn clamp_density(v: u32) -> u16 {
    v.min(u32::from(u16::MAX)) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::extract;
    use crate::progress::{NoProgress, ProgressTracker, RecordingSink};
    use image::{ImageBuffer, Rgb, Rgba, RgbaImage};
    use tempfile::TempDir;

    fn scan(dir: &Path) -> RecordMap {
        tool_utils::collect_files(dir, tool_utils::batch::IMAGE_EXTENSIONS)
            .unwrap()
            .iter()
            .map(|p| extract(p))
            .collect()
    }

    #[test]
    fn test_output_file_name() {
        assert_eq!(output_file_name("scan.PNG", TargetMode::Cmyk), "scan.jpg");
        assert_eq!(output_file_name("a.b.tiff", TargetMode::Cmyk), "a.b.jpg");
        assert_eq!(output_file_name("scan.PNG", TargetMode::Rgb), "scan.PNG");
    }

    #[test]
    fn test_output_names_collide_with_suffix() {
        let mut names = OutputNames::default();
        assert_eq!(names.claim("a.jpg"), "a.jpg");
        assert_eq!(names.claim("a.jpg"), "a_1.jpg");
        assert_eq!(names.claim("A.jpg"), "A_2.jpg");
        assert_eq!(names.claim("b.jpg"), "b.jpg");
    }

    #[test]
    fn test_png_to_cmyk_writes_jpeg_with_density() {
        let dir = TempDir::new().unwrap();
        let img: RgbaImage = ImageBuffer::from_pixel(10, 6, Rgba([255, 0, 0, 255]));
        img.save(dir.path().join("red.png")).unwrap();
        let records = scan(dir.path());

        let sink = RecordingSink::new();
        let report = convert_batch(
            dir.path(),
            &records,
            TargetMode::Cmyk,
            &ColorEngine::numeric_only(),
            &sink,
            None,
        )
        .unwrap();

        let out = dir.path().join("CMYK_Converted").join("red.jpg");
        assert_eq!(report.destination, dir.path().join("CMYK_Converted"));
        assert_eq!(
            report.outcomes[0].status,
            ConversionStatus::Converted {
                output: out.clone(),
                strategy: "numeric"
            }
        );
        assert!(dir.path().join("red.png").exists());

        let (_, converted) = extract(&out);
        let details = converted.details().unwrap();
        assert_eq!(details.color_mode, crate::types::ColorMode::Cmyk);
        assert_eq!(details.pixel_size.width, 10);
        assert_eq!(details.dpi, Dpi { x: 72, y: 72 });

        let mut tracker = ProgressTracker::new();
        for e in sink.events() {
            tracker.apply(&e);
        }
        assert_eq!(tracker.percent(), 100.0);
    }

    #[test]
    fn test_already_target_mode_is_skipped_without_writing() {
        let dir = TempDir::new().unwrap();
        let img: image::RgbImage = ImageBuffer::from_pixel(4, 4, Rgb([1, 2, 3]));
        img.save(dir.path().join("plain.png")).unwrap();
        let records = scan(dir.path());

        let report = convert_batch(
            dir.path(),
            &records,
            TargetMode::Rgb,
            &ColorEngine::numeric_only(),
            &NoProgress,
            None,
        )
        .unwrap();
        assert!(matches!(report.outcomes[0].status, ConversionStatus::Skipped(_)));
        assert_eq!(std::fs::read_dir(&report.destination).unwrap().count(), 0);
        assert_eq!(report.batch_result().skipped, 1);
    }

    #[test]
    fn test_rgba_to_rgb_keeps_extension() {
        let dir = TempDir::new().unwrap();
        let img: RgbaImage = ImageBuffer::from_pixel(3, 3, Rgba([0, 0, 0, 0]));
        img.save(dir.path().join("clear.png")).unwrap();
        let records = scan(dir.path());

        let report = convert_batch(
            dir.path(),
            &records,
            TargetMode::Rgb,
            &ColorEngine::numeric_only(),
            &NoProgress,
            None,
        )
        .unwrap();
        let out = report.destination.join("clear.png");
        assert_eq!(report.converted_count(), 1);
        let back = image::open(&out).unwrap();
        assert!(!back.color().has_alpha());
        assert_eq!(back.to_rgb8().get_pixel(1, 1).0, [255, 255, 255]);
    }

    #[test]
    fn test_failures_and_errors_are_isolated() {
        let dir = TempDir::new().unwrap();
        let img: RgbaImage = ImageBuffer::from_pixel(2, 2, Rgba([9, 9, 9, 255]));
        img.save(dir.path().join("good.png")).unwrap();
        let mut records = scan(dir.path());
        // readable at scan time, gone by conversion time
        let vanished = dir.path().join("vanished.png");
        img.save(&vanished).unwrap();
        records.insert("vanished.png".into(), extract(&vanished).1);
        std::fs::remove_file(&vanished).unwrap();
        // error records are not eligible at all
        records.insert(
            "broken.png".into(),
            ImageMetadataRecord::failed(dir.path().join("broken.png"), "corrupt"),
        );

        let report = convert_batch(
            dir.path(),
            &records,
            TargetMode::Cmyk,
            &ColorEngine::numeric_only(),
            &NoProgress,
            None,
        )
        .unwrap();
        assert_eq!(report.outcomes.len(), 2);
        let result = report.batch_result();
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed, 1);
    }

    #[test]
    fn test_cancelled_batch_reports_every_item() {
        let dir = TempDir::new().unwrap();
        for i in 0..3 {
            let img: RgbaImage = ImageBuffer::from_pixel(2, 2, Rgba([i, 0, 0, 255]));
            img.save(dir.path().join(format!("f{}.png", i))).unwrap();
        }
        let records = scan(dir.path());
        let cancel = CancelFlag::new();
        cancel.cancel();

        let report = convert_batch(
            dir.path(),
            &records,
            TargetMode::Cmyk,
            &ColorEngine::numeric_only(),
            &NoProgress,
            Some(&cancel),
        )
        .unwrap();
        assert_eq!(report.outcomes.len(), 3);
        assert!(report
            .outcomes
            .iter()
            .all(|o| o.status == ConversionStatus::Skipped(CANCELLED.into())));
    }

    #[test]
    fn test_destination_setup_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        // a file where the output directory should go
        std::fs::write(dir.path().join("CMYK_Converted"), b"x").unwrap();
        let err = convert_batch(
            dir.path(),
            &RecordMap::new(),
            TargetMode::Cmyk,
            &ColorEngine::numeric_only(),
            &NoProgress,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ImgInfoError::DestinationSetup { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_same_stem_sources_do_not_overwrite_each_other() {
        let dir = TempDir::new().unwrap();
        let img: RgbaImage = ImageBuffer::from_pixel(2, 2, Rgba([0, 200, 0, 255]));
        img.save(dir.path().join("leaf.png")).unwrap();
        img.save(dir.path().join("leaf.bmp")).unwrap();
        let records = scan(dir.path());

        let report = convert_batch(
            dir.path(),
            &records,
            TargetMode::Cmyk,
            &ColorEngine::numeric_only(),
            &NoProgress,
            None,
        )
        .unwrap();
        assert_eq!(report.converted_count(), 2);
        assert!(report.destination.join("leaf.jpg").exists());
        assert!(report.destination.join("leaf_1.jpg").exists());
    }
}
