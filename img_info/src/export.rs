//! Report export
//!
//! CSV with one row per file, sorted by filename:
//!
//! | 文件名 | 像素尺寸 | 物理尺寸(cm) | DPI | 色彩模式 | 文件大小 |
//! |--------|----------|--------------|-----|----------|----------|
//! | photo.jpg | 900x1200 | 7.62x10.16 | 300x300 | RGB | 1.23 MB |
//! | broken.png | 无法读取 | | | | |
//!
//! The CSV starts with a UTF-8 BOM so spreadsheet tools detect the encoding.
//! JSON carries the same records with full structure, thumbnails excluded.

use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::error::{ImgInfoError, Result};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::types::{ImageMetadataRecord, RecordMap};

pub const REPORT_HEADERS: [&str; 6] = ["文件名", "像素尺寸", "物理尺寸(cm)", "DPI", "色彩模式", "文件大小"];

/// Pixel-size cell of a file that could not be read.
pub const UNREADABLE: &str = "无法读取";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

/// `1.50 MB` from 1 MiB up, `N.NN KB` below, `N/A` when unknown.
pub fn format_file_size(size: Option<u64>) -> String {
    const MIB: u64 = 1024 * 1024;
    match size {
        None => "N/A".to_string(),
        Some(bytes) if bytes >= MIB => format!("{:.2} MB", bytes as f64 / MIB as f64),
        Some(bytes) => format!("{:.2} KB", bytes as f64 / 1024.0),
    }
}

/// `<dir>/<dir name>_报告.<ext>`
pub fn default_report_path(dir: &Path, format: ExportFormat) -> PathBuf {
    let stem = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "图片".to_string());
    dir.join(format!("{}_报告.{}", stem, format.extension()))
}

pub fn report_row(file_name: &str, record: &ImageMetadataRecord) -> [String; 6] {
    match record.details() {
        Some(d) => [
            file_name.to_string(),
            d.pixel_size.to_string(),
            d.physical_size.to_string(),
            d.dpi.to_string(),
            d.color_mode.to_string(),
            format_file_size(Some(d.file_size_bytes)),
        ],
        None => [
            file_name.to_string(),
            UNREADABLE.to_string(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
        ],
    }
}

pub fn write_csv<W: Write>(mut writer: W, records: &RecordMap, progress: &dyn ProgressSink) -> Result<()> {
    let total = records.len();
    progress.emit(ProgressEvent::Started { total });

    writer.write_all(UTF8_BOM)?;
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(REPORT_HEADERS).map_err(csv_error)?;
    for (done, (name, record)) in records.iter().enumerate() {
        csv.write_record(report_row(name, record)).map_err(csv_error)?;
        progress.emit(ProgressEvent::Advanced {
            done: done + 1,
            total,
            name: name.clone(),
        });
    }
    csv.flush()?;

    progress.emit(ProgressEvent::Finished { total });
    Ok(())
}

#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: String,
    directory: &'a Path,
    total: usize,
    failed: usize,
    records: Vec<JsonRecord<'a>>,
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    file_name: &'a str,
    #[serde(flatten)]
    record: &'a ImageMetadataRecord,
}

pub fn write_json<W: Write>(writer: W, directory: &Path, records: &RecordMap) -> Result<()> {
    let report = JsonReport {
        generated_at: chrono::Local::now().to_rfc3339(),
        directory,
        total: records.len(),
        failed: records.values().filter(|r| !r.is_ok()).count(),
        records: records
            .iter()
            .map(|(name, record)| JsonRecord {
                file_name: name,
                record,
            })
            .collect(),
    };
    serde_json::to_writer_pretty(writer, &report).map_err(|e| ImgInfoError::Export(e.to_string()))
}

/// Writes the report for `records` to `path`, replacing any existing file.
pub fn export_report(
    path: &Path,
    directory: &Path,
    records: &RecordMap,
    format: ExportFormat,
    progress: &dyn ProgressSink,
) -> Result<()> {
    let result = File::create(path)
        .map_err(|e| ImgInfoError::Export(format!("{}: {}", path.display(), e)))
        .and_then(|file| {
            let mut writer = BufWriter::new(file);
            match format {
                ExportFormat::Csv => write_csv(&mut writer, records, progress)?,
                ExportFormat::Json => {
                    progress.emit(ProgressEvent::Started { total: records.len() });
                    write_json(&mut writer, directory, records)?;
                    progress.emit(ProgressEvent::Finished { total: records.len() });
                }
            }
            writer.flush()?;
            Ok(())
        })
        .map_err(|e| match e {
            ImgInfoError::Export(_) => e,
            other => ImgInfoError::Export(format!("{}: {}", path.display(), other)),
        });

    match &result {
        Ok(()) => info!(
            path = %path.display(),
            rows = records.len(),
            format = format.extension(),
            "Report exported"
        ),
        Err(e) => error!(path = %path.display(), error = %e, "Report export failed"),
    }
    result
}

fn csv_error(e: csv::Error) -> ImgInfoError {
    ImgInfoError::Export(e.to_string())
}
