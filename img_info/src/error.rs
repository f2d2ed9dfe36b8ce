//! Error types
//!
//! Per-file errors are captured into records and outcome logs; only
//! directory-level and batch setup failures abort an operation.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImgInfoError {
    #[error("cannot decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("thumbnail generation failed: {0}")]
    Thumbnail(String),

    #[error("conversion of {path} failed: {reason}")]
    ConversionIo { path: PathBuf, reason: String },

    #[error("rename {from} -> {to} failed: {source}")]
    RenameIo {
        from: String,
        to: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot scan {path}: {reason}")]
    FatalScan { path: PathBuf, reason: String },

    #[error("cannot create output directory {path}: {source}")]
    DestinationSetup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("report export failed: {0}")]
    Export(String),

    #[error("another batch operation ({0}) is already running")]
    BatchBusy(String),

    #[error("no directory has been scanned yet")]
    NoSnapshot,

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),
}

impl ImgInfoError {
    /// True for errors scoped to a single file, which are recorded and skipped
    /// over; false for errors that abort the whole batch.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ImgInfoError::Decode { .. }
            | ImgInfoError::Thumbnail(_)
            | ImgInfoError::ConversionIo { .. }
            | ImgInfoError::RenameIo { .. }
            | ImgInfoError::Io(_)
            | ImgInfoError::Image(_) => true,
            ImgInfoError::FatalScan { .. }
            | ImgInfoError::DestinationSetup { .. }
            | ImgInfoError::Export(_)
            | ImgInfoError::BatchBusy(_)
            | ImgInfoError::NoSnapshot
            | ImgInfoError::Cancelled
            | ImgInfoError::Config(_) => false,
        }
    }
}

/// Failure of one RGB→CMYK strategy. Always triggers fall-through to the
/// next strategy in the chain.
#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("external tool not found: {0}")]
    ToolMissing(String),

    #[error("{tool} exited with {code:?}: {stderr}")]
    ToolFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{tool} timed out after {after:?}")]
    Timeout { tool: String, after: Duration },

    #[error("temporary file IO failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("no CMYK ICC profile found (searched: {0})")]
    MissingProfile(String),

    #[error("colour transform failed: {0}")]
    Transform(String),

    #[error("strategy unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected output: {0}")]
    BadOutput(String),
}

pub type Result<T> = std::result::Result<T, ImgInfoError>;
