pub mod color;
pub mod config;
pub mod container;
pub mod error;
pub mod export;
pub mod extractor;
pub mod progress;
pub mod rename;
pub mod scan;
pub mod session;
pub mod thumbnail;
pub mod types;

pub mod convert;

pub use color::{
    flatten_alpha, rgb_to_cmyk_pixel, CmykImage, ColorConverter, ColorEngine, Conversion,
    ConvertedImage, ExternalStrategy, IccStrategy, InkLimit, NumericCmyk,
};
pub use config::{GlobalArgs, Settings};
pub use convert::{convert_batch, destination_dir, output_file_name, ConversionReport};
pub use export::{export_report, format_file_size, ExportFormat};
pub use extractor::{extract, open_image};
pub use progress::{
    progress_channel, CancelFlag, NoProgress, ProgressEvent, ProgressSink, ProgressTracker,
};
pub use rename::{plan_renames, rename_batch, target_name, PlannedRename, RenameReport};
pub use scan::{scan_directory, scan_files_with, ScanReport};
pub use session::{BatchGuard, BatchKind, Session, Snapshot};
pub use types::{
    ColorMode, ContainerFormat, ConversionOutcome, ConversionStatus, Dpi, ImageDetails,
    ImageMetadataRecord, PhysicalSize, PixelSize, RecordMap, RenameOutcome, RenameStatus,
    TargetMode, Thumbnail,
};

pub use error::{ImgInfoError, Result, StrategyError};
