//! Metadata Extractor
//!
//! One file in, one `(display name, record)` pair out. Never returns an error:
//! decode failures are captured in the record.

use image::{ColorType, DynamicImage, GenericImageView, ImageReader, Limits};
use std::path::Path;
use tracing::{debug, warn};

use crate::container::{self, ContainerInfo};
use crate::error::{ImgInfoError, Result};
use crate::thumbnail::try_thumbnail;
use crate::types::{
    display_name, ColorMode, ContainerFormat, Dpi, ImageDetails, ImageMetadataRecord,
    PhysicalSize, PixelSize,
};

/// Decompression-bomb guard: images declaring more pixels are rejected before
/// their pixel data is decoded.
pub const MAX_IMAGE_PIXELS: u64 = 178_956_970;

/// Decoder allocation ceiling: an 8-bit RGBA buffer at the pixel cap.
const MAX_DECODE_ALLOC: u64 = MAX_IMAGE_PIXELS * 4;

/// Extracts the metadata record for one file.
pub fn extract(path: &Path) -> (String, ImageMetadataRecord) {
    let name = display_name(path);
    let record = match extract_details(path) {
        Ok(details) => {
            debug!(
                file = %name,
                size = %details.pixel_size,
                dpi = %details.dpi,
                mode = %details.color_mode,
                "Image metadata read"
            );
            ImageMetadataRecord::ok(path.to_path_buf(), details)
        }
        Err(e) => {
            warn!(file = %path.display(), error = %e, "图片信息读取失败");
            ImageMetadataRecord::failed(path.to_path_buf(), e.to_string())
        }
    };
    (name, record)
}

fn extract_details(path: &Path) -> Result<ImageDetails> {
    let file_size_bytes = std::fs::metadata(path)
        .map_err(|e| decode_error(path, e))?
        .len();
    let header = container::inspect(path).map_err(|e| decode_error(path, e))?;

    let (img, format) = open_image_with_header(path, header.as_ref())?;
    let (width, height) = img.dimensions();
    let pixel_size = PixelSize { width, height };

    let dpi = Dpi::from_declared(header.as_ref().and_then(|h| h.dpi));
    let color_mode = header
        .as_ref()
        .and_then(|h| h.mode_hint)
        .unwrap_or_else(|| decoded_mode(&img));

    Ok(ImageDetails {
        pixel_size,
        dpi,
        physical_size: PhysicalSize::from_pixels(pixel_size, dpi),
        color_mode,
        format,
        file_size_bytes,
        thumbnail: try_thumbnail(&img),
    })
}

/// Decodes `path` with the bomb guard and decoder limits applied.
pub fn open_image(path: &Path) -> Result<(DynamicImage, ContainerFormat)> {
    let header = container::inspect(path).map_err(|e| decode_error(path, e))?;
    open_image_with_header(path, header.as_ref())
}

fn open_image_with_header(
    path: &Path,
    header: Option<&ContainerInfo>,
) -> Result<(DynamicImage, ContainerFormat)> {
    if let Some((w, h)) = header.and_then(|h| h.dimensions) {
        check_pixel_budget(path, w, h)?;
    }

    let mut reader = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| decode_error(path, e))?;

    let format = header
        .map(|h| h.format)
        .or_else(|| reader.format().and_then(ContainerFormat::from_image_format))
        .ok_or_else(|| decode_error(path, "unsupported image format"))?;
    reader.set_format(format.image_format());

    let mut limits = Limits::default();
    limits.max_alloc = Some(MAX_DECODE_ALLOC);
    reader.limits(limits);

    let img = reader.decode().map_err(|e| decode_error(path, e))?;
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(decode_error(path, "image has zero width or height"));
    }
    check_pixel_budget(path, w, h)?;
    Ok((img, format))
}

fn check_pixel_budget(path: &Path, width: u32, height: u32) -> Result<()> {
    let pixels = u64::from(width) * u64::from(height);
    if pixels > MAX_IMAGE_PIXELS {
        return Err(decode_error(
            path,
            format!(
                "image size ({} pixels) exceeds limit of {} pixels, could be decompression bomb DOS attack",
                pixels, MAX_IMAGE_PIXELS
            ),
        ));
    }
    Ok(())
}

fn decode_error(path: &Path, reason: impl ToString) -> ImgInfoError {
    ImgInfoError::Decode {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Mode implied by the decoded buffer when the header gave no hint.
pub fn decoded_mode(img: &DynamicImage) -> ColorMode {
    match img.color() {
        ColorType::L8 => ColorMode::L,
        ColorType::L16 => ColorMode::I16,
        ColorType::La8 | ColorType::La16 => ColorMode::La,
        ColorType::Rgba8 | ColorType::Rgba16 | ColorType::Rgba32F => ColorMode::Rgba,
        _ => ColorMode::Rgb,
    }
}
