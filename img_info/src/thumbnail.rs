//! Thumbnail generation
//!
//! Thumbnails are always PNG so transparency survives and no generation loss is
//! added on top of the source. Failure never propagates: the record simply has
//! no thumbnail.

use image::{DynamicImage, GenericImageView};
use std::io::Cursor;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::debug;

use crate::error::{ImgInfoError, Result};
use crate::types::Thumbnail;

/// Longest edge of a thumbnail.
pub const THUMBNAIL_MAX: u32 = 128;

/// Scales `img` down to fit 128×128, keeping aspect ratio. Images that already
/// fit are not upscaled.
pub fn make_thumbnail(img: &DynamicImage) -> Result<Thumbnail> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(ImgInfoError::Thumbnail("empty image".into()));
    }

    let small = if w <= THUMBNAIL_MAX && h <= THUMBNAIL_MAX {
        img.clone()
    } else {
        img.thumbnail(THUMBNAIL_MAX, THUMBNAIL_MAX)
    };

    let small = match small {
        DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_) => small,
        other => DynamicImage::ImageRgba8(other.to_rgba8()),
    };

    let mut png = Vec::new();
    small
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| ImgInfoError::Thumbnail(e.to_string()))?;

    Ok(Thumbnail {
        width: small.width(),
        height: small.height(),
        png,
    })
}

/// Never fails and never unwinds into the caller.
pub fn try_thumbnail(img: &DynamicImage) -> Option<Thumbnail> {
    match catch_unwind(AssertUnwindSafe(|| make_thumbnail(img))) {
        Ok(Ok(thumb)) => Some(thumb),
        Ok(Err(e)) => {
            debug!(error = %e, "Thumbnail skipped");
            None
        }
        Err(_) => {
            debug!("Thumbnail generation panicked");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma, Rgb, Rgba};

    #[test]
    fn test_thumbnail_fits_and_keeps_aspect() {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(900, 1200, Rgb([200, 10, 10])));
        let thumb = make_thumbnail(&img).unwrap();
        assert_eq!(thumb.height, 128);
        assert_eq!(thumb.width, 96);

        let decoded = image::load_from_memory_with_format(&thumb.png, image::ImageFormat::Png).unwrap();
        assert_eq!(decoded.dimensions(), (96, 128));
    }

    #[test]
    fn test_small_image_is_not_upscaled() {
        let img = DynamicImage::ImageLuma8(ImageBuffer::from_pixel(20, 10, Luma([7])));
        let thumb = make_thumbnail(&img).unwrap();
        assert_eq!((thumb.width, thumb.height), (20, 10));
    }

    #[test]
    fn test_alpha_survives() {
        let img = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(300, 300, Rgba([0, 0, 0, 0])));
        let thumb = make_thumbnail(&img).unwrap();
        let decoded = image::load_from_memory(&thumb.png).unwrap();
        assert!(decoded.color().has_alpha());
    }

    #[test]
    fn test_sixteen_bit_source_is_encoded() {
        let img = DynamicImage::ImageRgb16(ImageBuffer::from_pixel(200, 50, Rgb([65535, 0, 0])));
        assert!(try_thumbnail(&img).is_some());
    }

    #[test]
    fn test_empty_image_yields_none() {
        let img = DynamicImage::new_rgb8(0, 0);
        assert!(try_thumbnail(&img).is_none());
    }
}
