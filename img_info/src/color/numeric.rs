//! Direct numeric RGB→CMYK
//!
//! Per pixel, in f64:
//! `c = 1 - r/255` (same for m, y), `k = min(c, m, y)`, then CMY are rescaled
//! by `1 / (1 - k)` unless `k == 1`. Each channel is stored as the truncated
//! `value * 255`. Pure arithmetic, so the output is bit-for-bit reproducible.

use image::RgbImage;
use rayon::prelude::*;

use super::{CmykImage, ColorConverter};
use crate::error::StrategyError;

/// Rows per parallel work item.
const ROWS_PER_CHUNK: usize = 64;

/// Terminal strategy: cannot fail.
#[derive(Debug, Default, Clone, Copy)]
pub struct NumericCmyk;

impl NumericCmyk {
    pub const NAME: &'static str = "numeric";

    pub fn convert(&self, rgb: &RgbImage) -> CmykImage {
        map_pixels(rgb, rgb_to_cmyk_pixel)
    }
}

impl ColorConverter for NumericCmyk {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn to_cmyk(&self, rgb: &RgbImage) -> Result<CmykImage, StrategyError> {
        Ok(self.convert(rgb))
    }
}

pub fn rgb_to_cmyk_pixel([r, g, b]: [u8; 3]) -> [u8; 4] {
    let (c, m, y, k) = separate(r, g, b);
    [to_byte(c), to_byte(m), to_byte(y), to_byte(k)]
}

/// CMY with black generation, each in [0, 1].
fn separate(r: u8, g: u8, b: u8) -> (f64, f64, f64, f64) {
    let c = 1.0 - f64::from(r) / 255.0;
    let m = 1.0 - f64::from(g) / 255.0;
    let y = 1.0 - f64::from(b) / 255.0;
    let k = c.min(m).min(y);
    if k < 1.0 {
        let scale = 1.0 - k;
        ((c - k) / scale, (m - k) / scale, (y - k) / scale, k)
    } else {
        (0.0, 0.0, 0.0, k)
    }
}

/// Truncating cast; `as` saturates so out-of-range values clamp to 0..=255.
fn to_byte(v: f64) -> u8 {
    (v * 255.0) as u8
}

/// Numeric separation with a total ink cap: when C+M+Y+K exceeds the cap,
/// all four channels are scaled down proportionally.
///
/// Not part of the default chain; available for callers that print on stock
/// with a hard ink limit.
#[derive(Debug, Clone, Copy)]
pub struct InkLimit {
    /// Maximum total ink, 1.0 = 100%.
    pub max_total_ink: f64,
}

impl Default for InkLimit {
    fn default() -> Self {
        // 300%
        Self { max_total_ink: 3.0 }
    }
}

impl InkLimit {
    pub const NAME: &'static str = "numeric-ink-limit";

    pub fn convert_pixel(&self, [r, g, b]: [u8; 3]) -> [u8; 4] {
        let (c, m, y, k) = separate(r, g, b);
        let total = c + m + y + k;
        let scale = if total > self.max_total_ink {
            self.max_total_ink / total
        } else {
            1.0
        };
        [
            to_byte(c * scale),
            to_byte(m * scale),
            to_byte(y * scale),
            to_byte(k * scale),
        ]
    }

    pub fn convert(&self, rgb: &RgbImage) -> CmykImage {
        map_pixels(rgb, |px| self.convert_pixel(px))
    }
}

impl ColorConverter for InkLimit {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn to_cmyk(&self, rgb: &RgbImage) -> Result<CmykImage, StrategyError> {
        if !(self.max_total_ink.is_finite() && self.max_total_ink > 0.0) {
            return Err(StrategyError::Unavailable(format!(
                "invalid ink limit {}",
                self.max_total_ink
            )));
        }
        Ok(self.convert(rgb))
    }
}

fn map_pixels<F>(rgb: &RgbImage, f: F) -> CmykImage
where
    F: Fn([u8; 3]) -> [u8; 4] + Sync,
{
    let (width, height) = rgb.dimensions();
    let row_in = width as usize * 3;
    let row_out = width as usize * 4;
    let mut data = vec![0u8; row_out * height as usize];

    if row_in > 0 {
        data.par_chunks_mut(row_out * ROWS_PER_CHUNK)
            .zip(rgb.as_raw().par_chunks(row_in * ROWS_PER_CHUNK))
            .for_each(|(out, src)| {
                for (o, s) in out.chunks_exact_mut(4).zip(src.chunks_exact(3)) {
                    o.copy_from_slice(&f([s[0], s[1], s[2]]));
                }
            });
    }

    CmykImage {
        width,
        height,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use proptest::prelude::*;

    #[test]
    fn test_primary_and_neutral_pixels() {
        assert_eq!(rgb_to_cmyk_pixel([255, 0, 0]), [0, 255, 255, 0]);
        assert_eq!(rgb_to_cmyk_pixel([0, 255, 0]), [255, 0, 255, 0]);
        assert_eq!(rgb_to_cmyk_pixel([0, 0, 255]), [255, 255, 0, 0]);
        assert_eq!(rgb_to_cmyk_pixel([255, 255, 255]), [0, 0, 0, 0]);
        assert_eq!(rgb_to_cmyk_pixel([0, 0, 0]), [0, 0, 0, 255]);
    }

    #[test]
    fn test_grey_is_black_only() {
        let [c, m, y, k] = rgb_to_cmyk_pixel([51, 51, 51]);
        assert_eq!((c, m, y), (0, 0, 0));
        assert_eq!(k, 204);
    }

    #[test]
    fn test_image_conversion_matches_pixel_function() {
        let img = ImageBuffer::from_fn(130, 70, |x, y| Rgb([(x * 2) as u8, (y * 3) as u8, (x ^ y) as u8]));
        let cmyk = NumericCmyk.convert(&img);
        assert_eq!((cmyk.width, cmyk.height), (130, 70));
        for (x, y, px) in img.enumerate_pixels() {
            assert_eq!(cmyk.pixel(x, y), rgb_to_cmyk_pixel(px.0));
        }
    }

    #[test]
    fn test_empty_image() {
        let img = RgbImage::new(0, 5);
        let cmyk = NumericCmyk.convert(&img);
        assert!(cmyk.data.is_empty());
    }

    #[test]
    fn test_ink_limit_caps_total() {
        let limit = InkLimit::default();
        // rich dark colour: heavy CMY plus some K
        let [c, m, y, k] = limit.convert_pixel([10, 0, 5]);
        let total = u32::from(c) + u32::from(m) + u32::from(y) + u32::from(k);
        assert!(total <= 3 * 255);

        // under the cap nothing changes
        assert_eq!(limit.convert_pixel([255, 0, 0]), rgb_to_cmyk_pixel([255, 0, 0]));
    }

    #[test]
    fn test_ink_limit_rejects_nonsense_cap() {
        let limit = InkLimit { max_total_ink: 0.0 };
        assert!(limit.to_cmyk(&RgbImage::new(1, 1)).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        #[test]
        fn prop_numeric_is_deterministic(r in any::<u8>(), g in any::<u8>(), b in any::<u8>()) {
            prop_assert_eq!(rgb_to_cmyk_pixel([r, g, b]), rgb_to_cmyk_pixel([r, g, b]));
        }

        #[test]
        fn prop_one_of_cmy_is_zero(r in any::<u8>(), g in any::<u8>(), b in any::<u8>()) {
            let [c, m, y, _] = rgb_to_cmyk_pixel([r, g, b]);
            prop_assert!(c == 0 || m == 0 || y == 0);
        }

        #[test]
        fn prop_k_matches_brightest_channel(r in any::<u8>(), g in any::<u8>(), b in any::<u8>()) {
            let [_, _, _, k] = rgb_to_cmyk_pixel([r, g, b]);
            let max = r.max(g).max(b);
            let expected = ((1.0 - f64::from(max) / 255.0) * 255.0) as u8;
            prop_assert_eq!(k, expected);
        }

        #[test]
        fn prop_ink_limit_total(r in any::<u8>(), g in any::<u8>(), b in any::<u8>()) {
            let [c, m, y, k] = InkLimit::default().convert_pixel([r, g, b]);
            prop_assert!(u32::from(c) + u32::from(m) + u32::from(y) + u32::from(k) <= 765);
        }
    }
}
