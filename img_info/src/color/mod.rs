//! Color Conversion Engine
//!
//! RGB→CMYK goes through an ordered chain of strategies; the first one that
//! produces a CMYK buffer of the right size wins:
//!
//! 1. [`ExternalStrategy`] - ImageMagick `-colorspace CMYK`
//! 2. [`IccStrategy`] - sRGB → press profile via Little CMS
//! 3. [`NumericCmyk`] - plain arithmetic, cannot fail
//!
//! Every source is first reduced to 8-bit RGB, flattening any alpha onto white.

mod external;
mod icc;
mod numeric;

pub use external::{ExternalStrategy, DEFAULT_MAGICK_TIMEOUT, MAGICK_CANDIDATES};
pub use icc::{profile_search_dirs, IccStrategy, PROFILE_NAMES};
pub use numeric::{rgb_to_cmyk_pixel, InkLimit, NumericCmyk};

use image::{DynamicImage, RgbImage};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::StrategyError;
use crate::types::TargetMode;

// ═══════════════════════════════════════════════════════════════
// CMYK buffer
// ═══════════════════════════════════════════════════════════════

/// Interleaved 8-bit CMYK, ink amounts (0 = no ink).
#[derive(Clone, PartialEq, Eq)]
pub struct CmykImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl CmykImage {
    /// `None` when `data` does not hold exactly `width * height * 4` bytes.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(4)?;
        (data.len() == expected).then_some(Self {
            width,
            height,
            data,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for CmykImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CmykImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum ConvertedImage {
    Rgb(RgbImage),
    Cmyk(CmykImage),
}

impl ConvertedImage {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            ConvertedImage::Rgb(img) => img.dimensions(),
            ConvertedImage::Cmyk(img) => img.dimensions(),
        }
    }
}

/// Converted pixels plus the name of the strategy that produced them.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub image: ConvertedImage,
    pub strategy: &'static str,
}

// ═══════════════════════════════════════════════════════════════
// Strategy chain
// ═══════════════════════════════════════════════════════════════

pub trait ColorConverter: Send + Sync {
    fn name(&self) -> &'static str;

    fn to_cmyk(&self, rgb: &RgbImage) -> Result<CmykImage, StrategyError>;
}

/// Name reported for RGB targets, which need no strategy.
pub const RGB_STRATEGY: &str = "rgb";

pub struct ColorEngine {
    strategies: Vec<Box<dyn ColorConverter>>,
    terminal: NumericCmyk,
}

impl ColorEngine {
    /// Chain of `strategies` ending in the numeric fallback.
    pub fn new(strategies: Vec<Box<dyn ColorConverter>>) -> Self {
        Self {
            strategies,
            terminal: NumericCmyk,
        }
    }

    pub fn numeric_only() -> Self {
        Self::new(Vec::new())
    }

    /// External tool, then ICC, then numeric.
    pub fn from_settings(settings: &Settings) -> Self {
        let external = match &settings.magick {
            Some(path) => ExternalStrategy::with_tool(path.clone(), settings.magick_timeout),
            None => ExternalStrategy::discover(settings.magick_timeout),
        };
        let icc = IccStrategy::discover(settings.cmyk_profile.clone());
        debug!(
            magick = ?external.tool(),
            icc_profile = ?icc.profile(),
            "Colour engine configured"
        );
        Self::new(vec![Box::new(external), Box::new(icc)])
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies
            .iter()
            .map(|s| s.name())
            .chain(std::iter::once(self.terminal.name()))
            .collect()
    }

    /// Converts `img` to `target`. Always succeeds: CMYK falls back to the
    /// numeric strategy when everything ahead of it fails.
    pub fn convert(&self, img: &DynamicImage, target: TargetMode) -> Conversion {
        let rgb = flatten_alpha(img);
        match target {
            TargetMode::Rgb => Conversion {
                image: ConvertedImage::Rgb(rgb),
                strategy: RGB_STRATEGY,
            },
            TargetMode::Cmyk => {
                let (cmyk, strategy) = self.rgb_to_cmyk(&rgb);
                Conversion {
                    image: ConvertedImage::Cmyk(cmyk),
                    strategy,
                }
            }
        }
    }

    pub fn rgb_to_cmyk(&self, rgb: &RgbImage) -> (CmykImage, &'static str) {
        for strategy in &self.strategies {
            let name = strategy.name();
            let attempt = catch_unwind(AssertUnwindSafe(|| strategy.to_cmyk(rgb)));
            match attempt {
                Ok(Ok(cmyk)) if cmyk.dimensions() == rgb.dimensions() => return (cmyk, name),
                Ok(Ok(cmyk)) => debug!(
                    strategy = name,
                    expected = ?rgb.dimensions(),
                    got = ?cmyk.dimensions(),
                    "Strategy returned wrong dimensions, falling through"
                ),
                Ok(Err(e)) => debug!(strategy = name, error = %e, "Strategy failed, falling through"),
                Err(_) => warn!(strategy = name, "Strategy panicked, falling through"),
            }
        }
        (self.terminal.convert(rgb), self.terminal.name())
    }
}

impl std::fmt::Debug for ColorEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColorEngine")
            .field("strategies", &self.strategy_names())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════
// Alpha flattening
// ═══════════════════════════════════════════════════════════════

/// 8-bit RGB with alpha composited onto opaque white. Sources without alpha
/// are converted directly.
pub fn flatten_alpha(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut out = RgbImage::new(width, height);
    for (dst, src) in out.pixels_mut().zip(rgba.pixels()) {
        let [r, g, b, a] = src.0;
        dst.0 = [over_white(r, a), over_white(g, a), over_white(b, a)];
    }
    out
}

/// `c * a/255 + 255 * (1 - a/255)` in integer math with rounding.
fn over_white(c: u8, a: u8) -> u8 {
    let a = u32::from(a);
    let tmp = u32::from(c) * a + 255 * (255 - a) + 128;
    ((tmp + (tmp >> 8)) >> 8) as u8
}
