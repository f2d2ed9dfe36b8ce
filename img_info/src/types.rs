//! Data model: per-file metadata records and batch outcomes

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Decoded pixel layout, named the way print tooling names image modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ColorMode {
    /// 1-bit bilevel
    #[serde(rename = "1")]
    Bilevel,
    #[serde(rename = "L")]
    L,
    #[serde(rename = "LA")]
    La,
    /// Palette-indexed
    #[serde(rename = "P")]
    P,
    #[serde(rename = "RGB")]
    Rgb,
    #[serde(rename = "RGBA")]
    Rgba,
    #[serde(rename = "CMYK")]
    Cmyk,
    /// 16-bit greyscale
    #[serde(rename = "I;16")]
    I16,
}

impl ColorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorMode::Bilevel => "1",
            ColorMode::L => "L",
            ColorMode::La => "LA",
            ColorMode::P => "P",
            ColorMode::Rgb => "RGB",
            ColorMode::Rgba => "RGBA",
            ColorMode::Cmyk => "CMYK",
            ColorMode::I16 => "I;16",
        }
    }

    pub fn has_alpha(&self) -> bool {
        matches!(self, ColorMode::La | ColorMode::Rgba)
    }
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversion target. Neither target keeps an alpha channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TargetMode {
    #[serde(rename = "RGB")]
    Rgb,
    #[serde(rename = "CMYK")]
    Cmyk,
}

impl TargetMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetMode::Rgb => "RGB",
            TargetMode::Cmyk => "CMYK",
        }
    }

    pub fn color_mode(&self) -> ColorMode {
        match self {
            TargetMode::Rgb => ColorMode::Rgb,
            TargetMode::Cmyk => ColorMode::Cmyk,
        }
    }

    /// `RGB_Converted` / `CMYK_Converted`
    pub fn output_dir_name(&self) -> String {
        format!("{}_Converted", self.as_str())
    }
}

impl fmt::Display for TargetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rgb" => Ok(TargetMode::Rgb),
            "cmyk" => Ok(TargetMode::Cmyk),
            other => Err(format!("unknown target mode '{}', expected rgb or cmyk", other)),
        }
    }
}

/// Container format as identified from the file's magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContainerFormat {
    Jpeg,
    Png,
    Bmp,
    Gif,
    Tiff,
}

impl ContainerFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerFormat::Jpeg => "JPEG",
            ContainerFormat::Png => "PNG",
            ContainerFormat::Bmp => "BMP",
            ContainerFormat::Gif => "GIF",
            ContainerFormat::Tiff => "TIFF",
        }
    }

    pub fn image_format(&self) -> image::ImageFormat {
        match self {
            ContainerFormat::Jpeg => image::ImageFormat::Jpeg,
            ContainerFormat::Png => image::ImageFormat::Png,
            ContainerFormat::Bmp => image::ImageFormat::Bmp,
            ContainerFormat::Gif => image::ImageFormat::Gif,
            ContainerFormat::Tiff => image::ImageFormat::Tiff,
        }
    }

    pub fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(ContainerFormat::Jpeg),
            image::ImageFormat::Png => Some(ContainerFormat::Png),
            image::ImageFormat::Bmp => Some(ContainerFormat::Bmp),
            image::ImageFormat::Gif => Some(ContainerFormat::Gif),
            image::ImageFormat::Tiff => Some(ContainerFormat::Tiff),
            _ => None,
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for PixelSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Dots per inch, both axes strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dpi {
    pub x: u32,
    pub y: u32,
}

impl Dpi {
    pub const DEFAULT: u32 = 72;

    /// Rounds each declared axis to the nearest integer and substitutes 72 for
    /// any axis that is missing, non-finite or not positive after rounding.
    pub fn from_declared(declared: Option<(f64, f64)>) -> Self {
        let axis = |v: Option<f64>| {
            v.filter(|v| v.is_finite())
                .map(|v| v.round())
                .filter(|v| *v >= 1.0)
                .map(|v| v.min(u32::MAX as f64) as u32)
                .unwrap_or(Self::DEFAULT)
        };
        Dpi {
            x: axis(declared.map(|d| d.0)),
            y: axis(declared.map(|d| d.1)),
        }
    }
}

impl Default for Dpi {
    fn default() -> Self {
        Dpi {
            x: Self::DEFAULT,
            y: Self::DEFAULT,
        }
    }
}

impl fmt::Display for Dpi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.x, self.y)
    }
}

/// Print size in centimetres, rounded to 2 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhysicalSize {
    pub width_cm: f64,
    pub height_cm: f64,
}

impl PhysicalSize {
    pub fn from_pixels(pixels: PixelSize, dpi: Dpi) -> Self {
        PhysicalSize {
            width_cm: round2(pixels.width as f64 / dpi.x as f64 * 2.54),
            height_cm: round2(pixels.height as f64 / dpi.y as f64 * 2.54),
        }
    }

    /// Whole centimetres, ties to even.
    pub fn rounded_cm(&self) -> (i64, i64) {
        (
            self.width_cm.round_ties_even() as i64,
            self.height_cm.round_ties_even() as i64,
        )
    }
}

impl fmt::Display for PhysicalSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}x{:.2}", self.width_cm, self.height_cm)
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round_ties_even() / 100.0
}

/// Thumbnail encoded as PNG, at most 128×128.
#[derive(Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

impl fmt::Debug for Thumbnail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thumbnail")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("png_bytes", &self.png.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageDetails {
    pub pixel_size: PixelSize,
    pub dpi: Dpi,
    pub physical_size: PhysicalSize,
    pub color_mode: ColorMode,
    pub format: ContainerFormat,
    pub file_size_bytes: u64,
    #[serde(skip)]
    pub thumbnail: Option<Thumbnail>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RecordState {
    Ok(ImageDetails),
    Failed { error: String },
}

/// One scanned file. A failed record carries only its path and the error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageMetadataRecord {
    pub source_path: PathBuf,
    #[serde(flatten)]
    pub state: RecordState,
}

impl ImageMetadataRecord {
    pub fn ok(source_path: PathBuf, details: ImageDetails) -> Self {
        Self {
            source_path,
            state: RecordState::Ok(details),
        }
    }

    pub fn failed(source_path: PathBuf, error: impl Into<String>) -> Self {
        Self {
            source_path,
            state: RecordState::Failed {
                error: error.into(),
            },
        }
    }

    pub fn details(&self) -> Option<&ImageDetails> {
        match &self.state {
            RecordState::Ok(d) => Some(d),
            RecordState::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            RecordState::Ok(_) => None,
            RecordState::Failed { error } => Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.state, RecordState::Ok(_))
    }

    pub fn display_name(&self) -> String {
        display_name(&self.source_path)
    }
}

/// Final path component, lossily decoded.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Display filename → record, ordered by filename.
pub type RecordMap = BTreeMap<String, ImageMetadataRecord>;

#[derive(Debug, Clone, PartialEq)]
pub enum ConversionStatus {
    Converted {
        output: PathBuf,
        strategy: &'static str,
    },
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOutcome {
    pub file_name: String,
    pub status: ConversionStatus,
}

impl fmt::Display for ConversionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            ConversionStatus::Converted { output, strategy } => write!(
                f,
                "✅ 成功: '{}' -> '{}' ({})",
                self.file_name,
                display_name(output),
                strategy
            ),
            ConversionStatus::Skipped(reason) => {
                write!(f, "⏭️  跳过: '{}' - {}", self.file_name, reason)
            }
            ConversionStatus::Failed(reason) => {
                write!(f, "❌ 失败: '{}' - {}", self.file_name, reason)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenameStatus {
    Renamed { from: String, to: String },
    Failed(String),
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenameOutcome {
    pub file_name: String,
    pub status: RenameStatus,
}

impl fmt::Display for RenameOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            RenameStatus::Renamed { from, to } => write!(f, "✅ 成功: '{}' -> '{}'", from, to),
            RenameStatus::Failed(reason) => {
                write!(f, "❌ 失败: '{}' - {}", self.file_name, reason)
            }
            RenameStatus::Skipped(reason) => {
                write!(f, "⏭️  跳过: '{}' - {}", self.file_name, reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_dpi_defaults() {
        assert_eq!(Dpi::from_declared(None), Dpi { x: 72, y: 72 });
        assert_eq!(Dpi::from_declared(Some((0.0, 300.0))), Dpi { x: 72, y: 300 });
        assert_eq!(Dpi::from_declared(Some((-5.0, -1.0))), Dpi { x: 72, y: 72 });
        assert_eq!(Dpi::from_declared(Some((0.4, f64::NAN))), Dpi { x: 72, y: 72 });
        assert_eq!(Dpi::from_declared(Some((299.9994, 300.2))), Dpi { x: 300, y: 300 });
    }

    #[test]
    fn test_physical_size_scenario() {
        let size = PhysicalSize::from_pixels(
            PixelSize {
                width: 900,
                height: 1200,
            },
            Dpi { x: 300, y: 300 },
        );
        assert_eq!(size.width_cm, 7.62);
        assert_eq!(size.height_cm, 10.16);
        assert_eq!(size.rounded_cm(), (8, 10));
        assert_eq!(size.to_string(), "7.62x10.16");
    }

    #[test]
    fn test_rounded_cm_ties_to_even() {
        let size = PhysicalSize {
            width_cm: 2.5,
            height_cm: 3.5,
        };
        assert_eq!(size.rounded_cm(), (2, 4));
    }

    #[test]
    fn test_target_mode_parse_and_dir() {
        assert_eq!("CMYK".parse::<TargetMode>().unwrap(), TargetMode::Cmyk);
        assert_eq!("rgb".parse::<TargetMode>().unwrap(), TargetMode::Rgb);
        assert!("lab".parse::<TargetMode>().is_err());
        assert_eq!(TargetMode::Cmyk.output_dir_name(), "CMYK_Converted");
        assert_eq!(TargetMode::Rgb.color_mode(), ColorMode::Rgb);
    }

    #[test]
    fn test_color_mode_strings() {
        let all = [
            (ColorMode::Bilevel, "1"),
            (ColorMode::L, "L"),
            (ColorMode::La, "LA"),
            (ColorMode::P, "P"),
            (ColorMode::Rgb, "RGB"),
            (ColorMode::Rgba, "RGBA"),
            (ColorMode::Cmyk, "CMYK"),
            (ColorMode::I16, "I;16"),
        ];
        for (mode, s) in all {
            assert_eq!(mode.to_string(), s);
            assert_eq!(serde_json::to_value(mode).unwrap(), serde_json::json!(s));
        }
    }

    #[test]
    fn test_record_accessors_and_json() {
        let failed = ImageMetadataRecord::failed(PathBuf::from("/x/bad.jpg"), "corrupt");
        assert_eq!(failed.error(), Some("corrupt"));
        assert!(failed.details().is_none());
        assert_eq!(failed.display_name(), "bad.jpg");

        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "corrupt");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_physical_size_has_two_decimals(w in 1u32..20_000, h in 1u32..20_000, dx in 1u32..2_400, dy in 1u32..2_400) {
            let size = PhysicalSize::from_pixels(PixelSize { width: w, height: h }, Dpi { x: dx, y: dy });
            let exact_w = w as f64 / dx as f64 * 2.54;
            prop_assert!((size.width_cm - exact_w).abs() <= 0.005 + 1e-9);
            prop_assert!(((size.width_cm * 100.0).round() - size.width_cm * 100.0).abs() < 1e-6);
            prop_assert!(size.height_cm > 0.0);
        }

        #[test]
        fn prop_declared_dpi_always_positive(x in proptest::num::f64::ANY, y in proptest::num::f64::ANY) {
            let dpi = Dpi::from_declared(Some((x, y)));
            prop_assert!(dpi.x >= 1 && dpi.y >= 1);
        }
    }
}
