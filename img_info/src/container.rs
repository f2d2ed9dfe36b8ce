//! Container header inspection
//!
//! The decoder hands back pixels but not the declared resolution, and it expands
//! palette and CMYK data to RGB. This module reads those facts straight from the
//! container headers: JFIF/EXIF/SOF for JPEG, IHDR/pHYs for PNG, the DIB header
//! for BMP, and IFD0 for TIFF.
//!
//! Every parser is tolerant: a truncated or malformed header yields fewer facts,
//! never an error. Only opening/reading the file can fail.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use crate::types::{ColorMode, ContainerFormat};

/// Bytes read from the head of JPEG/PNG/BMP/GIF files. JPEG APP segments are
/// at most 64 KiB each, so SOF is reliably inside this window.
const HEADER_WINDOW: u64 = 512 * 1024;

/// IFD entry count sanity cap.
const MAX_IFD_ENTRIES: u16 = 1024;

const METRES_PER_INCH: f64 = 0.0254;
const CM_PER_INCH: f64 = 2.54;

/// Facts read from the container header.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerInfo {
    pub format: ContainerFormat,
    pub dimensions: Option<(u32, u32)>,
    /// Declared resolution in dots per inch, unrounded.
    pub dpi: Option<(f64, f64)>,
    /// Pixel layout as stored, before any decoder expansion.
    pub mode_hint: Option<ColorMode>,
}

impl ContainerInfo {
    fn new(format: ContainerFormat) -> Self {
        Self {
            format,
            dimensions: None,
            dpi: None,
            mode_hint: None,
        }
    }
}

/// Identifies the container from its magic bytes.
pub fn sniff(head: &[u8]) -> Option<ContainerFormat> {
    if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(ContainerFormat::Jpeg)
    } else if head.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some(ContainerFormat::Png)
    } else if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
        Some(ContainerFormat::Gif)
    } else if head.starts_with(b"II*\0") || head.starts_with(b"MM\0*") {
        Some(ContainerFormat::Tiff)
    } else if head.starts_with(b"BM") {
        Some(ContainerFormat::Bmp)
    } else {
        None
    }
}

/// Reads the container header of `path`. `Ok(None)` means the magic bytes
/// match none of the supported containers.
pub fn inspect(path: &Path) -> io::Result<Option<ContainerInfo>> {
    let mut file = File::open(path)?;

    if file_head_format(&mut file)? == Some(ContainerFormat::Tiff) {
        file.seek(SeekFrom::Start(0))?;
        let mut info = ContainerInfo::new(ContainerFormat::Tiff);
        if let Some(tags) = read_tiff_tags(&mut file) {
            info.dimensions = tags.dimensions();
            info.dpi = tags.file_dpi();
            info.mode_hint = tags.mode_hint();
        }
        return Ok(Some(info));
    }

    file.seek(SeekFrom::Start(0))?;
    let mut head = Vec::new();
    file.take(HEADER_WINDOW).read_to_end(&mut head)?;
    Ok(inspect_bytes(&head))
}

fn file_head_format(file: &mut File) -> io::Result<Option<ContainerFormat>> {
    let mut magic = Vec::with_capacity(8);
    file.take(8).read_to_end(&mut magic)?;
    Ok(sniff(&magic))
}

/// Parses an in-memory container head. TIFF data must be complete because IFD
/// offsets may point anywhere in the file.
pub fn inspect_bytes(data: &[u8]) -> Option<ContainerInfo> {
    let format = sniff(data)?;
    Some(match format {
        ContainerFormat::Jpeg => parse_jpeg(data),
        ContainerFormat::Png => parse_png(data),
        ContainerFormat::Bmp => parse_bmp(data),
        ContainerFormat::Gif => parse_gif(data),
        ContainerFormat::Tiff => {
            let mut info = ContainerInfo::new(ContainerFormat::Tiff);
            if let Some(tags) = read_tiff_tags(&mut Cursor::new(data)) {
                info.dimensions = tags.dimensions();
                info.dpi = tags.file_dpi();
                info.mode_hint = tags.mode_hint();
            }
            info
        }
    })
}

// ═══════════════════════════════════════════════════════════════
// Byte helpers
// ═══════════════════════════════════════════════════════════════

fn bytes_at(data: &[u8], at: usize, len: usize) -> Option<&[u8]> {
    data.get(at..at.checked_add(len)?)
}

fn be_u16(data: &[u8], at: usize) -> Option<u16> {
    bytes_at(data, at, 2).map(|b| u16::from_be_bytes([b[0], b[1]]))
}

fn be_u32(data: &[u8], at: usize) -> Option<u32> {
    bytes_at(data, at, 4).map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn le_u16(data: &[u8], at: usize) -> Option<u16> {
    bytes_at(data, at, 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn le_u32(data: &[u8], at: usize) -> Option<u32> {
    bytes_at(data, at, 4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn le_i32(data: &[u8], at: usize) -> Option<i32> {
    bytes_at(data, at, 4).map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

// ═══════════════════════════════════════════════════════════════
// JPEG
// ═══════════════════════════════════════════════════════════════

fn parse_jpeg(data: &[u8]) -> ContainerInfo {
    let mut info = ContainerInfo::new(ContainerFormat::Jpeg);
    let mut jfif_dpi = None;
    let mut exif_dpi = None;
    let mut pos = 2;

    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            break;
        }
        let marker = data[pos + 1];
        if marker == 0xFF {
            // fill byte
            pos += 1;
            continue;
        }
        pos += 2;
        match marker {
            0x01 | 0xD0..=0xD8 => continue,
            0xD9 | 0xDA => break,
            _ => {}
        }

        let Some(len) = be_u16(data, pos).map(usize::from) else {
            break;
        };
        if len < 2 {
            break;
        }
        let Some(segment) = bytes_at(data, pos + 2, len - 2) else {
            break;
        };

        match marker {
            0xE0 if segment.starts_with(b"JFIF\0") => jfif_dpi = jfif_density(segment),
            0xE1 if segment.starts_with(b"Exif\0\0") => {
                exif_dpi = read_tiff_tags(&mut Cursor::new(&segment[6..]))
                    .and_then(|tags| tags.exif_dpi());
            }
            // SOF0-SOF15, excluding DHT (C4), JPG (C8) and DAC (CC)
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                if let (Some(h), Some(w), Some(&components)) =
                    (be_u16(segment, 1), be_u16(segment, 3), segment.get(5))
                {
                    info.dimensions = Some((u32::from(w), u32::from(h)));
                    info.mode_hint = match components {
                        1 => Some(ColorMode::L),
                        3 => Some(ColorMode::Rgb),
                        4 => Some(ColorMode::Cmyk),
                        _ => None,
                    };
                }
                break;
            }
            _ => {}
        }
        pos += len;
    }

    info.dpi = jfif_dpi.or(exif_dpi);
    info
}

/// JFIF APP0: "JFIF\0", version(2), units(1), Xdensity(2), Ydensity(2).
/// Units 0 only declares an aspect ratio.
fn jfif_density(segment: &[u8]) -> Option<(f64, f64)> {
    let units = *segment.get(7)?;
    let x = f64::from(be_u16(segment, 8)?);
    let y = f64::from(be_u16(segment, 10)?);
    match units {
        1 => Some((x, y)),
        2 => Some((x * CM_PER_INCH, y * CM_PER_INCH)),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════
// PNG
// ═══════════════════════════════════════════════════════════════

fn parse_png(data: &[u8]) -> ContainerInfo {
    let mut info = ContainerInfo::new(ContainerFormat::Png);
    let mut pos = 8;

    while let (Some(len), Some(kind)) = (be_u32(data, pos), bytes_at(data, pos + 4, 4)) {
        let len = len as usize;
        let Some(body) = bytes_at(data, pos + 8, len) else {
            break;
        };
        match kind {
            b"IHDR" => {
                if let (Some(w), Some(h), Some(&depth), Some(&color_type)) =
                    (be_u32(body, 0), be_u32(body, 4), body.get(8), body.get(9))
                {
                    info.dimensions = Some((w, h));
                    info.mode_hint = match (color_type, depth) {
                        (0, 1) => Some(ColorMode::Bilevel),
                        (0, 16) => Some(ColorMode::I16),
                        (0, _) => Some(ColorMode::L),
                        (2, _) => Some(ColorMode::Rgb),
                        (3, _) => Some(ColorMode::P),
                        (4, _) => Some(ColorMode::La),
                        (6, _) => Some(ColorMode::Rgba),
                        _ => None,
                    };
                }
            }
            // unit 1 = pixels per metre; unit 0 is aspect ratio only
            b"pHYs" => {
                if let (Some(px), Some(py), Some(&1)) = (be_u32(body, 0), be_u32(body, 4), body.get(8)) {
                    info.dpi = Some((px as f64 * METRES_PER_INCH, py as f64 * METRES_PER_INCH));
                }
            }
            b"IDAT" | b"IEND" => break,
            _ => {}
        }
        // length + type + body + crc
        pos = match pos.checked_add(12 + len) {
            Some(next) => next,
            None => break,
        };
    }
    info
}

// ═══════════════════════════════════════════════════════════════
// BMP / GIF
// ═══════════════════════════════════════════════════════════════

fn parse_bmp(data: &[u8]) -> ContainerInfo {
    let mut info = ContainerInfo::new(ContainerFormat::Bmp);
    let Some(dib_size) = le_u32(data, 14) else {
        return info;
    };

    let bit_count = if dib_size == 12 {
        // OS/2 BITMAPCOREHEADER
        if let (Some(w), Some(h)) = (le_u16(data, 18), le_u16(data, 20)) {
            info.dimensions = Some((u32::from(w), u32::from(h)));
        }
        le_u16(data, 24)
    } else {
        if let (Some(w), Some(h)) = (le_i32(data, 18), le_i32(data, 22)) {
            info.dimensions = Some((w.unsigned_abs(), h.unsigned_abs()));
        }
        if dib_size >= 40 {
            if let (Some(xppm), Some(yppm)) = (le_i32(data, 38), le_i32(data, 42)) {
                if xppm != 0 || yppm != 0 {
                    info.dpi = Some((
                        f64::from(xppm) * METRES_PER_INCH,
                        f64::from(yppm) * METRES_PER_INCH,
                    ));
                }
            }
        }
        le_u16(data, 28)
    };

    if matches!(bit_count, Some(1..=8)) {
        info.mode_hint = Some(ColorMode::P);
    }
    info
}

fn parse_gif(data: &[u8]) -> ContainerInfo {
    let mut info = ContainerInfo::new(ContainerFormat::Gif);
    if let (Some(w), Some(h)) = (le_u16(data, 6), le_u16(data, 8)) {
        info.dimensions = Some((u32::from(w), u32::from(h)));
    }
    info.mode_hint = Some(ColorMode::P);
    info
}

// ═══════════════════════════════════════════════════════════════
// TIFF / EXIF IFD0
// ═══════════════════════════════════════════════════════════════

const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_BITS_PER_SAMPLE: u16 = 258;
const TAG_PHOTOMETRIC: u16 = 262;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_X_RESOLUTION: u16 = 282;
const TAG_Y_RESOLUTION: u16 = 283;
const TAG_RESOLUTION_UNIT: u16 = 296;

const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_RATIONAL: u16 = 5;

#[derive(Debug, Default, Clone, PartialEq)]
struct TiffTags {
    width: Option<u32>,
    height: Option<u32>,
    bits_per_sample: Option<u32>,
    photometric: Option<u32>,
    samples_per_pixel: Option<u32>,
    x_resolution: Option<f64>,
    y_resolution: Option<f64>,
    resolution_unit: Option<u32>,
}

impl TiffTags {
    fn dimensions(&self) -> Option<(u32, u32)> {
        Some((self.width?, self.height?))
    }

    /// Standalone TIFF: a missing unit means inches, 1 means "no absolute unit".
    fn file_dpi(&self) -> Option<(f64, f64)> {
        let x = self.x_resolution?;
        let y = self.y_resolution.unwrap_or(x);
        match self.resolution_unit {
            None | Some(2) => Some((x, y)),
            Some(3) => Some((x * CM_PER_INCH, y * CM_PER_INCH)),
            _ => None,
        }
    }

    /// EXIF in JPEG: resolution is only trusted when the unit is declared, and
    /// the X resolution stands for both axes.
    fn exif_dpi(&self) -> Option<(f64, f64)> {
        let x = self.x_resolution?;
        let dpi = match self.resolution_unit? {
            3 => x * CM_PER_INCH,
            _ => x,
        };
        Some((dpi, dpi))
    }

    fn mode_hint(&self) -> Option<ColorMode> {
        let bits = self.bits_per_sample.unwrap_or(1);
        let samples = self.samples_per_pixel.unwrap_or(1);
        match self.photometric? {
            0 | 1 => Some(match (bits, samples) {
                (1, _) => ColorMode::Bilevel,
                (_, s) if s >= 2 => ColorMode::La,
                (16, _) => ColorMode::I16,
                _ => ColorMode::L,
            }),
            2 if samples >= 4 => Some(ColorMode::Rgba),
            2 => Some(ColorMode::Rgb),
            3 => Some(ColorMode::P),
            5 => Some(ColorMode::Cmyk),
            _ => None,
        }
    }
}

#[derive(Clone, Copy)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn u16(self, b: [u8; 2]) -> u16 {
        match self {
            ByteOrder::Little => u16::from_le_bytes(b),
            ByteOrder::Big => u16::from_be_bytes(b),
        }
    }

    fn u32(self, b: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Little => u32::from_le_bytes(b),
            ByteOrder::Big => u32::from_be_bytes(b),
        }
    }
}

fn read_array<const N: usize, R: Read>(r: &mut R) -> Option<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf).ok()?;
    Some(buf)
}

/// Reads the tags of IFD0 from a TIFF structure starting at offset 0 of `r`.
fn read_tiff_tags<R: Read + Seek>(r: &mut R) -> Option<TiffTags> {
    let order = match &read_array::<2, _>(r)? {
        b"II" => ByteOrder::Little,
        b"MM" => ByteOrder::Big,
        _ => return None,
    };
    if order.u16(read_array(r)?) != 42 {
        return None;
    }
    let ifd_offset = order.u32(read_array(r)?);
    r.seek(SeekFrom::Start(u64::from(ifd_offset))).ok()?;

    let count = order.u16(read_array(r)?).min(MAX_IFD_ENTRIES);
    let mut entries = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let Some(entry) = read_array::<12, _>(r) else {
            break;
        };
        entries.push(entry);
    }

    let mut tags = TiffTags::default();
    for entry in entries {
        let tag = order.u16([entry[0], entry[1]]);
        let kind = order.u16([entry[2], entry[3]]);
        let count = order.u32([entry[4], entry[5], entry[6], entry[7]]);
        let value = [entry[8], entry[9], entry[10], entry[11]];

        match tag {
            TAG_IMAGE_WIDTH => tags.width = scalar(order, kind, value),
            TAG_IMAGE_LENGTH => tags.height = scalar(order, kind, value),
            TAG_PHOTOMETRIC => tags.photometric = scalar(order, kind, value),
            TAG_SAMPLES_PER_PIXEL => tags.samples_per_pixel = scalar(order, kind, value),
            TAG_RESOLUTION_UNIT => tags.resolution_unit = scalar(order, kind, value),
            TAG_BITS_PER_SAMPLE => {
                tags.bits_per_sample = if kind == TYPE_SHORT && count > 2 {
                    // values live at an offset; all samples share a depth in practice
                    let at = order.u32(value);
                    r.seek(SeekFrom::Start(u64::from(at)))
                        .ok()
                        .and_then(|_| read_array(r))
                        .map(|b| u32::from(order.u16(b)))
                } else {
                    scalar(order, kind, value)
                };
            }
            TAG_X_RESOLUTION | TAG_Y_RESOLUTION if kind == TYPE_RATIONAL => {
                let at = order.u32(value);
                let res = r
                    .seek(SeekFrom::Start(u64::from(at)))
                    .ok()
                    .and_then(|_| {
                        let num = order.u32(read_array(r)?);
                        let den = order.u32(read_array(r)?);
                        (den != 0).then(|| f64::from(num) / f64::from(den))
                    });
                if tag == TAG_X_RESOLUTION {
                    tags.x_resolution = res;
                } else {
                    tags.y_resolution = res;
                }
            }
            _ => {}
        }
    }
    Some(tags)
}

/// First value of a SHORT or LONG entry stored inline.
fn scalar(order: ByteOrder, kind: u16, value: [u8; 4]) -> Option<u32> {
    match kind {
        TYPE_SHORT => Some(u32::from(order.u16([value[0], value[1]]))),
        TYPE_LONG => Some(order.u32(value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, RgbImage};

    fn jpeg_bytes(w: u32, h: u32) -> Vec<u8> {
        let img: RgbImage = ImageBuffer::from_pixel(w, h, Rgb([10, 20, 30]));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Jpeg)
            .unwrap();
        out
    }

    /// Replaces the encoder's APP0 (if any) with a JFIF segment carrying the density.
    fn with_jfif_density(jpeg: &[u8], units: u8, x: u16, y: u16) -> Vec<u8> {
        let mut rest = &jpeg[2..];
        if rest.len() > 4 && rest[0] == 0xFF && rest[1] == 0xE0 {
            let len = usize::from(u16::from_be_bytes([rest[2], rest[3]]));
            rest = &rest[2 + len..];
        }
        let mut out = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
        out.extend_from_slice(b"JFIF\0");
        out.extend_from_slice(&[1, 1, units]);
        out.extend_from_slice(&x.to_be_bytes());
        out.extend_from_slice(&y.to_be_bytes());
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(rest);
        out
    }

    #[test]
    fn test_sniff() {
        assert_eq!(sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ContainerFormat::Jpeg));
        assert_eq!(sniff(b"GIF89a.."), Some(ContainerFormat::Gif));
        assert_eq!(sniff(b"II*\0...."), Some(ContainerFormat::Tiff));
        assert_eq!(sniff(b"MM\0*...."), Some(ContainerFormat::Tiff));
        assert_eq!(sniff(b"BM......"), Some(ContainerFormat::Bmp));
        assert_eq!(sniff(b"RIFF"), None);
        assert_eq!(sniff(&[]), None);
    }

    #[test]
    fn test_jpeg_jfif_density_and_sof() {
        let data = with_jfif_density(&jpeg_bytes(90, 120), 1, 300, 300);
        let info = inspect_bytes(&data).unwrap();
        assert_eq!(info.format, ContainerFormat::Jpeg);
        assert_eq!(info.dimensions, Some((90, 120)));
        assert_eq!(info.dpi, Some((300.0, 300.0)));
        assert_eq!(info.mode_hint, Some(ColorMode::Rgb));
    }

    #[test]
    fn test_jpeg_jfif_dots_per_cm() {
        let data = with_jfif_density(&jpeg_bytes(8, 8), 2, 100, 50);
        let info = inspect_bytes(&data).unwrap();
        let (x, y) = info.dpi.unwrap();
        assert!((x - 254.0).abs() < 1e-9);
        assert!((y - 127.0).abs() < 1e-9);
    }

    #[test]
    fn test_jpeg_aspect_only_density_has_no_dpi() {
        let data = with_jfif_density(&jpeg_bytes(8, 8), 0, 1, 1);
        assert_eq!(inspect_bytes(&data).unwrap().dpi, None);
    }

    #[test]
    fn test_truncated_jpeg_is_tolerated() {
        let data = jpeg_bytes(16, 16);
        for cut in [3, 5, 20, 40] {
            let info = inspect_bytes(&data[..cut]).unwrap();
            assert_eq!(info.format, ContainerFormat::Jpeg);
        }
    }

    fn png_with_phys(ppm: u32, unit: u8) -> Vec<u8> {
        let img: RgbImage = ImageBuffer::from_pixel(4, 3, Rgb([1, 2, 3]));
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        // insert pHYs right after IHDR (8 signature + 25 IHDR chunk)
        let mut body = Vec::new();
        body.extend_from_slice(&ppm.to_be_bytes());
        body.extend_from_slice(&ppm.to_be_bytes());
        body.push(unit);
        let mut chunk = Vec::new();
        chunk.extend_from_slice(&9u32.to_be_bytes());
        chunk.extend_from_slice(b"pHYs");
        chunk.extend_from_slice(&body);
        chunk.extend_from_slice(&[0, 0, 0, 0]);
        let mut out = png[..33].to_vec();
        out.extend_from_slice(&chunk);
        out.extend_from_slice(&png[33..]);
        out
    }

    #[test]
    fn test_png_phys_per_metre() {
        let info = inspect_bytes(&png_with_phys(11811, 1)).unwrap();
        assert_eq!(info.dimensions, Some((4, 3)));
        assert_eq!(info.mode_hint, Some(ColorMode::Rgb));
        let (x, _) = info.dpi.unwrap();
        assert_eq!(x.round(), 300.0);
    }

    #[test]
    fn test_png_phys_unknown_unit_ignored() {
        let info = inspect_bytes(&png_with_phys(11811, 0)).unwrap();
        assert_eq!(info.dpi, None);
    }

    #[test]
    fn test_gif_is_palette() {
        let mut data = b"GIF89a".to_vec();
        data.extend_from_slice(&7u16.to_le_bytes());
        data.extend_from_slice(&5u16.to_le_bytes());
        let info = inspect_bytes(&data).unwrap();
        assert_eq!(info.dimensions, Some((7, 5)));
        assert_eq!(info.mode_hint, Some(ColorMode::P));
    }

    fn bmp_header(bit_count: u16, ppm: i32) -> Vec<u8> {
        let mut d = vec![0u8; 54];
        d[0] = b'B';
        d[1] = b'M';
        d[14..18].copy_from_slice(&40u32.to_le_bytes());
        d[18..22].copy_from_slice(&10i32.to_le_bytes());
        d[22..26].copy_from_slice(&(-20i32).to_le_bytes());
        d[28..30].copy_from_slice(&bit_count.to_le_bytes());
        d[38..42].copy_from_slice(&ppm.to_le_bytes());
        d[42..46].copy_from_slice(&ppm.to_le_bytes());
        d
    }

    #[test]
    fn test_bmp_header() {
        let info = inspect_bytes(&bmp_header(24, 3780)).unwrap();
        assert_eq!(info.dimensions, Some((10, 20)));
        assert_eq!(info.mode_hint, None);
        assert_eq!(info.dpi.map(|d| d.0.round()), Some(96.0));

        let info = inspect_bytes(&bmp_header(8, 0)).unwrap();
        assert_eq!(info.mode_hint, Some(ColorMode::P));
        assert_eq!(info.dpi, None);
    }

    /// Minimal little-endian TIFF header + IFD0 with the given entries; rationals
    /// are appended after the IFD.
    fn tiff_bytes(photometric: u16, samples: u16, res: Option<(u32, u32)>, unit: Option<u16>) -> Vec<u8> {
        let mut entries: Vec<(u16, u16, u32, [u8; 4])> = vec![
            (256, 3, 1, [5, 0, 0, 0]),
            (257, 3, 1, [6, 0, 0, 0]),
            (258, 3, 1, [8, 0, 0, 0]),
            (262, 3, 1, [photometric as u8, 0, 0, 0]),
            (277, 3, 1, [samples as u8, 0, 0, 0]),
        ];
        let ifd_len = 2 + 12 * (entries.len() + res.map_or(0, |_| 2) + unit.map_or(0, |_| 1)) + 4;
        let rational_at = (8 + ifd_len) as u32;
        if res.is_some() {
            entries.push((282, 5, 1, rational_at.to_le_bytes()));
            entries.push((283, 5, 1, (rational_at + 8).to_le_bytes()));
        }
        if let Some(u) = unit {
            entries.push((296, 3, 1, [u as u8, 0, 0, 0]));
        }

        let mut d = b"II*\0".to_vec();
        d.extend_from_slice(&8u32.to_le_bytes());
        d.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        for (tag, kind, count, value) in &entries {
            d.extend_from_slice(&tag.to_le_bytes());
            d.extend_from_slice(&kind.to_le_bytes());
            d.extend_from_slice(&count.to_le_bytes());
            d.extend_from_slice(value);
        }
        d.extend_from_slice(&0u32.to_le_bytes());
        if let Some((num, den)) = res {
            for _ in 0..2 {
                d.extend_from_slice(&num.to_le_bytes());
                d.extend_from_slice(&den.to_le_bytes());
            }
        }
        d
    }

    #[test]
    fn test_tiff_cmyk_with_resolution() {
        let info = inspect_bytes(&tiff_bytes(5, 4, Some((600, 2)), Some(2))).unwrap();
        assert_eq!(info.format, ContainerFormat::Tiff);
        assert_eq!(info.dimensions, Some((5, 6)));
        assert_eq!(info.mode_hint, Some(ColorMode::Cmyk));
        assert_eq!(info.dpi, Some((300.0, 300.0)));
    }

    #[test]
    fn test_tiff_resolution_units() {
        let cm = inspect_bytes(&tiff_bytes(2, 3, Some((100, 1)), Some(3))).unwrap();
        assert_eq!(cm.dpi, Some((254.0, 254.0)));
        assert_eq!(cm.mode_hint, Some(ColorMode::Rgb));

        let missing_unit = inspect_bytes(&tiff_bytes(2, 4, Some((72, 1)), None)).unwrap();
        assert_eq!(missing_unit.dpi, Some((72.0, 72.0)));
        assert_eq!(missing_unit.mode_hint, Some(ColorMode::Rgba));

        let no_unit = inspect_bytes(&tiff_bytes(1, 1, Some((72, 1)), Some(1))).unwrap();
        assert_eq!(no_unit.dpi, None);
        assert_eq!(no_unit.mode_hint, Some(ColorMode::L));
    }

    #[test]
    fn test_tiff_zero_denominator() {
        let info = inspect_bytes(&tiff_bytes(2, 3, Some((300, 0)), Some(2))).unwrap();
        assert_eq!(info.dpi, None);
    }

    #[test]
    fn test_exif_dpi_requires_unit() {
        let tags = TiffTags {
            x_resolution: Some(200.0),
            y_resolution: Some(100.0),
            ..Default::default()
        };
        assert_eq!(tags.exif_dpi(), None);
        let tags = TiffTags {
            resolution_unit: Some(2),
            ..tags
        };
        assert_eq!(tags.exif_dpi(), Some((200.0, 200.0)));
    }

    #[test]
    fn test_inspect_file_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scan.tif");
        std::fs::write(&path, tiff_bytes(5, 4, Some((300, 1)), Some(2))).unwrap();
        let info = inspect(&path).unwrap().unwrap();
        assert_eq!(info.dpi, Some((300.0, 300.0)));

        let junk = dir.path().join("junk.jpg");
        std::fs::write(&junk, b"not an image").unwrap();
        assert_eq!(inspect(&junk).unwrap(), None);
    }
}
