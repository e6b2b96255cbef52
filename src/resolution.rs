// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Reads the scan resolution embedded in an image file. The `image` crate
//! does not surface this, so we look at the container directly: PNG `pHYs`,
//! the JPEG JFIF header, and EXIF X/YResolution for everything else.

use std::io::Cursor;

use image::ImageFormat;
use log::debug;

const METERS_PER_INCH: f64 = 0.0254;
const CM_PER_INCH: f64 = 2.54;

/// Dots per inch along each image axis.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Resolution {
    pub vertical: f64,
    pub horizontal: f64,
}

impl Resolution {
    pub fn new(vertical: f64, horizontal: f64) -> Resolution {
        Resolution{vertical, horizontal}
    }

    fn usable(self) -> Option<Resolution> {
        let ok = |v: f64| v.is_finite() && v > 0.0;
        if ok(self.vertical) && ok(self.horizontal) { Some(self) } else { None }
    }
}

/// Returns the resolution recorded in the encoded image `bytes`, or None if
/// the file carries no (or only a unitless) resolution.
pub fn read_resolution(bytes: &[u8]) -> Option<Resolution> {
    let format = image::guess_format(bytes).ok();
    debug!("Reading resolution for format {:?}", format);
    let found = match format {
        Some(ImageFormat::Png) => png_resolution(bytes).or_else(|| exif_resolution(bytes)),
        Some(ImageFormat::Jpeg) => jfif_resolution(bytes).or_else(|| exif_resolution(bytes)),
        _ => exif_resolution(bytes),
    };
    found.and_then(Resolution::usable)
}

fn png_resolution(bytes: &[u8]) -> Option<Resolution> {
    let decoder = png::Decoder::new(Cursor::new(bytes));
    let reader = decoder.read_info().ok()?;
    let dims = reader.info().pixel_dims?;
    match dims.unit {
        png::Unit::Meter => Some(Resolution::new(dims.yppu as f64 * METERS_PER_INCH,
                                                 dims.xppu as f64 * METERS_PER_INCH)),
        png::Unit::Unspecified => None,
    }
}

// JFIF APP0 segment directly following SOI:
// FFD8 FFE0 <len:2> "JFIF\0" <version:2> <units:1> <xdensity:2> <ydensity:2>
fn jfif_resolution(bytes: &[u8]) -> Option<Resolution> {
    if bytes.len() < 18 || bytes[0..4] != [0xFF, 0xD8, 0xFF, 0xE0] ||
        &bytes[6..11] != b"JFIF\0" {
        return None;
    }
    let units = bytes[13];
    let x_density = u16::from_be_bytes([bytes[14], bytes[15]]) as f64;
    let y_density = u16::from_be_bytes([bytes[16], bytes[17]]) as f64;
    match units {
        1 => Some(Resolution::new(y_density, x_density)),
        2 => Some(Resolution::new(y_density * CM_PER_INCH, x_density * CM_PER_INCH)),
        _ => None,  // Aspect ratio only.
    }
}

fn exif_resolution(bytes: &[u8]) -> Option<Resolution> {
    let mut cursor = Cursor::new(bytes);
    let metadata = exif::Reader::new().read_from_container(&mut cursor).ok()?;
    let rational = |tag: exif::Tag| -> Option<f64> {
        match &metadata.get_field(tag, exif::In::PRIMARY)?.value {
            exif::Value::Rational(v) if !v.is_empty() => Some(v[0].to_f64()),
            _ => None,
        }
    };
    let x = rational(exif::Tag::XResolution)?;
    let y = rational(exif::Tag::YResolution).unwrap_or(x);
    // 2 = inches (the default), 3 = centimeters.
    let unit = metadata.get_field(exif::Tag::ResolutionUnit, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(2);
    match unit {
        2 => Some(Resolution::new(y, x)),
        3 => Some(Resolution::new(y * CM_PER_INCH, x * CM_PER_INCH)),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) fn encode_png(image: &image::GrayImage, dpi: Option<u32>) -> Vec<u8> {
    let mut bytes = Vec::new();
    {
        let (width, height) = image.dimensions();
        let mut encoder = png::Encoder::new(&mut bytes, width, height);
        encoder.set_color(png::ColorType::Grayscale);
        encoder.set_depth(png::BitDepth::Eight);
        if let Some(dpi) = dpi {
            let ppm = (dpi as f64 / METERS_PER_INCH).round() as u32;
            encoder.set_pixel_dims(Some(png::PixelDimensions{
                xppu: ppm, yppu: ppm, unit: png::Unit::Meter}));
        }
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(image.as_raw()).unwrap();
    }
    bytes
}
