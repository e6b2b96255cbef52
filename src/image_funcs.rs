// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::fs;
use std::path::Path;
use std::time::Instant;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};
use log::{debug, info};

use crate::config::Region;
use crate::error::{GradeError, Result};
use crate::histogram_funcs::{histogram_of, stats_for_histogram};
use crate::resolution::{read_resolution, Resolution};

/// Opens `path`, resamples it to `expected_dpi` ([vertical, horizontal]) and
/// returns it as 8-bit grayscale.
pub fn load_image(path: &Path, expected_dpi: [f64; 2]) -> Result<GrayImage> {
    let load_start = Instant::now();
    let name = path.display().to_string();
    let bytes = fs::read(path).map_err(
        |e| GradeError::load(name.as_str(), "could not read file", e))?;
    let resolution = match read_resolution(&bytes) {
        Some(r) => r,
        None => return Err(GradeError::Load{
            path: name, message: "no resolution metadata".to_string(), source: None}),
    };
    let decoded = image::load_from_memory(&bytes).map_err(
        |e| GradeError::load(name.as_str(), "could not decode image", e))?;
    let gray = normalize_image(decoded, resolution, expected_dpi).map_err(
        |message| GradeError::Load{path: name.clone(), message, source: None})?;
    info!("Loaded {} at {:?} dpi as {}x{} in {:?}",
          name, resolution, gray.width(), gray.height(), load_start.elapsed());
    Ok(gray)
}

/// Converts `image` to grayscale, resizing (bicubic) when its resolution
/// differs from `expected_dpi`. New dimensions are rounded to whole pixels.
pub fn normalize_image(image: DynamicImage, resolution: Resolution, expected_dpi: [f64; 2])
                       -> std::result::Result<GrayImage, String> {
    let gray = image.to_luma8();
    let (width, height) = gray.dimensions();
    let new_height = (height as f64 * expected_dpi[0] / resolution.vertical).round() as u32;
    let new_width = (width as f64 * expected_dpi[1] / resolution.horizontal).round() as u32;
    if new_width == 0 || new_height == 0 {
        return Err(format!("resampling {}x{} from {:?} to {:?} dpi leaves no pixels",
                           width, height, resolution, expected_dpi));
    }
    if (new_width, new_height) == (width, height) {
        return Ok(gray);
    }
    debug!("Resizing {}x{} to {}x{}", width, height, new_width, new_height);
    Ok(imageops::resize(&gray, new_width, new_height, FilterType::CatmullRom))
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Bounds {
    top: u32,
    bottom: u32,  // One past.
    left: u32,
    right: u32,  // One past.
}

impl Bounds {
    fn is_empty(&self) -> bool {
        self.top >= self.bottom || self.left >= self.right
    }
}

#[derive(Copy, Clone, Debug)]
enum Edge {
    Right,
    Bottom,
    Left,
    Top,
}

// Edges in the order a view rotated counter-clockwise by 90 degrees brings
// them to the top.
const TRIM_ORDER: [Edge; 4] = [Edge::Right, Edge::Bottom, Edge::Left, Edge::Top];

fn edge_stddev(image: &GrayImage, b: &Bounds, edge: Edge) -> f64 {
    let histogram = match edge {
        Edge::Right => histogram_of(
            (b.top..b.bottom).map(|y| image.get_pixel(b.right - 1, y).0[0])),
        Edge::Left => histogram_of(
            (b.top..b.bottom).map(|y| image.get_pixel(b.left, y).0[0])),
        Edge::Bottom => histogram_of(
            (b.left..b.right).map(|x| image.get_pixel(x, b.bottom - 1).0[0])),
        Edge::Top => histogram_of(
            (b.left..b.right).map(|x| image.get_pixel(x, b.top).0[0])),
    };
    stats_for_histogram(&histogram).stddev
}

/// Strips blank (low standard deviation) rows and columns from all four
/// edges until a full pass over the edges removes nothing.
///
/// Every pass except the last shrinks the image, so this terminates after at
/// most width + height passes. Fails if the whole image gets trimmed away.
pub fn trim_margins(image: &GrayImage, trim_std: f64) -> Result<GrayImage> {
    let trim_start = Instant::now();
    let (width, height) = image.dimensions();
    let empty = || GradeError::EmptyImage{width, height, trim_std};
    let mut bounds = Bounds{top: 0, bottom: height, left: 0, right: width};
    if bounds.is_empty() {
        return Err(empty());
    }
    let mut passes = 0;
    loop {
        passes += 1;
        let before = bounds;
        for edge in TRIM_ORDER {
            if edge_stddev(image, &bounds, edge) >= trim_std {
                continue;
            }
            match edge {
                Edge::Right => bounds.right -= 1,
                Edge::Bottom => bounds.bottom -= 1,
                Edge::Left => bounds.left += 1,
                Edge::Top => bounds.top += 1,
            }
            if bounds.is_empty() {
                return Err(empty());
            }
        }
        if bounds == before {
            break;
        }
    }
    let trimmed = imageops::crop_imm(image, bounds.left, bounds.top,
                                     bounds.right - bounds.left,
                                     bounds.bottom - bounds.top).to_image();
    info!("Trimmed {}x{} to {}x{} in {} passes, {:?}",
          width, height, trimmed.width(), trimmed.height(), passes,
          trim_start.elapsed());
    Ok(trimmed)
}

/// Checks the image's rows x cols against `expected_size`, allowing a
/// fractional deviation of `tolerance` per axis (inclusive).
pub fn check_size(image: &GrayImage, expected_size: [u32; 2], tolerance: [f64; 2])
                  -> Result<()> {
    let actual = [image.height(), image.width()];
    for axis in 0..2 {
        let deviation = actual[axis].abs_diff(expected_size[axis]) as f64 /
            expected_size[axis] as f64;
        if deviation > tolerance[axis] {
            return Err(GradeError::SizeTolerance{actual, expected: expected_size, tolerance});
        }
    }
    Ok(())
}

/// Two-level threshold: values at or above `contrast` become 255, the rest 0.
pub fn binarize(image: &GrayImage, contrast: f64) -> GrayImage {
    let mut bw = image.clone();
    for pixel in bw.pixels_mut() {
        pixel.0[0] = if pixel.0[0] as f64 >= contrast { 255 } else { 0 };
    }
    bw
}

/// Summed-area table over a grayscale image, giving O(1) rectangle means.
pub struct SummedAreaTable {
    width: u32,
    height: u32,
    // (width+1) x (height+1), zero first row and column.
    table: Vec<u64>,
}

impl SummedAreaTable {
    pub fn new(image: &GrayImage) -> SummedAreaTable {
        let (width, height) = image.dimensions();
        let stride = (width + 1) as usize;
        let mut table = vec![0_u64; stride * (height + 1) as usize];
        let pixels = image.as_raw();
        for y in 0..height as usize {
            let mut row_sum: u64 = 0;
            for x in 0..width as usize {
                row_sum += pixels[y * width as usize + x] as u64;
                table[(y + 1) * stride + x + 1] = row_sum + table[y * stride + x + 1];
            }
        }
        SummedAreaTable{width, height, table}
    }

    /// Mean pixel value within `region`, or None if the region is empty or
    /// not entirely inside the image.
    pub fn mean(&self, region: &Region) -> Option<f64> {
        if region.is_empty() || !region.fits_within(self.width, self.height) {
            return None;
        }
        let stride = (self.width + 1) as usize;
        let (r0, r1) = (region.row_min as usize, region.row_max as usize);
        let (c0, c1) = (region.col_min as usize, region.col_max as usize);
        let sum = self.table[r1 * stride + c1] + self.table[r0 * stride + c0]
            - self.table[r0 * stride + c1] - self.table[r1 * stride + c0];
        Some(sum as f64 / (region.height() as f64 * region.width() as f64))
    }
}
