// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Human review artifacts. Nothing here feeds back into grading: overlays
//! are drawn on copies of the analysed image.

use image::imageops;
use image::{GrayImage, Luma};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use log::{debug, warn};

use crate::alignment::Alignment;
use crate::bubbles::BubbleMeans;
use crate::config::Region;
use crate::geometry::{CoordinateMatrix, FormGeometry};

const EXPECTED_VALUE: u8 = 150;
const FITTED_VALUE: u8 = 0;
const PANEL_VALUE: u8 = 120;
const MARKER_RADIUS: i32 = 10;
const PANEL_MARKER_RADIUS: i32 = 15;
// Distance of each box's panel marker from the panel centre.
const PANEL_SPREAD: i32 = 25;

/// Draws a "+" centred on (row, col). Parts outside the image are clipped.
pub fn draw_plus(image: &mut GrayImage, row: i32, col: i32, value: u8, radius: i32) {
    let (r, c) = (row as f32, col as f32);
    let d = radius as f32;
    draw_line_segment_mut(image, (c - d, r), (c + d, r), Luma([value]));
    draw_line_segment_mut(image, (c, r - d), (c, r + d), Luma([value]));
}

/// Paints every bubble with its mean value.
pub fn overlay_bubble_means(image: &mut GrayImage, coords: &CoordinateMatrix,
                            means: &BubbleMeans) {
    for (i, j, region) in coords.iter() {
        let value = means.get(i, j).round().clamp(0.0, 255.0) as u8;
        draw_filled_rect_mut(image,
                             Rect::at(region.col_min, region.row_min)
                             .of_size(region.width() as u32, region.height() as u32),
                             Luma([value]));
    }
}

/// Marks the expected (gray) and fitted (black) upper-left and lower-right
/// corners of each reference box. With exactly four boxes and a panel
/// position, also draws a compact summary panel: one gray marker per box
/// with a black marker displaced by that box's fit, and a centre marker pair
/// for the overall offset.
pub fn overlay_ref_fit(image: &mut GrayImage, refzone: &[Region], alignment: &Alignment,
                       ref_panel: Option<[i32; 2]>) {
    for (region, fit) in refzone.iter().zip(&alignment.fits) {
        draw_plus(image, region.row_min, region.col_min, EXPECTED_VALUE, MARKER_RADIUS);
        draw_plus(image, region.row_max, region.col_max, EXPECTED_VALUE, MARKER_RADIUS);
        if let Some([dr, dc]) = fit {
            draw_plus(image, region.row_min + dr, region.col_min + dc,
                      FITTED_VALUE, MARKER_RADIUS);
            draw_plus(image, region.row_max + dr, region.col_max + dc,
                      FITTED_VALUE, MARKER_RADIUS);
        }
    }

    let [pr, pc] = match ref_panel {
        Some(p) if refzone.len() == 4 => p,
        Some(_) => {
            debug!("Reference panel needs 4 boxes, form has {}", refzone.len());
            return;
        },
        None => return,
    };
    let [mr, mc] = alignment.offset;
    draw_plus(image, pr, pc, EXPECTED_VALUE, PANEL_MARKER_RADIUS);
    draw_plus(image, pr + mr, pc + mc, FITTED_VALUE, MARKER_RADIUS);
    let centers = [(pr - PANEL_SPREAD, pc - PANEL_SPREAD), (pr - PANEL_SPREAD, pc + PANEL_SPREAD),
                   (pr + PANEL_SPREAD, pc - PANEL_SPREAD), (pr + PANEL_SPREAD, pc + PANEL_SPREAD)];
    for (fit, (cr, cc)) in alignment.fits.iter().zip(centers) {
        draw_plus(image, cr, cc, PANEL_VALUE, PANEL_MARKER_RADIUS);
        if let Some([dr, dc]) = fit {
            draw_plus(image, cr + dr, cc + dc, FITTED_VALUE, MARKER_RADIUS);
        }
    }
}

/// Validation image: a copy of `image` with bubble means painted in and,
/// if the scan was aligned, the reference fit markers.
pub fn render_validation(image: &GrayImage, geometry: &FormGeometry, means: &BubbleMeans,
                         alignment: Option<&Alignment>) -> GrayImage {
    let mut overlay = image.clone();
    overlay_bubble_means(&mut overlay, geometry.coords(), means);
    if let Some(alignment) = alignment {
        let config = geometry.config();
        overlay_ref_fit(&mut overlay, &config.refzone, alignment, config.ref_panel);
    }
    overlay
}

// Crops `region` clipped to the image, rotated 90 degrees counter-clockwise.
fn rotated_crop(image: &GrayImage, region: &Region, what: &str) -> Option<GrayImage> {
    let top = region.row_min.max(0) as u32;
    let left = region.col_min.max(0) as u32;
    let bottom = (region.row_max.max(0) as u32).min(image.height());
    let right = (region.col_max.max(0) as u32).min(image.width());
    if top >= bottom || left >= right {
        warn!("{} region {:?} is outside the {}x{} image",
              what, region.as_array(), image.width(), image.height());
        return None;
    }
    let crop = imageops::crop_imm(image, left, top, right - left, bottom - top).to_image();
    Some(imageops::rotate270(&crop))
}

/// Name image: the rotated `info` crop, with the rotated `score` crop (if
/// any) placed to its right. When stacking, the name crop is narrowed to the
/// `info_band` rows if configured. Returns None if the form has no info
/// region or it lies outside the image.
pub fn render_info_image(image: &GrayImage, geometry: &FormGeometry) -> Option<GrayImage> {
    let name = rotated_crop(image, &geometry.info()?, "info")?;
    let score = match geometry.score() {
        Some(region) => match rotated_crop(image, &region, "score") {
            Some(s) => s,
            None => return Some(name),
        },
        None => return Some(name),
    };
    let name = match geometry.config().info_band {
        Some([start, end]) if start < name.height() => {
            let end = end.min(name.height());
            imageops::crop_imm(&name, 0, start, name.width(), end - start).to_image()
        },
        Some(band) => {
            warn!("info_band {:?} is outside the {}-row name image", band, name.height());
            name
        },
        None => name,
    };
    let width = name.width() + score.width();
    let height = name.height().max(score.height());
    let mut stacked = GrayImage::from_pixel(width, height, Luma([255]));
    imageops::replace(&mut stacked, &name, 0, 0);
    imageops::replace(&mut stacked, &score, name.width() as i64, 0);
    Some(stacked)
}
