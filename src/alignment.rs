// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Locates the printed black reference boxes in a scan and derives the
//! translation between the form's nominal geometry and the scan.
//!
//! Each box is searched for independently by brute force: every integer
//! offset within a circular radius is tried and the one whose translated box
//! is darkest wins, provided it is dark enough to count as a match. The
//! per-box offsets are then averaged into a single offset for the form.
//!
//! Reference boxes are small and the radius is a handful of pixels, so the
//! search is cheap; box means come from a summed-area table in O(1) each.

use std::time::Instant;

use image::GrayImage;
use log::{debug, info, warn};

use crate::config::Region;
use crate::error::{GradeError, Result};
use crate::geometry::FormGeometry;
use crate::image_funcs::{binarize, SummedAreaTable};

/// Outcome of fitting the reference boxes of one scan.
#[derive(Clone, Debug, PartialEq)]
pub struct Alignment {
    /// Per reference box, the (row, col) offset of its best match, or None
    /// if no candidate was dark enough.
    pub fits: Vec<Option<[i32; 2]>>,

    /// Mean of the matched offsets, rounded to whole pixels.
    pub offset: [i32; 2],
}

/// All integer offsets within `radius` of the origin, ordered by ascending
/// distance, then row, then column. Ties in the search resolve to the first
/// offset in this order.
pub fn search_offsets(radius: u32) -> Vec<[i32; 2]> {
    let r = radius as i64;
    let r_sq = r * r;
    let mut offsets = Vec::<[i32; 2]>::new();
    for di in -r..=r {
        for dj in -r..=r {
            if di * di + dj * dj <= r_sq {
                offsets.push([di as i32, dj as i32]);
            }
        }
    }
    offsets.sort_by_key(|&[di, dj]| {
        let (di, dj) = (di as i64, dj as i64);
        (di * di + dj * dj, di, dj)
    });
    offsets
}

/// Finds the darkest translation of `region` among `offsets`. Offsets that
/// move the box outside the image are skipped. Returns None if no valid
/// offset has a mean at or below `min_ref`.
pub fn center_on_box(table: &SummedAreaTable, region: &Region, offsets: &[[i32; 2]],
                     min_ref: f64) -> Option<[i32; 2]> {
    let mut best: Option<([i32; 2], f64)> = None;
    let mut skipped = 0;
    for &[di, dj] in offsets {
        let mean = match table.mean(&region.translated(di, dj)) {
            Some(m) => m,
            None => {
                skipped += 1;
                continue;
            }
        };
        match best {
            Some((_, best_mean)) if mean >= best_mean => (),
            _ => best = Some(([di, dj], mean)),
        }
    }
    if skipped > 0 {
        debug!("Skipped {} offsets leaving the image for box {:?}",
               skipped, region.as_array());
    }
    match best {
        Some((offset, mean)) if mean <= min_ref => {
            debug!("Box {:?} matched at {:?} with mean {:.1}",
                   region.as_array(), offset, mean);
            Some(offset)
        },
        Some((offset, mean)) => {
            debug!("Box {:?} best mean {:.1} at {:?} exceeds {}",
                   region.as_array(), mean, offset, min_ref);
            None
        },
        None => None,
    }
}

/// Averages the matched offsets, ignoring unmatched boxes. None if no box
/// matched.
pub fn aggregate_fits(fits: &[Option<[i32; 2]>]) -> Option<[i32; 2]> {
    let matched: Vec<[i32; 2]> = fits.iter().flatten().copied().collect();
    if matched.is_empty() {
        return None;
    }
    let n = matched.len() as f64;
    let row = matched.iter().map(|f| f[0] as f64).sum::<f64>() / n;
    let col = matched.iter().map(|f| f[1] as f64).sum::<f64>() / n;
    Some([row.round() as i32, col.round() as i32])
}

/// Fits every reference box in `refzone` against the binarized `image`.
pub fn fit_reference(image: &GrayImage, refzone: &[Region], contrast: f64,
                     radius: u32, min_ref: f64) -> Result<Alignment> {
    let fit_start = Instant::now();
    let table = SummedAreaTable::new(&binarize(image, contrast));
    let offsets = search_offsets(radius);
    let fits: Vec<Option<[i32; 2]>> = refzone.iter()
        .map(|region| center_on_box(&table, region, &offsets, min_ref))
        .collect();
    let offset = match aggregate_fits(&fits) {
        Some(o) => o,
        None => return Err(GradeError::ReferenceFit{
            boxes: refzone.len(), radius, min_ref}),
    };
    let matched = fits.iter().filter(|f| f.is_some()).count();
    if matched < fits.len() {
        warn!("Only {} of {} reference boxes matched", matched, fits.len());
    }
    info!("Reference fit offset {:?} from {} boxes, {} candidates each, in {:?}",
          offset, matched, offsets.len(), fit_start.elapsed());
    Ok(Alignment{fits, offset})
}

/// Fits the form's reference boxes, if it has any, and shifts `geometry` by
/// the resulting offset.
pub fn align(image: &GrayImage, geometry: &mut FormGeometry) -> Result<Option<Alignment>> {
    let config = geometry.config();
    if config.refzone.is_empty() {
        return Ok(None);
    }
    let alignment = fit_reference(image, &config.refzone, config.contrast,
                                  config.radius, config.min_ref)?;
    geometry.apply_offset(alignment.offset[0], alignment.offset[1]);
    Ok(Some(alignment))
}

#[cfg(test)]
mod tests {
    use image::{GrayImage, Luma};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;
    use super::*;
    use crate::config::sample_config;

    fn white(width: u32, height: u32) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([255]))
    }

    // Black rectangle covering rows r0..r1, cols c0..c1.
    fn paint(image: &mut GrayImage, r0: i32, r1: i32, c0: i32, c1: i32) {
        draw_filled_rect_mut(image, Rect::at(c0, r0).of_size((c1 - c0) as u32, (r1 - r0) as u32),
                             Luma([0]));
    }

    #[test]
    fn test_search_offsets_order() {
        assert_eq!(search_offsets(0), vec![[0, 0]]);
        assert_eq!(search_offsets(1),
                   vec![[0, 0], [-1, 0], [0, -1], [0, 1], [1, 0]]);
        let offsets = search_offsets(2);
        assert_eq!(offsets.len(), 13);
        assert_eq!(offsets[5], [-1, -1]);
        assert_eq!(offsets[12], [2, 0]);
    }

    #[test]
    fn test_center_on_box() {
        let mut image = white(20, 20);
        paint(&mut image, 6, 10, 8, 12);
        let table = SummedAreaTable::new(&image);
        let region = Region::new(4, 8, 5, 9);
        assert_eq!(center_on_box(&table, &region, &search_offsets(4), 10.0),
                   Some([2, 3]));
        // Outside the search radius.
        assert_eq!(center_on_box(&table, &region, &search_offsets(3), 10.0), None);
    }

    #[test]
    fn test_center_on_box_partial_match() {
        let mut image = white(20, 20);
        paint(&mut image, 6, 10, 8, 12);
        let table = SummedAreaTable::new(&image);
        // Best achievable overlap is half the box: mean 127.5.
        let region = Region::new(6, 10, 4, 8);
        let offsets = search_offsets(2);
        assert_eq!(center_on_box(&table, &region, &offsets, 127.5), Some([0, 2]));
        assert_eq!(center_on_box(&table, &region, &offsets, 127.0), None);
    }

    #[test]
    fn test_center_on_box_tie_break() {
        let mut image = white(12, 12);
        paint(&mut image, 5, 7, 6, 8);
        paint(&mut image, 6, 8, 5, 7);
        let table = SummedAreaTable::new(&image);
        // Both (0, 1) and (1, 0) are fully dark; (0, 1) comes first.
        let region = Region::new(5, 7, 5, 7);
        assert_eq!(center_on_box(&table, &region, &search_offsets(1), 0.0),
                   Some([0, 1]));
    }

    #[test]
    fn test_center_on_box_skips_outside() {
        let mut image = white(10, 10);
        paint(&mut image, 0, 3, 0, 3);
        let table = SummedAreaTable::new(&image);
        let region = Region::new(0, 3, 0, 3);
        assert_eq!(center_on_box(&table, &region, &search_offsets(2), 0.0),
                   Some([0, 0]));

        let too_big = Region::new(0, 11, 0, 3);
        assert_eq!(center_on_box(&table, &too_big, &search_offsets(2), 255.0), None);
    }

    #[test]
    fn test_aggregate_fits() {
        assert_eq!(aggregate_fits(&[Some([1, 2]), None, Some([2, 3])]), Some([2, 3]));
        assert_eq!(aggregate_fits(&[Some([-1, 0]), Some([-2, 4])]), Some([-2, 2]));
        assert_eq!(aggregate_fits(&[Some([1, 1]), Some([1, 2]), Some([2, 2])]),
                   Some([1, 2]));
        assert_eq!(aggregate_fits(&[None, None]), None);
        assert_eq!(aggregate_fits(&[]), None);
    }

    #[test]
    fn test_fit_reference() {
        let mut image = white(40, 40);
        paint(&mut image, 3, 7, 4, 8);
        paint(&mut image, 31, 35, 32, 36);
        // Gray, not quite black; becomes black after binarization.
        draw_filled_rect_mut(&mut image, Rect::at(4, 32).of_size(4, 4), Luma([90]));
        let refzone = [Region::new(2, 6, 2, 6), Region::new(30, 34, 30, 34),
                       Region::new(31, 35, 2, 6), Region::new(2, 6, 30, 34)];
        let alignment = fit_reference(&image, &refzone, 128.0, 3, 20.0).unwrap();
        assert_eq!(alignment.fits,
                   vec![Some([1, 2]), Some([1, 2]), Some([1, 2]), None]);
        assert_eq!(alignment.offset, [1, 2]);
    }

    #[test]
    fn test_fit_reference_no_match() {
        let image = white(40, 40);
        let refzone = [Region::new(2, 6, 2, 6), Region::new(30, 34, 30, 34)];
        assert!(matches!(fit_reference(&image, &refzone, 128.0, 3, 20.0),
                         Err(GradeError::ReferenceFit { boxes: 2, radius: 3, .. })));
    }

    #[test]
    fn test_align_updates_geometry() {
        let mut image = white(40, 40);
        paint(&mut image, 3, 7, 4, 8);
        let mut config = sample_config();
        config.refzone = vec![Region::new(2, 6, 2, 6)];
        config.radius = 3;
        config.min_ref = 20.0;
        let mut geometry = FormGeometry::new(config).unwrap();
        let alignment = align(&image, &mut geometry).unwrap().unwrap();
        assert_eq!(alignment.offset, [1, 2]);
        assert_eq!(geometry.offset(), [1, 2]);
        assert_eq!(geometry.coords().cell(0, 0), Region::new(11, 15, 12, 16));
    }

    #[test]
    fn test_align_without_reference_boxes() {
        let mut geometry = FormGeometry::new(sample_config()).unwrap();
        assert_eq!(align(&white(40, 40), &mut geometry).unwrap(), None);
        assert_eq!(geometry.offset(), [0, 0]);
    }
}
