// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::time::Instant;

use image::GrayImage;
use log::{debug, info};

use crate::error::{GradeError, Result};
use crate::geometry::CoordinateMatrix;
use crate::image_funcs::{binarize, SummedAreaTable};

/// Mean binarized value of each answer bubble; near 0 for a filled bubble,
/// near 255 for an empty one.
#[derive(Clone, Debug, PartialEq)]
pub struct BubbleMeans {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

impl BubbleMeans {
    /// # Panics
    /// If the rows are empty or not all the same length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> BubbleMeans {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        assert!(cols > 0, "bubble means need at least one column");
        assert!(rows.iter().all(|r| r.len() == cols), "ragged bubble means");
        BubbleMeans{rows: rows.len(), cols, values: rows.concat()}
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.row(row)[col]
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.values[row * self.cols..(row + 1) * self.cols]
    }
}

/// Binarizes `image` at `contrast` and averages it over every bubble of
/// `coords`. Every bubble must lie inside the image.
pub fn get_bubble_means(image: &GrayImage, coords: &CoordinateMatrix, contrast: f64)
                        -> Result<BubbleMeans> {
    let means_start = Instant::now();
    let table = SummedAreaTable::new(&binarize(image, contrast));
    let mut values = Vec::with_capacity(coords.rows() * coords.cols());
    for (i, j, region) in coords.iter() {
        match table.mean(&region) {
            Some(mean) => values.push(mean),
            None => return Err(GradeError::RegionOutOfBounds{
                what: format!("bubble ({}, {})", i, j),
                region: region.as_array(),
                width: image.width(),
                height: image.height(),
            }),
        }
    }
    debug!("Bubble means computed in {:?}", means_start.elapsed());
    Ok(BubbleMeans{rows: coords.rows(), cols: coords.cols(), values})
}

/// Ratio of the second darkest to the darkest mean in `row`. Two fully dark
/// bubbles give 1; a single fully dark bubble gives infinity.
pub fn signal_ratio(row: &[f64]) -> f64 {
    if row.len() < 2 {
        return f64::INFINITY;
    }
    let mut sorted = row.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let (darkest, second) = (sorted[0], sorted[1]);
    if darkest <= 0.0 {
        return if second <= 0.0 { 1.0 } else { f64::INFINITY };
    }
    second / darkest
}

/// Picks the darkest bubble of each row. When `signal` is positive, rows
/// whose [signal_ratio()] is at or below it are ambiguous and get -1.
pub fn choose_answers(means: &BubbleMeans, signal: f64) -> Vec<i32> {
    let mut choices = Vec::with_capacity(means.rows());
    let mut ambiguous = 0;
    for i in 0..means.rows() {
        let row = means.row(i);
        let mut darkest = 0;
        for (j, &mean) in row.iter().enumerate() {
            if mean < row[darkest] {
                darkest = j;
            }
        }
        if signal > 0.0 {
            let ratio = signal_ratio(row);
            if ratio <= signal {
                debug!("Row {} ambiguous: signal ratio {:.3} <= {}", i, ratio, signal);
                ambiguous += 1;
                choices.push(-1);
                continue;
            }
        }
        choices.push(darkest as i32);
    }
    info!("Chose answers for {} rows, {} ambiguous", means.rows(), ambiguous);
    choices
}

#[cfg(test)]
mod tests {
    use image::{GrayImage, Luma};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;
    use super::*;
    use crate::config::{sample_config, Region};
    use crate::geometry::FormGeometry;

    #[test]
    fn test_darkest_bubble_chosen() {
        // 2x2 grid: bubble (0, 0) filled, everything else light.
        let geometry = FormGeometry::new(sample_config()).unwrap();
        let mut image = GrayImage::from_pixel(40, 40, Luma([255]));
        draw_filled_rect_mut(&mut image, Rect::at(10, 10).of_size(4, 4), Luma([0]));
        let means = get_bubble_means(&image, geometry.coords(), 128.0).unwrap();
        assert_eq!(means.get(0, 0), 0.0);
        assert_eq!(means.get(0, 1), 255.0);
        assert_eq!(means.get(1, 0), 255.0);
        assert_eq!(choose_answers(&means, 0.0)[0], 0);
    }

    #[test]
    fn test_partially_filled_bubble() {
        let geometry = FormGeometry::new(sample_config()).unwrap();
        let mut image = GrayImage::from_pixel(40, 40, Luma([200]));
        // Left half of bubble (1, 1), just under the contrast split.
        draw_filled_rect_mut(&mut image, Rect::at(20, 20).of_size(2, 4), Luma([127]));
        let means = get_bubble_means(&image, geometry.coords(), 128.0).unwrap();
        assert_eq!(means.get(1, 1), 127.5);
        assert_eq!(choose_answers(&means, 0.0), vec![0, 1]);
    }

    #[test]
    fn test_bubble_outside_image() {
        let geometry = FormGeometry::new(sample_config()).unwrap();
        let image = GrayImage::from_pixel(22, 40, Luma([255]));
        assert!(matches!(get_bubble_means(&image, geometry.coords(), 128.0),
                         Err(GradeError::RegionOutOfBounds { .. })));
    }

    #[test]
    fn test_first_minimum_wins() {
        let means = BubbleMeans::from_rows(vec![vec![255.0, 3.0, 3.0, 255.0]]);
        assert_eq!(choose_answers(&means, 0.0), vec![1]);
    }

    #[test]
    fn test_ambiguous_rows() {
        // Darkest two means 10 and 12: ratio 1.2.
        let means = BubbleMeans::from_rows(vec![
            vec![255.0, 12.0, 10.0, 250.0],
            vec![0.0, 255.0, 255.0, 255.0]]);
        assert_eq!(choose_answers(&means, 1.25), vec![-1, 0]);
        assert_eq!(choose_answers(&means, 1.2), vec![-1, 0]);
        assert_eq!(choose_answers(&means, 1.1), vec![2, 0]);
        // Disabled.
        assert_eq!(choose_answers(&means, 0.0), vec![2, 0]);
    }

    #[test]
    fn test_double_marked_row() {
        let means = BubbleMeans::from_rows(vec![vec![0.0, 255.0, 0.0]]);
        assert_eq!(signal_ratio(means.row(0)), 1.0);
        assert_eq!(choose_answers(&means, 1.5), vec![-1]);
        assert_eq!(choose_answers(&means, 0.0), vec![0]);
    }

    #[test]
    fn test_signal_ratio() {
        assert_eq!(signal_ratio(&[12.0, 255.0, 10.0]), 1.2);
        assert_eq!(signal_ratio(&[0.0, 40.0]), f64::INFINITY);
        assert_eq!(signal_ratio(&[7.0]), f64::INFINITY);
        let means = BubbleMeans::from_rows(vec![vec![9.0]]);
        assert_eq!(choose_answers(&means, 2.0), vec![0]);
    }

    #[test]
    fn test_means_shape() {
        let mut config = sample_config();
        config.size = [3, 5];
        config.space = [5.0, 5.0];
        let geometry = FormGeometry::new(config).unwrap();
        let image = GrayImage::from_pixel(40, 40, Luma([255]));
        let means = get_bubble_means(&image, geometry.coords(), 128.0).unwrap();
        assert_eq!((means.rows(), means.cols()), (3, 5));
        assert_eq!(geometry.coords().cell(2, 4), Region::new(20, 24, 30, 34));
    }
}
