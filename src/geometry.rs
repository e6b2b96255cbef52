// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use log::debug;

use crate::config::{FormConfig, Region};
use crate::error::Result;

/// Pixel rectangles of every answer bubble, laid out as a
/// (rows, cols, 4) array of `[row_min, row_max, col_min, col_max]`.
#[derive(Clone, Debug, PartialEq)]
pub struct CoordinateMatrix {
    rows: usize,
    cols: usize,
    cells: Vec<Region>,
}

impl CoordinateMatrix {
    /// Computes bubble rectangles from grid parameters. Fractional positions
    /// are truncated to whole pixels.
    pub fn compute(size: [usize; 2], pos: [f64; 2], bub: [f64; 2], space: [f64; 2])
                   -> CoordinateMatrix {
        let (rows, cols) = (size[0], size[1]);
        let mut cells = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            let top = pos[0] + i as f64 * space[0];
            for j in 0..cols {
                let left = pos[1] + j as f64 * space[1];
                cells.push(Region::new(top as i32, (top + bub[0]) as i32,
                                       left as i32, (left + bub[1]) as i32));
            }
        }
        CoordinateMatrix{rows, cols, cells}
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.rows, self.cols, 4)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// # Panics
    /// If `(row, col)` is outside the grid.
    pub fn cell(&self, row: usize, col: usize) -> Region {
        assert!(row < self.rows && col < self.cols,
                "cell ({}, {}) outside {}x{} grid", row, col, self.rows, self.cols);
        self.cells[row * self.cols + col]
    }

    /// Cells in row-major order, with their grid indices.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, Region)> + '_ {
        let cols = self.cols;
        self.cells.iter().enumerate().map(move |(n, r)| (n / cols, n % cols, *r))
    }
}

/// A validated form whose positional parameters can be shifted once the
/// scan's misalignment is known. The coordinate matrix always reflects the
/// current position.
#[derive(Clone, Debug)]
pub struct FormGeometry {
    config: FormConfig,
    coords: CoordinateMatrix,
}

impl FormGeometry {
    pub fn new(config: FormConfig) -> Result<FormGeometry> {
        config.validate()?;
        let coords = coords_for(&config);
        Ok(FormGeometry{config, coords})
    }

    pub fn config(&self) -> &FormConfig {
        &self.config
    }

    pub fn coords(&self) -> &CoordinateMatrix {
        &self.coords
    }

    pub fn offset(&self) -> [i32; 2] {
        self.config.offset
    }

    pub fn pos(&self) -> [f64; 2] {
        self.config.pos
    }

    pub fn info(&self) -> Option<Region> {
        self.config.info
    }

    pub fn score(&self) -> Option<Region> {
        self.config.score
    }

    /// Shifts the grid origin and the info/score rectangles by `(dr, dc)`
    /// and recomputes the coordinate matrix. Reference boxes describe the
    /// printed form and stay put.
    pub fn apply_offset(&mut self, dr: i32, dc: i32) {
        let config = &mut self.config;
        config.offset = [config.offset[0] + dr, config.offset[1] + dc];
        config.pos = [config.pos[0] + dr as f64, config.pos[1] + dc as f64];
        config.info = config.info.map(|r| r.translated(dr, dc));
        config.score = config.score.map(|r| r.translated(dr, dc));
        self.coords = coords_for(&self.config);
        debug!("Applied offset ({}, {}); cumulative offset {:?}",
               dr, dc, self.config.offset);
    }
}

fn coords_for(config: &FormConfig) -> CoordinateMatrix {
    CoordinateMatrix::compute(config.size, config.pos, config.bub, config.space)
}
