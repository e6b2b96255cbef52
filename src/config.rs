// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Form configuration, deserialized from JSON.
//!
//! Pairs are given as `[row, col]` (equivalently `[height, width]`) and
//! rectangles as `[row_min, row_max, col_min, col_max]` with exclusive
//! maxima, all in pixels at the form's expected resolution.
//!
//! ```text
//!          |-bub-|
//!          |---space---|
//!
//!         j0    j1
//!      i0  [ A ]       [ B ]
//!      i1  [ A ]       [ B ]
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GradeError, Result};

/// Axis-aligned pixel rectangle `[row_min, row_max, col_min, col_max]`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct Region {
    pub row_min: i32,
    pub row_max: i32,
    pub col_min: i32,
    pub col_max: i32,
}

impl Region {
    pub fn new(row_min: i32, row_max: i32, col_min: i32, col_max: i32) -> Region {
        Region{row_min, row_max, col_min, col_max}
    }

    pub fn height(&self) -> i32 {
        self.row_max - self.row_min
    }

    pub fn width(&self) -> i32 {
        self.col_max - self.col_min
    }

    pub fn is_empty(&self) -> bool {
        self.height() <= 0 || self.width() <= 0
    }

    /// Moves both row bounds by `dr` and both column bounds by `dc`.
    pub fn translated(&self, dr: i32, dc: i32) -> Region {
        Region{row_min: self.row_min + dr, row_max: self.row_max + dr,
               col_min: self.col_min + dc, col_max: self.col_max + dc}
    }

    /// True if the region lies entirely within a `width` x `height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.row_min >= 0 && self.col_min >= 0 &&
            self.row_max <= height as i32 && self.col_max <= width as i32
    }

    pub fn as_array(&self) -> [i32; 4] {
        [self.row_min, self.row_max, self.col_min, self.col_max]
    }
}

impl From<[i32; 4]> for Region {
    fn from(r: [i32; 4]) -> Region {
        Region::new(r[0], r[1], r[2], r[3])
    }
}

impl From<Region> for [i32; 4] {
    fn from(r: Region) -> [i32; 4] {
        r.as_array()
    }
}

/// Geometry and tuning parameters for one printed form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormConfig {
    /// Answer grid size: questions x choices.
    pub size: [usize; 2],

    /// Upper left corner of the answer grid.
    pub pos: [f64; 2],

    /// Box surrounding each answer bubble.
    pub bub: [f64; 2],

    /// Unit cell edge lengths.
    pub space: [f64; 2],

    /// Accumulated alignment offset applied to `pos`.
    #[serde(default)]
    pub offset: [i32; 2],

    /// Name info rectangle.
    pub info: Option<Region>,

    /// Machine printed score rectangle.
    pub score: Option<Region>,

    /// Solid black reference boxes used for alignment.
    #[serde(default)]
    pub refzone: Vec<Region>,

    /// Centre of the reference fit summary panel on the validation image.
    pub ref_panel: Option<[i32; 2]>,

    /// Rows of the rotated name crop kept when the score crop is stacked
    /// beside it.
    pub info_band: Option<[u32; 2]>,

    /// Vertical and horizontal resolution the geometry is expressed in.
    pub expected_dpi: [f64; 2],

    /// Expected image rows x cols after resampling and trimming.
    pub expected_size: [u32; 2],

    /// Allowed fractional deviation from `expected_size`, per axis.
    pub size_tolerance: [f64; 2],

    /// Black/white split value, 0..=255.
    pub contrast: f64,

    /// Image edges with a standard deviation below this are trimmed.
    #[serde(default)]
    pub trim_std: f64,

    /// Reference box search radius.
    #[serde(default)]
    pub radius: u32,

    /// Maximum mean value (0..=255) accepted as a reference box match.
    #[serde(default)]
    pub min_ref: f64,

    /// Second-darkest to darkest ratio at or below which a row is flagged
    /// ambiguous. Zero disables the check.
    #[serde(default)]
    pub signal: f64,
}

impl FormConfig {
    pub fn from_json_str(json: &str) -> Result<FormConfig> {
        let config: FormConfig = serde_json::from_str(json)
            .map_err(|e| GradeError::invalid_config("json", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<FormConfig> {
        let json = fs::read_to_string(path).map_err(|e| GradeError::invalid_config(
            path.display().to_string(), e.to_string()))?;
        FormConfig::from_json_str(&json)
    }

    /// Rejects geometrically inconsistent or out-of-range parameters.
    pub fn validate(&self) -> Result<()> {
        if self.size[0] == 0 || self.size[1] == 0 {
            return Err(GradeError::invalid_config(
                "size", format!("{:?} must be positive", self.size)));
        }
        check_positive_pair("bub", &self.bub)?;
        if self.bub.iter().any(|v| *v < 1.0) {
            return Err(GradeError::invalid_config(
                "bub", format!("{:?} must be at least one pixel", self.bub)));
        }
        check_positive_pair("space", &self.space)?;
        check_positive_pair("expected_dpi", &self.expected_dpi)?;
        if !self.pos.iter().all(|v| v.is_finite()) {
            return Err(GradeError::invalid_config(
                "pos", format!("{:?} must be finite", self.pos)));
        }
        if self.expected_size[0] == 0 || self.expected_size[1] == 0 {
            return Err(GradeError::invalid_config(
                "expected_size", format!("{:?} must be positive", self.expected_size)));
        }
        if !self.size_tolerance.iter().all(|t| t.is_finite() && *t >= 0.0) {
            return Err(GradeError::invalid_config(
                "size_tolerance", format!("{:?} must be non-negative", self.size_tolerance)));
        }
        let max_radius = self.expected_size[0].min(self.expected_size[1]);
        if self.radius > max_radius {
            return Err(GradeError::invalid_config(
                "radius", format!("{} exceeds the smaller expected dimension {}",
                                  self.radius, max_radius)));
        }
        check_intensity("contrast", self.contrast)?;
        check_intensity("min_ref", self.min_ref)?;
        if !(self.trim_std.is_finite() && self.trim_std >= 0.0) {
            return Err(GradeError::invalid_config(
                "trim_std", format!("{} must be non-negative", self.trim_std)));
        }
        if !(self.signal.is_finite() && self.signal >= 0.0) {
            return Err(GradeError::invalid_config(
                "signal", format!("{} must be non-negative", self.signal)));
        }
        for (name, region) in [("info", &self.info), ("score", &self.score)] {
            if let Some(r) = region {
                check_region(name, r)?;
            }
        }
        for r in &self.refzone {
            check_region("refzone", r)?;
        }
        if let Some([start, end]) = self.info_band {
            if start >= end {
                return Err(GradeError::invalid_config(
                    "info_band", format!("[{}, {}] is empty", start, end)));
            }
        }
        Ok(())
    }
}

fn check_positive_pair(name: &str, pair: &[f64; 2]) -> Result<()> {
    if pair.iter().all(|v| v.is_finite() && *v > 0.0) {
        Ok(())
    } else {
        Err(GradeError::invalid_config(name, format!("{:?} must be positive", pair)))
    }
}

fn check_intensity(name: &str, value: f64) -> Result<()> {
    if (0.0..=255.0).contains(&value) {
        Ok(())
    } else {
        Err(GradeError::invalid_config(name, format!("{} not within 0..=255", value)))
    }
}

fn check_region(name: &str, region: &Region) -> Result<()> {
    if region.is_empty() {
        Err(GradeError::invalid_config(name, format!("{:?} is empty", region.as_array())))
    } else {
        Ok(())
    }
}

/// A small 2x2 form used throughout the unit tests.
#[cfg(test)]
pub(crate) fn sample_config() -> FormConfig {
    FormConfig{
        size: [2, 2],
        pos: [10.0, 10.0],
        bub: [4.0, 4.0],
        space: [10.0, 10.0],
        offset: [0, 0],
        info: None,
        score: None,
        refzone: Vec::new(),
        ref_panel: None,
        info_band: None,
        expected_dpi: [100.0, 100.0],
        expected_size: [40, 40],
        size_tolerance: [0.05, 0.05],
        contrast: 128.0,
        trim_std: 0.0,
        radius: 0,
        min_ref: 0.0,
        signal: 0.0,
    }
}
