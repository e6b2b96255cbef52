// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! BubbleSheet reads the answers marked on scanned multiple-choice answer
//! sheets. Given a scan and a description of the printed form, it returns
//! the chosen column of every question row.
//!
//! Features:
//!
//! * Resamples scans to the form's resolution using the resolution recorded
//!   in the image file.
//! * Trims blank scanner margins.
//! * Corrects for the page being shifted on the scanner glass by locating
//!   printed black reference boxes.
//! * Flags rows whose two darkest bubbles are too similar (double marks,
//!   erasures, faint marks) rather than guessing.
//! * Produces review images: a validation overlay and a name/score crop.
//!
//! # Form description
//!
//! Form geometry is supplied, never inferred. See [config::FormConfig] for
//! the parameters; forms are usually kept as JSON files.
//!
//! # Algorithm
//!
//! 1. Load the scan and resample it to the form's expected resolution
//!    ([image_funcs::load_image()]).
//! 2. Repeatedly strip low-variance rows and columns from the image edges
//!    ([image_funcs::trim_margins()]).
//! 3. Reject images whose trimmed size is off by more than the form's
//!    tolerance ([image_funcs::check_size()]).
//! 4. If the form has reference boxes, search a small circular neighborhood
//!    around each for the darkest placement, average the per-box offsets and
//!    shift the form geometry by the result ([alignment::align()]).
//! 5. Binarize and average every answer bubble, pick the darkest bubble per
//!    row, and blank out ambiguous rows ([bubbles::get_bubble_means()],
//!    [bubbles::choose_answers()]).
//!
//! [pipeline::grade_file()] runs all of this for one file. Each image is
//! processed independently with no shared state, so callers grading many
//! sheets can do so in parallel.
//!
//! # Caveats
//!
//! * Only translation is corrected. Rotated or scaled scans must be fixed
//!   before grading.
//! * A bubble's darkness is judged after binarizing at the form's `contrast`
//!   value, so light pencil marks above that value are invisible.

pub mod alignment;
pub mod bubbles;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod geometry;
pub mod histogram_funcs;
pub mod image_funcs;
pub mod pipeline;
pub mod resolution;

pub use error::{GradeError, Result};
