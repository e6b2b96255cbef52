// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Error kinds raised while grading a single answer sheet.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GradeError>;

/// Every failure terminates processing of the current image; no partial
/// answers are produced.
#[derive(Error, Debug)]
pub enum GradeError {
    /// The image could not be read or decoded, or carries no usable
    /// resolution metadata.
    #[error("failed to load image {path}: {message}")]
    Load {
        path: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Margin trimming consumed the whole image.
    #[error("margin trimming emptied the image (started at {width}x{height}, trim_std {trim_std})")]
    EmptyImage { width: u32, height: u32, trim_std: f64 },

    /// Trimmed image dimensions are outside the form's tolerance.
    #[error("image size {actual:?} outside tolerance {tolerance:?} of expected {expected:?}")]
    SizeTolerance {
        actual: [u32; 2],
        expected: [u32; 2],
        tolerance: [f64; 2],
    },

    /// None of the reference boxes matched within the search radius.
    #[error("no reference box matched among {boxes} (radius {radius}, min_ref {min_ref})")]
    ReferenceFit { boxes: usize, radius: u32, min_ref: f64 },

    /// A bubble or crop region does not lie inside the image.
    #[error("region {region:?} ({what}) exceeds image bounds {width}x{height}")]
    RegionOutOfBounds {
        what: String,
        region: [i32; 4],
        width: u32,
        height: u32,
    },

    /// The form configuration is malformed or geometrically inconsistent.
    #[error("invalid form configuration: {parameter}: {reason}")]
    InvalidConfig { parameter: String, reason: String },
}

impl GradeError {
    pub fn load<E>(path: impl Into<String>, message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        GradeError::Load {
            path: path.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn invalid_config(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        GradeError::InvalidConfig {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Short name of the pipeline stage that produced this error.
    pub fn stage(&self) -> &'static str {
        match self {
            GradeError::Load { .. } => "load",
            GradeError::EmptyImage { .. } => "trim",
            GradeError::SizeTolerance { .. } => "size check",
            GradeError::ReferenceFit { .. } => "reference fit",
            GradeError::RegionOutOfBounds { .. } => "bubble means",
            GradeError::InvalidConfig { .. } => "configuration",
        }
    }
}
