// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use image::GrayImage;
use log::{info, warn};

use crate::alignment::{align, Alignment};
use crate::bubbles::{choose_answers, get_bubble_means, BubbleMeans};
use crate::config::FormConfig;
use crate::diagnostics::{render_info_image, render_validation};
use crate::error::Result;
use crate::geometry::FormGeometry;
use crate::image_funcs::{check_size, load_image, trim_margins};

/// Everything known about one graded sheet.
#[derive(Debug)]
pub struct GradedSheet {
    /// Chosen column per question row, or -1 if no confident choice.
    pub answers: Vec<i32>,

    pub means: BubbleMeans,

    /// Present if the form has reference boxes.
    pub alignment: Option<Alignment>,

    /// Form geometry after alignment.
    pub geometry: FormGeometry,

    /// The normalized, trimmed image the answers were read from.
    pub image: GrayImage,
}

impl GradedSheet {
    pub fn validation_image(&self) -> GrayImage {
        render_validation(&self.image, &self.geometry, &self.means, self.alignment.as_ref())
    }

    pub fn info_image(&self) -> Option<GrayImage> {
        render_info_image(&self.image, &self.geometry)
    }
}

/// Grades an already loaded grayscale `image` that is at the form's
/// expected resolution: trims margins, checks the size, aligns on the
/// reference boxes (if any) and reads the answers.
pub fn grade_image(image: GrayImage, config: &FormConfig) -> Result<GradedSheet> {
    let mut geometry = FormGeometry::new(config.clone())?;
    let image = trim_margins(&image, config.trim_std)?;
    check_size(&image, config.expected_size, config.size_tolerance)?;
    let alignment = align(&image, &mut geometry)?;
    let means = get_bubble_means(&image, geometry.coords(), config.contrast)?;
    let answers = choose_answers(&means, config.signal);
    Ok(GradedSheet{answers, means, alignment, geometry, image})
}

/// Loads and grades the scan at `path`.
pub fn grade_file(path: &Path, config: &FormConfig) -> Result<GradedSheet> {
    let grade_start = Instant::now();
    let image = load_image(path, config.expected_dpi)?;
    let sheet = grade_image(image, config)?;
    info!("Graded {} ({} questions) in {:?}",
          path.display(), sheet.answers.len(), grade_start.elapsed());
    Ok(sheet)
}

/// Writes `<output_dir>/validation/<input name>` (same format as the input)
/// and, if the form has an info region, `<output_dir>/names/<input stem>.png`.
/// Failures are logged and otherwise ignored. Returns the paths written.
pub fn write_artifacts(sheet: &GradedSheet, input: &Path, output_dir: &Path) -> Vec<PathBuf> {
    let mut written = Vec::<PathBuf>::new();
    let file_name = match input.file_name() {
        Some(n) => n,
        None => {
            warn!("No file name in {:?}; skipping artifacts", input);
            return written;
        },
    };

    let validation_path = output_dir.join("validation").join(file_name);
    if save(&sheet.validation_image(), &validation_path) {
        written.push(validation_path);
    }

    if let Some(info) = sheet.info_image() {
        let mut names_path = output_dir.join("names").join(file_name);
        names_path.set_extension("png");
        if save(&info, &names_path) {
            written.push(names_path);
        }
    }
    written
}

fn save(image: &GrayImage, path: &Path) -> bool {
    if let Some(dir) = path.parent() {
        if let Err(e) = fs::create_dir_all(dir) {
            warn!("Could not create {:?}: {}", dir, e);
            return false;
        }
    }
    match image.save(path) {
        Ok(()) => true,
        Err(e) => {
            warn!("Could not write {:?}: {}", path, e);
            false
        },
    }
}

#[cfg(test)]
mod tests {
    use image::{GrayImage, Luma};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;
    use super::*;
    use crate::config::{sample_config, Region};
    use crate::error::GradeError;
    use crate::resolution::encode_png;

    // A 40x40 form with a dotted frame, a reference box displaced by
    // (1, 2) from its nominal (2, 6, 2, 6), and answers [1, 0]; embedded in
    // blank margins.
    fn scanned_sheet() -> GrayImage {
        let mut form = GrayImage::from_pixel(40, 40, Luma([255]));
        for i in 0..40 {
            for (x, y) in [(i, 0), (i, 39), (0, i), (39, i)] {
                let v = if (x + y) % 2 == 0 { 0 } else { 255 };
                form.put_pixel(x, y, Luma([v]));
            }
        }
        draw_filled_rect_mut(&mut form, Rect::at(4, 3).of_size(4, 4), Luma([20]));
        draw_filled_rect_mut(&mut form, Rect::at(22, 11).of_size(4, 4), Luma([40]));
        draw_filled_rect_mut(&mut form, Rect::at(12, 21).of_size(4, 4), Luma([10]));

        let mut sheet = GrayImage::from_pixel(52, 52, Luma([230]));
        image::imageops::replace(&mut sheet, &form, 5, 5);
        sheet
    }

    fn sheet_config() -> FormConfig {
        let mut config = sample_config();
        config.refzone = vec![Region::new(2, 6, 2, 6)];
        config.radius = 3;
        config.min_ref = 20.0;
        config.trim_std = 5.0;
        config.signal = 1.5;
        config.info = Some(Region::new(30, 36, 2, 20));
        config
    }

    #[test]
    fn test_grade_image() {
        let sheet = grade_image(scanned_sheet(), &sheet_config()).unwrap();
        assert_eq!(sheet.image.dimensions(), (40, 40));
        assert_eq!(sheet.alignment.as_ref().unwrap().offset, [1, 2]);
        assert_eq!(sheet.geometry.offset(), [1, 2]);
        assert_eq!(sheet.means.get(0, 1), 0.0);
        assert_eq!(sheet.answers, vec![1, 0]);
        assert_eq!(sheet.geometry.info(), Some(Region::new(31, 37, 4, 22)));
    }

    #[test]
    fn test_grade_image_ambiguous() {
        let mut image = scanned_sheet();
        // Second mark in row 0.
        draw_filled_rect_mut(&mut image, Rect::at(17, 16).of_size(4, 4), Luma([0]));
        let sheet = grade_image(image, &sheet_config()).unwrap();
        assert_eq!(sheet.answers, vec![-1, 0]);
    }

    #[test]
    fn test_grade_image_errors() {
        let mut config = sheet_config();
        config.expected_size = [50, 50];
        assert!(matches!(grade_image(scanned_sheet(), &config),
                         Err(GradeError::SizeTolerance { actual: [40, 40], .. })));

        let mut config = sheet_config();
        config.radius = 1;
        assert!(matches!(grade_image(scanned_sheet(), &config),
                         Err(GradeError::ReferenceFit { .. })));

        let blank = GrayImage::from_pixel(52, 52, Luma([230]));
        assert!(matches!(grade_image(blank, &sheet_config()),
                         Err(GradeError::EmptyImage { .. })));
    }

    #[test]
    fn test_grade_without_reference_boxes() {
        let mut config = sheet_config();
        config.refzone.clear();
        config.pos = [11.0, 12.0];
        let sheet = grade_image(scanned_sheet(), &config).unwrap();
        assert!(sheet.alignment.is_none());
        assert_eq!(sheet.answers, vec![1, 0]);
    }

    #[test]
    fn test_grade_file_and_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("sheet_07.png");
        fs::write(&input, encode_png(&scanned_sheet(), Some(100))).unwrap();
        let sheet = grade_file(&input, &sheet_config()).unwrap();
        assert_eq!(sheet.answers, vec![1, 0]);

        let out = dir.path().join("OMR");
        let written = write_artifacts(&sheet, &input, &out);
        assert_eq!(written, vec![out.join("validation").join("sheet_07.png"),
                                 out.join("names").join("sheet_07.png")]);
        let validation = image::open(&written[0]).unwrap().to_luma8();
        assert_eq!(validation.dimensions(), (40, 40));
        let names = image::open(&written[1]).unwrap().to_luma8();
        assert_eq!(names.dimensions(), (6, 18));
    }

    #[test]
    fn test_artifact_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"a file, not a directory").unwrap();
        let sheet = grade_image(scanned_sheet(), &sheet_config()).unwrap();
        let written = write_artifacts(&sheet, Path::new("scan.png"), &blocker);
        assert!(written.is_empty());
        assert_eq!(sheet.answers, vec![1, 0]);
    }
}
