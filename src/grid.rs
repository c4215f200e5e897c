//! Coordinate grid overlay.
//!
//! The copy of the sheet sent to the model carries a faint ruler: lines every
//! `spacing` pixels, labeled with their pixel value along the top and left
//! edges. The model reads coordinates off this ruler, so the labels have to
//! match the pixel positions of the lines exactly.

use std::path::Path;

use image::{RgbImage, Rgba};

use crate::config::GridConfig;
use crate::error::GradeError;
use crate::render::draw::{blend_pixel, COLOR_GRID_LABEL};
use crate::render::TextRenderer;

/// Which edge a label sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    /// Vertical line, labeled near the top edge
    X,
    /// Horizontal line, labeled near the left edge
    Y,
}

/// A label placed next to one grid line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GridLabel {
    pub axis: Axis,
    /// Pixel coordinate of the line
    pub value: u32,
    pub text: String,
    /// Top-left corner of the label text
    pub position: (i32, i32),
}

/// Lays out one label per grid line.
pub fn grid_labels(width: u32, height: u32, config: &GridConfig) -> Vec<GridLabel> {
    if config.spacing == 0 {
        return Vec::new();
    }
    let spacing = config.spacing as usize;
    let inset = config.label_inset as i32;

    let vertical = (0..width).step_by(spacing).map(|x| GridLabel {
        axis: Axis::X,
        value: x,
        text: x.to_string(),
        position: (x as i32 + 2, inset),
    });
    let horizontal = (0..height).step_by(spacing).map(|y| GridLabel {
        axis: Axis::Y,
        value: y,
        text: y.to_string(),
        position: (inset, y as i32 + 2),
    });

    vertical.chain(horizontal).collect()
}

/// Returns a copy of `img` with the grid and its labels drawn on it.
pub fn overlay_grid(
    img: &RgbImage,
    config: &GridConfig,
    text: TextRenderer,
) -> Result<RgbImage, GradeError> {
    if config.spacing == 0 {
        return Err(GradeError::render("grid spacing must be positive"));
    }

    let (width, height) = img.dimensions();
    let line_color = Rgba([0, 0, 0, config.opacity]);

    // Label coverage, drawn opaque so it can be composited in the same pass
    // as the lines.
    let mut labels = RgbImage::new(width, height);
    for label in grid_labels(width, height, config) {
        text.draw(
            &mut labels,
            &label.text,
            label.position,
            config.label_font_size,
            Rgba([255, 255, 255, 255]),
        )?;
    }

    // Each pixel is blended once; labels cover lines, crossings are no
    // darker than lines.
    let mut out = img.clone();
    for y in 0..height {
        let on_row = y % config.spacing == 0;
        for x in 0..width {
            let coverage = labels.get_pixel(x, y)[0] as u32;
            let color = if coverage > 0 {
                let [r, g, b, a] = COLOR_GRID_LABEL.0;
                Rgba([r, g, b, (a as u32 * coverage / 255) as u8])
            } else if on_row || x % config.spacing == 0 {
                line_color
            } else {
                continue;
            };
            blend_pixel(&mut out, x as i64, y as i64, color);
        }
    }

    Ok(out)
}

/// Reads `input`, overlays the grid and writes the result to `output`.
///
/// Nothing is written when the input cannot be opened.
pub fn overlay_grid_file(
    input: &Path,
    output: &Path,
    config: &GridConfig,
    text: TextRenderer,
) -> Result<(), GradeError> {
    let img = image::open(input)
        .map_err(|e| GradeError::source_unavailable(input, e))?
        .to_rgb8();

    let gridded = overlay_grid(&img, config, text)?;
    gridded.save(output).map_err(GradeError::render)?;

    crate::log(&format!("Grid overlay image saved to {}", output.display()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::tempdir;

    fn is_white(p: &Rgb<u8>) -> bool {
        p.0 == [255, 255, 255]
    }

    fn white(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([255, 255, 255]))
    }

    #[test]
    fn test_label_at_known_line_reads_back_its_coordinate() {
        let labels = grid_labels(600, 400, &GridConfig::default());
        let label = labels
            .iter()
            .find(|l| l.axis == Axis::X && l.value == 250)
            .unwrap();
        assert_eq!(label.text, "250");
        assert_eq!(label.position, (252, 10));

        let row = labels
            .iter()
            .find(|l| l.axis == Axis::Y && l.value == 300)
            .unwrap();
        assert_eq!(row.text, "300");
        assert_eq!(row.position, (10, 302));
    }

    #[test]
    fn test_label_count_covers_full_extent() {
        let labels = grid_labels(301, 100, &GridConfig::default());
        let xs: Vec<u32> = labels
            .iter()
            .filter(|l| l.axis == Axis::X)
            .map(|l| l.value)
            .collect();
        assert_eq!(xs, vec![0, 50, 100, 150, 200, 250, 300]);
        assert_eq!(labels.iter().filter(|l| l.axis == Axis::Y).count(), 2);
    }

    #[test]
    fn test_lines_blend_with_opacity() {
        let img = white(300, 300);
        let out = overlay_grid(&img, &GridConfig::default(), TextRenderer::Fixed).unwrap();

        // On a vertical line, away from labels
        assert_eq!(*out.get_pixel(250, 160), Rgb([205, 205, 205]));
        // Crossing is blended once, not twice
        assert_eq!(*out.get_pixel(250, 250), Rgb([205, 205, 205]));
        // Between lines
        assert!(is_white(out.get_pixel(251, 151)));
        // Source untouched
        assert!(is_white(img.get_pixel(250, 160)));
    }

    #[test]
    fn test_labels_drawn_near_edges() {
        let img = white(300, 300);
        let out = overlay_grid(&img, &GridConfig::default(), TextRenderer::Fixed).unwrap();

        // Label "250" starts at (252, 10); glyph '2' has its top row set at columns 1..3
        let label_region_tinted = (252..286)
            .flat_map(|x| (10..24).map(move |y| (x, y)))
            .any(|(x, y)| {
                let p = out.get_pixel(x, y);
                p[0] > p[2] + 50
            });
        assert!(label_region_tinted, "expected reddish label pixels");
    }

    #[test]
    fn test_label_on_line_blended_once() {
        let config = GridConfig {
            spacing: 20,
            ..GridConfig::default()
        };
        let out = overlay_grid(&white(100, 100), &config, TextRenderer::Fixed).unwrap();

        // "20" starts at (22, 10); the top row of its '0' covers x 40..42,
        // which lies on the vertical line at x = 40. Label alpha 180 over
        // white, with no line underneath.
        assert_eq!(*out.get_pixel(40, 10), Rgb([255, 75, 75]));
        // Same glyph row off the line
        assert_eq!(*out.get_pixel(41, 10), Rgb([255, 75, 75]));
        // Line just below the label
        assert_eq!(*out.get_pixel(40, 30), Rgb([205, 205, 205]));
    }

    #[test]
    fn test_zero_spacing_rejected() {
        let config = GridConfig {
            spacing: 0,
            ..GridConfig::default()
        };
        let err = overlay_grid(&white(10, 10), &config, TextRenderer::Fixed).unwrap_err();
        assert!(matches!(err, GradeError::RenderFailure(_)));
    }

    #[test]
    fn test_missing_source_writes_nothing() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("grid.png");
        let err = overlay_grid_file(
            &dir.path().join("missing.png"),
            &output,
            &GridConfig::default(),
            TextRenderer::Fixed,
        )
        .unwrap_err();

        assert!(matches!(err, GradeError::SourceUnavailable { .. }));
        assert!(!output.exists());
    }

    #[test]
    fn test_overlay_file_round_trip() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("sheet.png");
        let output = dir.path().join("grid_sheet.png");
        white(120, 80).save(&input).unwrap();

        overlay_grid_file(&input, &output, &GridConfig::default(), TextRenderer::Fixed).unwrap();

        let written = image::open(&output).unwrap().to_rgb8();
        assert_eq!(written.dimensions(), (120, 80));
        assert_eq!(*written.get_pixel(100, 70), Rgb([205, 205, 205]));
    }
}
