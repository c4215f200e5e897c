//! Text rendering for grid labels and the score line.
//!
//! A TrueType font is used when one can be found; it is registered with
//! plotters and drawn through a bitmap backend over the image buffer.
//! Without one, a built-in 5x7 bitmap font covering digits and the score
//! text is used, scaled in whole pixels.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use image::{RgbImage, Rgba};
use plotters::prelude::*;
use plotters::style::{register_font, FontStyle};

use crate::error::GradeError;
use crate::render::draw::blend_pixel;

const FONT_FAMILY: &str = "grader-sans";

/// Font registered with plotters, decided once per process.
static SCALABLE_FONT: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Fonts tried when no font is configured.
const SYSTEM_FONTS: &[&str] = &[
    "arial.ttf",
    r"C:\Windows\Fonts\arial.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
];

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
const GLYPH_ADVANCE: u32 = GLYPH_WIDTH + 1;

/// Row bitmaps for the fallback font; bit 4 is the leftmost column.
fn glyph(c: char) -> Option<[u8; 7]> {
    let rows = match c {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'c' => [0x00, 0x00, 0x0E, 0x10, 0x10, 0x11, 0x0E],
        'o' => [0x00, 0x00, 0x0E, 0x11, 0x11, 0x11, 0x0E],
        'r' => [0x00, 0x00, 0x16, 0x19, 0x10, 0x10, 0x10],
        'e' => [0x00, 0x00, 0x0E, 0x11, 0x1F, 0x10, 0x0E],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '/' => [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x00],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        ' ' => [0x00; 7],
        _ => return None,
    };
    Some(rows)
}

/// Registers the first readable TrueType font with plotters.
fn register_scalable_font(configured: Option<&Path>) -> Option<PathBuf> {
    let candidates = configured
        .map(Path::to_path_buf)
        .into_iter()
        .chain(SYSTEM_FONTS.iter().map(PathBuf::from));

    for path in candidates {
        let Ok(bytes) = std::fs::read(&path) else {
            continue;
        };
        // plotters keeps registered fonts for the life of the process
        let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
        match register_font(FONT_FAMILY, FontStyle::Normal, bytes) {
            Ok(()) => {
                crate::log(&format!("Using font {}", path.display()));
                return Some(path);
            }
            Err(_) => {
                crate::log(&format!("Could not load font {}", path.display()));
            }
        }
    }

    crate::log("No TrueType font found, using built-in bitmap font");
    None
}

/// Draws short strings onto RGB images.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextRenderer {
    /// Registered TrueType font through plotters
    Scalable,
    /// Built-in 5x7 bitmap font
    Fixed,
}

impl TextRenderer {
    /// Picks the best available font. The first call decides which TrueType
    /// font is registered; later calls reuse it.
    pub fn detect(font_path: Option<&Path>) -> Self {
        match SCALABLE_FONT.get_or_init(|| register_scalable_font(font_path)) {
            Some(_) => TextRenderer::Scalable,
            None => TextRenderer::Fixed,
        }
    }

    /// Width and height of `text` at `size` pixels.
    pub fn measure(&self, text: &str, size: u32) -> (u32, u32) {
        if *self == TextRenderer::Scalable {
            match (FONT_FAMILY, size as f64).into_font().box_size(text) {
                Ok(extent) => return extent,
                Err(e) => crate::log(&format!("Font measurement failed: {:?}", e)),
            }
        }
        fixed_measure(text, size)
    }

    /// Draws `text` with its top-left corner at `pos`, blending with the
    /// color's alpha.
    pub fn draw(
        &self,
        img: &mut RgbImage,
        text: &str,
        pos: (i32, i32),
        size: u32,
        color: Rgba<u8>,
    ) -> Result<(), GradeError> {
        if *self == TextRenderer::Scalable {
            match draw_scalable(img, text, pos, size, color) {
                Ok(()) => return Ok(()),
                Err(e) => crate::log(&format!("Falling back to bitmap font: {}", e)),
            }
        }
        fixed_draw(img, text, pos, size, color);
        Ok(())
    }
}

fn draw_scalable(
    img: &mut RgbImage,
    text: &str,
    pos: (i32, i32),
    size: u32,
    color: Rgba<u8>,
) -> Result<(), GradeError> {
    let (w, h) = img.dimensions();
    let root = BitMapBackend::with_buffer(&mut **img, (w, h)).into_drawing_area();
    let rgba = RGBColor(color[0], color[1], color[2]).mix(color[3] as f64 / 255.0);
    let style = (FONT_FAMILY, size as f64).into_font().color(&rgba);

    root.draw_text(text, &style, pos)
        .map_err(GradeError::render)?;
    root.present().map_err(GradeError::render)?;
    Ok(())
}

fn fixed_scale(size: u32) -> u32 {
    (size / GLYPH_HEIGHT).max(1)
}

fn fixed_measure(text: &str, size: u32) -> (u32, u32) {
    let scale = fixed_scale(size);
    let count = text.chars().count() as u32;
    if count == 0 {
        return (0, 0);
    }
    (count * GLYPH_ADVANCE * scale - scale, GLYPH_HEIGHT * scale)
}

fn fixed_draw(img: &mut RgbImage, text: &str, pos: (i32, i32), size: u32, color: Rgba<u8>) {
    let scale = fixed_scale(size) as i64;
    let mut cursor_x = pos.0 as i64;

    for c in text.chars() {
        if let Some(rows) = glyph(c) {
            for (row_idx, row) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if row & (0x10 >> col) == 0 {
                        continue;
                    }
                    let x0 = cursor_x + col as i64 * scale;
                    let y0 = pos.1 as i64 + row_idx as i64 * scale;
                    for dy in 0..scale {
                        for dx in 0..scale {
                            blend_pixel(img, x0 + dx, y0 + dy, color);
                        }
                    }
                }
            }
        }
        cursor_x += GLYPH_ADVANCE as i64 * scale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_fixed_measure() {
        let renderer = TextRenderer::Fixed;
        // size 14 -> scale 2 -> 3 glyphs of 12px advance minus trailing gap
        assert_eq!(renderer.measure("250", 14), (34, 14));
        assert_eq!(renderer.measure("", 14), (0, 0));
        // Wider text must measure wider for right alignment
        assert!(renderer.measure("Score: 10/10", 20).0 > renderer.measure("Score: 1/2", 20).0);
    }

    #[test]
    fn test_fixed_draw_paints_glyph_pixels() {
        let mut img = RgbImage::from_pixel(40, 20, Rgb([255, 255, 255]));
        TextRenderer::Fixed
            .draw(&mut img, "1", (0, 0), 14, Rgba([255, 0, 0, 255]))
            .unwrap();

        // Top row of '1' is the middle column only (scaled by 2)
        assert_eq!(*img.get_pixel(4, 0), Rgb([255, 0, 0]));
        assert_eq!(*img.get_pixel(5, 1), Rgb([255, 0, 0]));
        assert_eq!(*img.get_pixel(0, 0), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_fixed_draw_clips_off_image() {
        let mut img = RgbImage::from_pixel(10, 10, Rgb([255, 255, 255]));
        TextRenderer::Fixed
            .draw(&mut img, "Score: 9/9", (-20, -3), 20, Rgba([0, 0, 255, 255]))
            .unwrap();
        assert_eq!(img.dimensions(), (10, 10));
    }

    #[test]
    fn test_unknown_chars_advance_without_drawing() {
        let mut img = RgbImage::from_pixel(20, 10, Rgb([255, 255, 255]));
        TextRenderer::Fixed
            .draw(&mut img, "?", (0, 0), 7, Rgba([0, 0, 0, 255]))
            .unwrap();
        assert!(img.pixels().all(|p| *p == Rgb([255, 255, 255])));
    }

    #[test]
    fn test_scalable_score_stays_in_measured_box() {
        let renderer = TextRenderer::detect(None);
        if renderer == TextRenderer::Fixed {
            // No TrueType font on this machine
            return;
        }

        let (w, h) = renderer.measure("Score: 1/2", 20);
        assert!(w > 0 && h > 0);
        assert!(renderer.measure("Score: 10/10", 20).0 > w);

        let mut img = RgbImage::from_pixel(400, 300, Rgb([255, 255, 255]));
        let left = (400 - w - 20) as i32;
        renderer
            .draw(&mut img, "Score: 1/2", (left, 20), 20, Rgba([0, 0, 255, 255]))
            .unwrap();

        let inked: Vec<(u32, u32)> = img
            .enumerate_pixels()
            .filter(|(_, _, p)| **p != Rgb([255, 255, 255]))
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!inked.is_empty());

        // Antialiasing may spill a few pixels past the measured box
        let slack = 4;
        let x_range = (left - slack) as u32..=380 + slack as u32;
        let y_range = 20 - slack as u32..=20 + h + slack as u32;
        for (x, y) in inked {
            assert!(x_range.contains(&x), "ink at x={} outside {:?}", x, x_range);
            assert!(y_range.contains(&y), "ink at y={} outside {:?}", y, y_range);
        }
    }
}
