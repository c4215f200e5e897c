//! Drawing marks and the score onto the original sheet.

use std::path::{Path, PathBuf};

use image::RgbImage;
use serde::Serialize;

use crate::config::MarkConfig;
use crate::error::GradeError;
use crate::grading::marks::{build_marks, GradeSummary, Mark, MarkKind};
use crate::grading::record::AnswerSheet;
use crate::render::draw::{draw_polyline, draw_thick_line, COLOR_CHECK, COLOR_CROSS, COLOR_SCORE};
use crate::render::TextRenderer;

/// Checkmark vertices as fractions of the mark size.
const CHECK_POINTS: [(f32, f32); 3] = [(0.10, 0.50), (0.35, 0.75), (0.85, 0.25)];

/// Inset of the cross diagonals as a fraction of the mark size.
const CROSS_MARGIN: f32 = 0.10;

/// What a grading run produced.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GradeOutcome {
    pub success: bool,
    pub output_file: PathBuf,
    pub marked_answers: usize,
    pub total_questions: u32,
    pub correct_answers: usize,
}

/// Top-left corner of the box a mark is drawn in.
///
/// Coordinates come from the model unchecked, so the offsets saturate.
fn mark_anchor(mark: &Mark, config: &MarkConfig) -> (f32, f32) {
    let (x, y) = mark.position;
    let anchor_x = x.saturating_sub(config.offset_x);
    let anchor_y = match mark.kind {
        MarkKind::Check => y.saturating_add(5),
        MarkKind::Cross => y.saturating_sub(i32::try_from(config.size / 3).unwrap_or(i32::MAX)),
    };
    (anchor_x as f32, anchor_y as f32)
}

fn draw_mark(img: &mut RgbImage, mark: &Mark, config: &MarkConfig) {
    let (ax, ay) = mark_anchor(mark, config);
    let size = config.size as f32;
    let thickness = config.thickness();

    match mark.kind {
        MarkKind::Check => {
            let points = CHECK_POINTS.map(|(fx, fy)| (ax + fx * size, ay + fy * size));
            draw_polyline(img, &points, COLOR_CHECK, thickness);
        }
        MarkKind::Cross => {
            let near = CROSS_MARGIN * size;
            let far = size - near;
            draw_thick_line(img, (ax + near, ay + near), (ax + far, ay + far), COLOR_CROSS, thickness);
            draw_thick_line(img, (ax + far, ay + near), (ax + near, ay + far), COLOR_CROSS, thickness);
        }
    }
}

/// Returns a copy of `img` with every mark and the score line drawn on it.
pub fn annotate(
    img: &RgbImage,
    marks: &[Mark],
    summary: &GradeSummary,
    config: &MarkConfig,
    text: TextRenderer,
) -> Result<RgbImage, GradeError> {
    let mut out = img.clone();

    for mark in marks {
        draw_mark(&mut out, mark, config);
    }

    let score = summary.text();
    let (text_w, _) = text.measure(&score, config.score_font_size);
    let x = out
        .width()
        .saturating_sub(text_w)
        .saturating_sub(config.score_margin);
    let pos = (x as i32, config.score_margin as i32);
    text.draw(&mut out, &score, pos, config.score_font_size, COLOR_SCORE)?;

    Ok(out)
}

/// Grades the image at `input` with `sheet` and writes the result to `output`.
///
/// The output format follows the extension of `output`.
pub fn grade_image(
    input: &Path,
    sheet: &AnswerSheet,
    output: &Path,
    config: &MarkConfig,
    text: TextRenderer,
) -> Result<GradeOutcome, GradeError> {
    let img = image::open(input)
        .map_err(|e| GradeError::source_unavailable(input, e))?
        .to_rgb8();

    let marks = build_marks(&sheet.questions);
    let summary = GradeSummary::from_sheet(sheet);
    crate::log(&format!(
        "Marking {} of {} answers, {}",
        marks.len(),
        sheet.questions.len(),
        summary.text()
    ));

    let graded = annotate(&img, &marks, &summary, config, text)?;
    graded.save(output).map_err(GradeError::render)?;
    crate::log(&format!("Graded image saved to {}", output.display()));

    Ok(GradeOutcome {
        success: true,
        output_file: output.to_path_buf(),
        marked_answers: marks.len(),
        total_questions: summary.total,
        correct_answers: summary.correct,
    })
}
