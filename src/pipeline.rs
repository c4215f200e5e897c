//! One grading run over a cropped sheet.
//!
//! grid overlay -> quota check -> model request -> usage record ->
//! answer sheet -> graded image. All intermediate files land in the
//! workspace directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::ai::{mime_type_for, AnswerSource};
use crate::config::GraderConfig;
use crate::error::GradeError;
use crate::export::write_answer_data;
use crate::grading::{grade_image, parse_answer_sheet, AnswerSheet, GradeOutcome};
use crate::grid::overlay_grid_file;
use crate::quota::QuotaGate;
use crate::render::TextRenderer;

/// Everything a successful run produced.
#[derive(Clone, Debug)]
pub struct GradeRun {
    pub grid_image: PathBuf,
    pub graded_image: PathBuf,
    pub data_file: PathBuf,
    pub sheet: AnswerSheet,
    pub raw_response: String,
    pub outcome: GradeOutcome,
}

/// Grades the image at `cropped`, writing intermediate and final files to
/// `workspace`.
///
/// The model is not contacted when the quota refuses the request.
pub fn process_image(
    cropped: &Path,
    workspace: &Path,
    config: &GraderConfig,
    quota: &dyn QuotaGate,
    source: &dyn AnswerSource,
) -> Result<GradeRun, GradeError> {
    let name = cropped
        .file_name()
        .ok_or_else(|| GradeError::source_unavailable(cropped, "not a file path"))?
        .to_string_lossy()
        .into_owned();
    let stem = cropped
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.clone());
    let text = TextRenderer::detect(config.font_path.as_deref());

    crate::log(&format!("Grading {}", cropped.display()));

    let grid_image = workspace.join(format!("grid_{}", name));
    overlay_grid_file(cropped, &grid_image, &config.grid, text)?;

    let status = quota.check_quota()?;
    if let Some(reason) = status.reason {
        crate::log(&format!("Request refused: {} ({})", reason, status));
        return Err(GradeError::QuotaExceeded(reason));
    }

    let image_bytes = fs::read(&grid_image)?;
    let raw_response =
        source.request_grading(&image_bytes, mime_type_for(&grid_image), &config.model.prompt)?;

    match quota.record_usage() {
        Ok(true) => {}
        Ok(false) => crate::log("Request completed but was not counted"),
        Err(e) => crate::log(&format!("Failed to record usage: {}", e)),
    }

    let sheet = parse_answer_sheet(&raw_response)?;

    let data_file = workspace.join(format!("grading_data_{}.json", stem));
    write_answer_data(&sheet, &data_file)
        .map_err(|e| GradeError::Io(std::io::Error::other(format!("{:#}", e))))?;

    let graded_image = workspace.join(format!("graded_{}", name));
    let outcome = grade_image(cropped, &sheet, &graded_image, &config.marks, text)?;

    Ok(GradeRun {
        grid_image,
        graded_image,
        data_file,
        sheet,
        raw_response,
        outcome,
    })
}
