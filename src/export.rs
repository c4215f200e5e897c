//! Writing grading results for download.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::grading::AnswerSheet;

/// Name of the data document inside the bundle.
pub const BUNDLE_DATA_NAME: &str = "homework_grade_data.json";

/// Export the normalized answer sheet to a JSON file.
///
/// The output is pretty-printed for human readability.
pub fn write_answer_data(sheet: &AnswerSheet, output_path: &Path) -> Result<()> {
    let json =
        serde_json::to_string_pretty(sheet).context("Failed to serialize answer sheet to JSON")?;

    let mut file = File::create(output_path)
        .context(format!("Failed to create JSON file: {}", output_path.display()))?;

    file.write_all(json.as_bytes())
        .context("Failed to write JSON data")?;

    Ok(())
}

/// Name of the graded image inside the bundle, keeping the source extension.
fn bundle_image_name(graded_image: &Path) -> String {
    let ext = graded_image
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("jpg");
    format!("graded_homework.{}", ext)
}

/// Packs the graded image and its data document into one zip file.
pub fn write_bundle(zip_path: &Path, graded_image: &Path, data_json: &Path) -> Result<()> {
    let image_bytes = std::fs::read(graded_image)
        .context(format!("Failed to read graded image: {}", graded_image.display()))?;
    let data_bytes = std::fs::read(data_json)
        .context(format!("Failed to read grading data: {}", data_json.display()))?;

    let file = File::create(zip_path)
        .context(format!("Failed to create bundle: {}", zip_path.display()))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(bundle_image_name(graded_image), options)?;
    zip.write_all(&image_bytes)?;
    zip.start_file(BUNDLE_DATA_NAME, options)?;
    zip.write_all(&data_bytes)?;
    zip.finish().context("Failed to finish bundle")?;

    crate::log(&format!("Bundle written to {}", zip_path.display()));
    Ok(())
}
