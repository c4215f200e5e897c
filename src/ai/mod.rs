//! The grading model behind a small trait.

pub mod gemini;
pub mod schema;

use std::path::Path;

use crate::error::GradeError;

pub use gemini::GeminiClient;

/// Anything that can grade a sheet image and answer with the raw JSON text.
pub trait AnswerSource {
    fn request_grading(&self, image: &[u8], mime_type: &str, prompt: &str)
    -> Result<String, GradeError>;
}

/// MIME type for an image file, from its extension.
pub fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}
