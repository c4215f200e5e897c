//! Answer sheets, marks and the graded image.

pub mod annotate;
pub mod marks;
pub mod record;

pub use annotate::{grade_image, GradeOutcome};
pub use record::{parse_answer_sheet, AnswerSheet};
