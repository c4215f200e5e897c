//! Turning graded question records into marks to draw.

use serde::Serialize;

use crate::grading::record::{AnswerSheet, QuestionRecord};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkKind {
    Check,
    Cross,
}

/// A mark at the coordinate the model reported for an answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Mark {
    pub position: (i32, i32),
    pub kind: MarkKind,
}

/// Builds one mark per written answer with known coordinates, in input order.
///
/// Unwritten answers and answers without a usable position are skipped.
pub fn build_marks(records: &[QuestionRecord]) -> Vec<Mark> {
    let mut marks = Vec::with_capacity(records.len());

    for (idx, record) in records.iter().enumerate() {
        if !record.answer_written {
            continue;
        }
        let Some(position) = record.coordinates_of_answer.and_then(|c| c.position()) else {
            crate::log(&format!(
                "Question {} ({:?}) has no coordinates, not marked",
                idx + 1,
                record.question
            ));
            continue;
        };

        let kind = if record.correctness {
            MarkKind::Check
        } else {
            MarkKind::Cross
        };
        marks.push(Mark { position, kind });
    }

    marks
}

/// Score line drawn in the corner of the graded sheet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct GradeSummary {
    pub correct: usize,
    pub total: u32,
}

impl GradeSummary {
    /// Correct count from the records, total as reported.
    pub fn from_sheet(sheet: &AnswerSheet) -> Self {
        Self {
            correct: sheet.correct_count(),
            total: sheet.total_amount_of_questions,
        }
    }

    pub fn text(&self) -> String {
        format!("Score: {}/{}", self.correct, self.total)
    }
}
