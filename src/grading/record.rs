//! The answer sheet returned by the grading model.
//!
//! The model is asked for JSON matching a fixed schema, but it does not always
//! comply to the letter: booleans arrive as `"true"`, coordinates as floats or
//! strings, and the whole document is sometimes wrapped in a markdown code
//! fence. Parsing normalizes all of that. A field that is still unreadable only
//! affects its own record; an unreadable document is a malformed response.

use regex::Regex;
use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GradeError;

const CODE_FENCE_PATTERN: &str = r"(?s)^```[A-Za-z]*\s*(.*?)\s*```$";

/// Where the model saw the written answer, in grid-image pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub x_coordinate: Option<i32>,
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub y_coordinate: Option<i32>,
}

impl Coordinates {
    pub fn new(x: i32, y: i32) -> Self {
        Self {
            x_coordinate: Some(x),
            y_coordinate: Some(y),
        }
    }

    /// Both axes, or nothing.
    pub fn position(&self) -> Option<(i32, i32)> {
        Some((self.x_coordinate?, self.y_coordinate?))
    }
}

/// One graded question.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub student_answer: String,
    #[serde(default)]
    pub correct_answer: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub correctness: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub answer_written: bool,
    #[serde(
        default,
        deserialize_with = "lenient_coordinates",
        skip_serializing_if = "Option::is_none"
    )]
    pub coordinates_of_answer: Option<Coordinates>,
}

/// The full grading document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerSheet {
    pub questions: Vec<QuestionRecord>,
    pub total_amount_of_questions: u32,
    /// As reported by the model; the score is recomputed from `questions`.
    pub correct_answers: u32,
}

impl AnswerSheet {
    /// Number of questions marked correct, counted from the records.
    pub fn correct_count(&self) -> usize {
        self.questions.iter().filter(|q| q.correctness).count()
    }
}

/// `true`/`false` in any case, as a bool or a string. Null and anything else
/// read as `false` so one bad flag only unmarks its own record.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match &value {
        Value::Bool(b) => *b,
        Value::String(s) if s.trim().eq_ignore_ascii_case("true") => true,
        Value::String(s) if s.trim().eq_ignore_ascii_case("false") => false,
        Value::Null => false,
        other => {
            crate::log(&format!("Unreadable boolean {} read as false", other));
            false
        }
    })
}

fn coordinate_from_value(value: &Value) -> Option<i32> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !number.is_finite() || number.abs() > i32::MAX as f64 {
        return None;
    }
    Some(number.round() as i32)
}

/// Integers, floats (rounded) and numeric strings. Anything else, including
/// values outside `i32`, means the axis is unknown.
fn lenient_coordinate<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let coordinate = coordinate_from_value(&value);
    if coordinate.is_none() && !value.is_null() {
        crate::log(&format!("Unreadable coordinate {} ignored", value));
    }
    Ok(coordinate)
}

/// A coordinates value that is not an object leaves the record unmarked.
fn lenient_coordinates<'de, D>(deserializer: D) -> Result<Option<Coordinates>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match Coordinates::deserialize(&value) {
        Ok(coordinates) => Ok(Some(coordinates)),
        Err(e) => {
            crate::log(&format!("Unreadable coordinates {} ignored: {}", value, e));
            Ok(None)
        }
    }
}

/// Removes a surrounding markdown code fence, if any.
fn strip_code_fence(text: &str) -> &str {
    let Ok(fence) = Regex::new(CODE_FENCE_PATTERN) else {
        return text;
    };
    match fence.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => text,
    }
}

/// Parses the model's response text into an answer sheet.
pub fn parse_answer_sheet(text: &str) -> Result<AnswerSheet, GradeError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(GradeError::UpstreamMalformed("empty response".to_string()));
    }

    let body = strip_code_fence(trimmed);
    serde_json::from_str(body).map_err(|e| GradeError::UpstreamMalformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "correct_answers": 1,
        "questions": [
            {
                "answer_written": true,
                "correctness": true,
                "question": "14x83",
                "student_answer": "1162",
                "correct_answer": "1162",
                "coordinates_of_answer": {"x_coordinate": 69, "y_coordinate": 156}
            },
            {
                "answer_written": true,
                "correctness": false,
                "question": "93x65",
                "student_answer": "21",
                "correct_answer": "6045",
                "coordinates_of_answer": {"x_coordinate": 229, "y_coordinate": 158}
            }
        ],
        "total_amount_of_questions": 2
    }"#;

    #[test]
    fn test_parse_sample() {
        let sheet = parse_answer_sheet(SAMPLE).unwrap();
        assert_eq!(sheet.questions.len(), 2);
        assert_eq!(sheet.total_amount_of_questions, 2);
        assert_eq!(sheet.correct_count(), 1);
        assert_eq!(
            sheet.questions[1].coordinates_of_answer.unwrap().position(),
            Some((229, 158))
        );
        assert_eq!(sheet.questions[0].student_answer, "1162");
    }

    #[test]
    fn test_string_booleans_are_coerced() {
        let text = r#"{
            "questions": [
                {"correctness": "true", "answer_written": "True",
                 "coordinates_of_answer": {"x_coordinate": 1, "y_coordinate": 2}},
                {"correctness": " false ", "answer_written": "false"}
            ],
            "total_amount_of_questions": 2,
            "correct_answers": 1
        }"#;
        let sheet = parse_answer_sheet(text).unwrap();
        assert!(sheet.questions[0].correctness);
        assert!(sheet.questions[0].answer_written);
        assert!(!sheet.questions[1].correctness);
        assert!(!sheet.questions[1].answer_written);
    }

    #[test]
    fn test_unreadable_booleans_read_as_false() {
        let text = r#"{"questions": [
                {"correctness": "maybe", "answer_written": 1},
                {"correctness": null, "answer_written": null}
            ],
            "total_amount_of_questions": 2, "correct_answers": 0}"#;
        let sheet = parse_answer_sheet(text).unwrap();
        assert!(sheet.questions.iter().all(|q| !q.correctness && !q.answer_written));
    }

    #[test]
    fn test_bad_record_does_not_sink_the_sheet() {
        let text = r#"{"questions": [
                {"answer_written": true, "correctness": true,
                 "coordinates_of_answer": {"x_coordinate": 69, "y_coordinate": 156}},
                {"correctness": null, "answer_written": null},
                {"answer_written": true,
                 "coordinates_of_answer": {"x_coordinate": "abc", "y_coordinate": 3}},
                {"answer_written": true, "coordinates_of_answer": "top left"},
                {"answer_written": true,
                 "coordinates_of_answer": {"x_coordinate": 1e12, "y_coordinate": 3}}
            ],
            "total_amount_of_questions": 5, "correct_answers": 1}"#;
        let sheet = parse_answer_sheet(text).unwrap();
        assert_eq!(sheet.questions.len(), 5);
        assert_eq!(sheet.questions[2].coordinates_of_answer.unwrap().x_coordinate, None);
        assert!(sheet.questions[3].coordinates_of_answer.is_none());
        assert_eq!(sheet.questions[4].coordinates_of_answer.unwrap().position(), None);

        let marks = crate::grading::marks::build_marks(&sheet.questions);
        assert_eq!(marks.len(), 1);
        assert_eq!(marks[0].position, (69, 156));
    }

    #[test]
    fn test_lenient_coordinates() {
        let text = r#"{"questions": [
                {"answer_written": true, "coordinates_of_answer": {"x_coordinate": 69.6, "y_coordinate": "156"}},
                {"answer_written": true, "coordinates_of_answer": {"x_coordinate": 10}},
                {"answer_written": true, "coordinates_of_answer": null}
            ],
            "total_amount_of_questions": 3, "correct_answers": 0}"#;
        let sheet = parse_answer_sheet(text).unwrap();
        assert_eq!(
            sheet.questions[0].coordinates_of_answer.unwrap().position(),
            Some((70, 156))
        );
        assert_eq!(sheet.questions[1].coordinates_of_answer.unwrap().position(), None);
        assert!(sheet.questions[2].coordinates_of_answer.is_none());
    }

    #[test]
    fn test_missing_fields_default() {
        let text = r#"{"questions": [{"question": "2+2"}],
                       "total_amount_of_questions": 1, "correct_answers": 0}"#;
        let sheet = parse_answer_sheet(text).unwrap();
        let q = &sheet.questions[0];
        assert!(!q.answer_written);
        assert!(!q.correctness);
        assert!(q.coordinates_of_answer.is_none());
        assert_eq!(q.student_answer, "");
    }

    #[test]
    fn test_code_fence_is_stripped() {
        let fenced = format!("```json\n{}\n```", SAMPLE);
        let sheet = parse_answer_sheet(&fenced).unwrap();
        assert_eq!(sheet.questions.len(), 2);
    }

    #[test]
    fn test_empty_and_invalid_responses() {
        assert!(matches!(
            parse_answer_sheet("   "),
            Err(GradeError::UpstreamMalformed(_))
        ));
        assert!(matches!(
            parse_answer_sheet("data = {'questions': []}"),
            Err(GradeError::UpstreamMalformed(_))
        ));
        // Required top-level field missing
        assert!(matches!(
            parse_answer_sheet(r#"{"questions": [], "correct_answers": 0}"#),
            Err(GradeError::UpstreamMalformed(_))
        ));
    }

    #[test]
    fn test_serialized_booleans_are_native() {
        let sheet = parse_answer_sheet(
            r#"{"questions": [{"correctness": "true", "answer_written": "true"}],
                "total_amount_of_questions": 1, "correct_answers": 1}"#,
        )
        .unwrap();
        let json = serde_json::to_string(&sheet).unwrap();
        assert!(json.contains("\"correctness\":true"));
        assert!(json.contains("\"answer_written\":true"));
    }
}
