use serde_json::{json, Value};

/// Response schema handed to the model so it answers with an answer sheet.
pub fn response_schema() -> Value {
    let coordinates = json!({
        "type": "OBJECT",
        "required": ["x_coordinate", "y_coordinate"],
        "properties": {
            "x_coordinate": { "type": "INTEGER" },
            "y_coordinate": { "type": "INTEGER" }
        }
    });

    let question = json!({
        "type": "OBJECT",
        "required": [
            "question",
            "student_answer",
            "correct_answer",
            "correctness",
            "answer_written",
            "coordinates_of_answer"
        ],
        "properties": {
            "question": { "type": "STRING" },
            "student_answer": { "type": "STRING" },
            "correct_answer": { "type": "STRING" },
            "correctness": { "type": "BOOLEAN" },
            "answer_written": { "type": "BOOLEAN" },
            "coordinates_of_answer": coordinates
        }
    });

    json!({
        "type": "OBJECT",
        "required": ["questions", "total_amount_of_questions", "correct_answers"],
        "properties": {
            "questions": { "type": "ARRAY", "items": question },
            "total_amount_of_questions": { "type": "INTEGER" },
            "correct_answers": { "type": "INTEGER" }
        }
    })
}
