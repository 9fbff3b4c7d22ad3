//! JSON fixtures shaped like content service responses

use mav_viewer::RouteParams;
use serde_json::{json, Value};

/// Well-formed objective question, optionally linked to a set
pub fn objective_question(id: &str, set_id: Option<&str>) -> Value {
    let mut question = json!({
        "_id": id,
        "question": format!("Question {}", id),
        "options": ["2", "3", "4", "5"],
        "correctAnswer": 2,
        "createdAt": "2024-05-01T08:30:00Z"
    });
    if let Some(set_id) = set_id {
        question["questionSet"] = json!(set_id);
    }
    question
}

/// Objective set summary with the given question entries
pub fn objective_set(id: &str, level: &str, questions: Value) -> Value {
    let total = questions.as_array().map_or(0, Vec::len);
    json!({
        "_id": id,
        "name": format!("Set {}", id),
        "description": "",
        "level": level,
        "totalQuestions": total,
        "questions": questions
    })
}

/// Bundle with one video and the given L1/L2/L3 objective sets
pub fn bundle_json(title: &str, l1: Value, l2: Value, l3: Value) -> Value {
    json!({
        "item": { "_id": "item-1", "title": title, "description": null },
        "summaries": [
            { "_id": "sum-1", "title": "Overview", "content": "Key ideas", "createdAt": "2024-05-01T08:30:00Z" }
        ],
        "videos": [
            { "_id": "vid-1", "title": "Walkthrough", "url": "https://cdn.example/v1.mp4", "duration": 312.5 }
        ],
        "pyqs": [
            { "_id": "pyq-1", "question": "State Ohm's law", "answer": "V = IR", "year": 2019 }
        ],
        "objectiveSets": { "L1": l1, "L2": l2, "L3": l3 },
        "subjectiveSets": { "L1": [], "L2": [], "L3": [] }
    })
}

pub fn topic_route(book: &str, chapter: &str, topic: &str) -> RouteParams {
    RouteParams {
        book_id: Some(book.to_string()),
        chapter_id: Some(chapter.to_string()),
        topic_id: Some(topic.to_string()),
        subtopic_id: None,
        is_workbook: false,
    }
}
