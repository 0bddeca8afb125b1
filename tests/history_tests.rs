mod common;

use common::*;
use course_generator::{
    CourseError, HistoryStore, LessonId, RecordKind, RecordStore, JsonFileRecordStore,
    response_parser::parse_curriculum,
};
use serde_json::json;

fn history_with_course(dirs: &TestDirs) -> HistoryStore {
    let store = dirs.store();
    let modules = parse_curriculum(&curriculum_json("Korean").to_string()).unwrap();
    store.create_course("Korean", "", modules).unwrap();
    HistoryStore::new(store)
}

#[test]
fn test_get_context_is_bounded_and_most_recent_first() {
    let dirs = TestDirs::new();
    let history = history_with_course(&dirs);

    for i in 0..8 {
        history
            .record_query("Korean", &format!("question {}", i), &format!("answer {}", i), None)
            .unwrap();
    }

    let recent = history.get_context("Korean", 3).unwrap();
    let queries: Vec<&str> = recent.iter().map(|e| e.query.as_str()).collect();
    assert_eq!(queries, vec!["question 7", "question 6", "question 5"]);

    assert_eq!(history.get_context("Korean", 100).unwrap().len(), 8);
    assert!(history.get_context("Korean", 0).unwrap().is_empty());
}

#[test]
fn test_history_survives_reopening_the_store() {
    let dirs = TestDirs::new();
    history_with_course(&dirs)
        .record_query("Korean", "What is 받침?", "A final consonant.", None)
        .unwrap();

    let reopened = HistoryStore::new(dirs.store());
    let entries = reopened.get_context("Korean", 5).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].answer, "A final consonant.");
}

#[test]
fn test_unknown_course_has_no_history() {
    let dirs = TestDirs::new();
    let history = history_with_course(&dirs);
    assert!(matches!(
        history.get_context("Japanese", 5),
        Err(CourseError::NotFound(_))
    ));
    assert!(history.get_context("Korean", 5).unwrap().is_empty());
}

#[test]
fn test_difficulties_are_scoped_to_lessons() {
    let dirs = TestDirs::new();
    let history = history_with_course(&dirs);
    let vowels = LessonId::new("Korean", 1, 1, 1);
    let consonants = LessonId::new("Korean", 1, 1, 2);

    history.record_difficulty(&vowels, "ㅓ versus ㅗ").unwrap();
    history.record_difficulty(&consonants, "aspirated consonants").unwrap();
    history.record_difficulty(&vowels, "  ㅐ versus ㅔ  ").unwrap();

    let texts: Vec<String> = history
        .difficulties_for(&vowels)
        .unwrap()
        .into_iter()
        .map(|d| d.text)
        .collect();
    assert_eq!(texts, vec!["ㅓ versus ㅗ", "ㅐ versus ㅔ"]);

    assert!(matches!(
        history.record_difficulty(&LessonId::new("Korean", 9, 1, 1), "anything"),
        Err(CourseError::NotFound(_))
    ));
    assert!(matches!(
        history.record_difficulty(&vowels, "   "),
        Err(CourseError::Validation(_))
    ));
}

#[test]
fn test_context_excerpt_rendering() {
    let dirs = TestDirs::new();
    let history = history_with_course(&dirs);
    let lesson = LessonId::new("Korean", 1, 1, 1);

    assert_eq!(history.context_excerpt("Korean", Some(&lesson), 5).unwrap(), "");

    history
        .record_query("Korean", "How many vowels?", "There are 21 vowels.", Some(lesson.clone()))
        .unwrap();
    history.record_query("Korean", "Is ㅇ silent?", "", None).unwrap();
    history.record_difficulty(&lesson, "long vowel charts").unwrap();

    let excerpt = history.context_excerpt("Korean", Some(&lesson), 5).unwrap();
    assert_eq!(
        excerpt,
        "- Q: Is ㅇ silent?\n- Q: How many vowels?\n  A: There are 21 vowels.\n- Struggled with: long vowel charts"
    );
}

#[test]
fn test_context_excerpt_truncates_long_answers() {
    let dirs = TestDirs::new();
    let history = history_with_course(&dirs);
    history
        .record_query("Korean", "Explain particles", &"가".repeat(1000), None)
        .unwrap();

    let excerpt = history.context_excerpt("Korean", None, 5).unwrap();
    assert!(excerpt.chars().count() < 400);
}

#[test]
fn test_lesson_context_records() {
    let dirs = TestDirs::new();
    let history = history_with_course(&dirs);
    let lesson = LessonId::new("Korean", 2, 3, 4);

    let record = history
        .record_lesson_context(&lesson, "Vowels lesson", vec!["transcript one".to_string()])
        .unwrap();

    let store = dirs.store();
    let stored = store.lesson_contexts("Korean").unwrap();
    assert_eq!(stored, vec![record]);
}

#[test]
fn test_undecodable_records_are_skipped() {
    let dirs = TestDirs::new();
    let history = history_with_course(&dirs);
    history.record_query("Korean", "Valid question", "Valid answer", None).unwrap();

    // A foreign record lands in the same file
    let records = JsonFileRecordStore::new(dirs.root.path().join("data"));
    records
        .append(RecordKind::History, "Korean", json!({"unexpected": true}))
        .unwrap();
    assert_eq!(records.get(RecordKind::History, "Korean").unwrap().len(), 2);

    let entries = history.get_context("Korean", 10).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].query, "Valid question");
}
