use chrono::Utc;
use uuid::Uuid;

use crate::content_store::ContentStore;
use crate::errors::{CourseError, CourseResult};
use crate::models::{DifficultyRecord, HistoryEntry, LessonContextRecord, LessonId, QueryRecord};
use crate::prompts::truncate_chars;

/// Longest answer excerpt rendered into prompt context
const ANSWER_EXCERPT_CHARS: usize = 300;

/// Recency-based learner context: what was asked, what was answered and
/// where the learner struggled. No similarity scoring.
#[derive(Clone)]
pub struct HistoryStore {
    store: ContentStore,
}

impl HistoryStore {
    pub fn new(store: ContentStore) -> Self {
        Self { store }
    }

    pub fn record_query(
        &self,
        course: &str,
        query: &str,
        answer: &str,
        lesson: Option<LessonId>,
    ) -> CourseResult<HistoryEntry> {
        if query.trim().is_empty() {
            return Err(CourseError::Validation("query must not be empty".to_string()));
        }
        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            course: course.to_string(),
            query: query.trim().to_string(),
            answer: answer.trim().to_string(),
            lesson,
            timestamp: Utc::now(),
        };
        self.store.append_history(&entry)?;
        Ok(entry)
    }

    /// Record a question as asked, before any answer exists
    pub fn record_question(&self, course: &str, query: &str, lesson: Option<LessonId>) -> CourseResult<QueryRecord> {
        if query.trim().is_empty() {
            return Err(CourseError::Validation("question must not be empty".to_string()));
        }
        let record = QueryRecord {
            id: Uuid::new_v4(),
            query: query.trim().to_string(),
            lesson,
            timestamp: Utc::now(),
        };
        self.store.append_query(course, &record)?;
        Ok(record)
    }

    pub fn record_difficulty(&self, lesson: &LessonId, text: &str) -> CourseResult<DifficultyRecord> {
        if text.trim().is_empty() {
            return Err(CourseError::Validation("difficulty text must not be empty".to_string()));
        }
        let record = DifficultyRecord {
            id: Uuid::new_v4(),
            lesson: lesson.clone(),
            text: text.trim().to_string(),
            timestamp: Utc::now(),
        };
        self.store.append_difficulty(&record)?;
        Ok(record)
    }

    pub fn record_lesson_context(
        &self,
        lesson: &LessonId,
        lesson_text: &str,
        video_transcripts: Vec<String>,
    ) -> CourseResult<LessonContextRecord> {
        let record = LessonContextRecord {
            id: Uuid::new_v4(),
            lesson: lesson.clone(),
            lesson_text: lesson_text.to_string(),
            video_transcripts,
            timestamp: Utc::now(),
        };
        self.store.append_lesson_context(&record)?;
        Ok(record)
    }

    /// At most `max_entries` history entries, most recent first
    pub fn get_context(&self, course: &str, max_entries: usize) -> CourseResult<Vec<HistoryEntry>> {
        let mut entries = self.store.history(course)?;
        // Stable sort keeps insertion order for identical timestamps
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(entries.into_iter().rev().take(max_entries).collect())
    }

    /// Difficulties recorded against one lesson, oldest first
    pub fn difficulties_for(&self, lesson: &LessonId) -> CourseResult<Vec<DifficultyRecord>> {
        Ok(self
            .store
            .difficulties(&lesson.course)?
            .into_iter()
            .filter(|record| &record.lesson == lesson)
            .collect())
    }

    /// Render recent history, plus the learner's difficulties with `lesson`
    /// when given, as plain prompt text. Empty when there is nothing to say.
    pub fn context_excerpt(&self, course: &str, lesson: Option<&LessonId>, max_entries: usize) -> CourseResult<String> {
        let mut lines = Vec::new();

        for entry in self.get_context(course, max_entries)? {
            lines.push(format!("- Q: {}", entry.query));
            if !entry.answer.is_empty() {
                lines.push(format!("  A: {}", truncate_chars(&entry.answer, ANSWER_EXCERPT_CHARS)));
            }
        }

        let difficulties = match lesson {
            Some(lesson) => self.difficulties_for(lesson)?,
            None => self.store.difficulties(course)?,
        };
        let recent_difficulties = difficulties.iter().rev().take(max_entries);
        for record in recent_difficulties {
            lines.push(format!("- Struggled with: {}", record.text));
        }

        Ok(lines.join("\n"))
    }
}
