use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Every curriculum has exactly this shape: 7 modules × 10 submodules × 10 lessons
pub const MODULES_PER_COURSE: usize = 7;
pub const SUBMODULES_PER_MODULE: usize = 10;
pub const LESSONS_PER_SUBMODULE: usize = 10;

/// Stable identity of a lesson: course directory name plus 1-based positions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LessonId {
    pub course: String,
    pub module: u8,
    pub submodule: u8,
    pub lesson: u8,
}

impl LessonId {
    pub fn new(course: impl Into<String>, module: u8, submodule: u8, lesson: u8) -> Self {
        Self {
            course: course.into(),
            module,
            submodule,
            lesson,
        }
    }
}

impl fmt::Display for LessonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.course, self.module, self.submodule, self.lesson
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    /// Directory name, used as the course id everywhere else
    pub id: String,
    /// Subject as the learner typed it, e.g. "Korean"
    pub name: String,
    pub background: String,
    pub created_at: DateTime<Utc>,
    pub modules: Vec<Module>,
}

impl Course {
    pub fn lesson_count(&self) -> usize {
        self.modules
            .iter()
            .flat_map(|m| &m.submodules)
            .map(|s| s.lessons.len())
            .sum()
    }
}

/// Course header as listed, without the tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseSummary {
    pub id: String,
    pub name: String,
    pub background: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub position: u8,
    pub title: String,
    pub submodules: Vec<Submodule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submodule {
    pub position: u8,
    pub title: String,
    pub lessons: Vec<LessonOutline>,
}

/// A lesson as it appears in the course tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonOutline {
    pub position: u8,
    pub title: String,
    pub overview: String,
    pub expanded: bool,
    pub completed: bool,
}

/// A fully loaded lesson
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: LessonId,
    pub title: String,
    pub module_title: String,
    pub submodule_title: String,
    pub overview: String,
    pub expanded: Option<ExpandedContent>,
    pub content: Option<LessonContent>,
    /// Always present; empty when no video could be attached
    pub videos: Vec<VideoReference>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandedContent {
    pub lesson_title: String,
    /// Copy of the lesson overview at expansion time
    pub overview: String,
    pub learning_objectives: Vec<String>,
    pub key_concepts: Vec<String>,
    pub grammar_points: Vec<String>,
    pub vocabulary: Vec<String>,
    pub practice_exercises: Vec<String>,
    pub cultural_context: String,
    pub detailed_content: String,
    pub generated_at: DateTime<Utc>,
}

impl ExpandedContent {
    /// Plain-text rendering used as prompt context for later steps
    pub fn as_prompt_text(&self) -> String {
        let mut text = format!("{}\n{}\n", self.lesson_title, self.overview);
        for (label, items) in [
            ("Learning objectives", &self.learning_objectives),
            ("Key concepts", &self.key_concepts),
            ("Grammar points", &self.grammar_points),
            ("Vocabulary", &self.vocabulary),
        ] {
            if !items.is_empty() {
                text.push_str(&format!("{}: {}\n", label, items.join("; ")));
            }
        }
        if !self.detailed_content.is_empty() {
            text.push('\n');
            text.push_str(&self.detailed_content);
        }
        text
    }
}

/// Narrative lesson material: a story with translations and highlighted target words
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonContent {
    pub story: Vec<StorySentence>,
    pub lesson_focus: LessonFocus,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorySentence {
    pub sentence: String,
    pub translation: String,
    pub target_words: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LessonFocus {
    #[serde(default)]
    pub grammar_points: Vec<String>,
    #[serde(default)]
    pub vocabulary: Vec<String>,
    #[serde(default)]
    pub cultural_notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoReference {
    pub video_id: String,
    pub title: String,
    pub channel: String,
    pub url: String,
    pub search_query: String,
    pub summary: Option<String>,
    pub relevance: Option<String>,
    pub added_at: DateTime<Utc>,
}

/// A search hit before its transcript has been processed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoCandidate {
    pub video_id: String,
    pub title: String,
    pub channel: String,
    pub search_query: String,
}

impl VideoCandidate {
    pub fn url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.video_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub duration: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub course: String,
    pub query: String,
    pub answer: String,
    pub lesson: Option<LessonId>,
    pub timestamp: DateTime<Utc>,
}

/// A question as asked, recorded before any answer is generated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub id: Uuid,
    pub query: String,
    pub lesson: Option<LessonId>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyRecord {
    pub id: Uuid,
    pub lesson: LessonId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot of what a lesson covered, including gathered transcripts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonContextRecord {
    pub id: Uuid,
    pub lesson: LessonId,
    pub lesson_text: String,
    pub video_transcripts: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseProgress {
    pub course: String,
    pub total_lessons: usize,
    pub completed_lessons: usize,
    pub expanded_lessons: usize,
    pub attached_videos: usize,
    pub completion_percentage: f64,
    pub modules: Vec<ModuleProgress>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleProgress {
    pub position: u8,
    pub title: String,
    pub total_lessons: usize,
    pub completed_lessons: usize,
}

// Request types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurriculumRequest {
    pub subject: String,
    #[serde(default)]
    pub background: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpandLessonRequest {
    #[serde(default)]
    pub with_videos: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonPosition {
    pub module: u8,
    pub submodule: u8,
    pub lesson: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
    pub lesson: Option<LessonPosition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifficultyRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    #[serde(default = "default_completed")]
    pub completed: bool,
}

fn default_completed() -> bool {
    true
}
