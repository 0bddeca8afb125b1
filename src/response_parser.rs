//! Turns raw model text into typed course data.
//!
//! Every parser tries, in order: the JSON found in the reply, the same JSON
//! with truncated brackets closed, and a permissive line-based reading of the
//! text. Nothing here touches the store.

use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

use crate::errors::{CourseError, CourseResult};
use crate::models::{
    ExpandedContent, LESSONS_PER_SUBMODULE, LessonContent, LessonFocus, LessonOutline,
    MODULES_PER_COURSE, Module, SUBMODULES_PER_MODULE, StorySentence, Submodule,
};

pub struct JsonResponseParser;

impl JsonResponseParser {
    /// Extract JSON from LLM responses that might be wrapped in markdown or other formatting
    pub fn extract_json_from_response(content: &str) -> String {
        // Try to find JSON within markdown code blocks
        if let Some(start) = content.find("```json") {
            let json_start = start + 7;
            return match content[json_start..].find("```") {
                Some(end) => content[json_start..json_start + end].trim().to_string(),
                // Unterminated fence: the reply was cut off mid-block
                None => content[json_start..].trim().to_string(),
            };
        }

        // Try to find JSON within plain code blocks
        if let Some(start) = content.find("```") {
            if let Some(end) = content[start + 3..].find("```") {
                let json_start = start + 3;
                let potential_json = content[json_start..json_start + end].trim();
                if potential_json.starts_with('{') || potential_json.starts_with('[') {
                    return potential_json.to_string();
                }
            }
        }

        let object_start = content.find('{');
        let array_start = content.find('[');
        let prefer_array = match (object_start, array_start) {
            (Some(object), Some(array)) => array < object,
            (None, Some(_)) => true,
            _ => false,
        };

        let (open, close) = if prefer_array { ('[', ']') } else { ('{', '}') };
        if let Some(start) = content.find(open) {
            return match content.rfind(close) {
                Some(end) if end > start => content[start..=end].to_string(),
                _ => content[start..].trim_end().to_string(),
            };
        }

        // Return original content if no JSON extraction patterns match
        content.trim().to_string()
    }

    /// Parse JSON response into a specific type, repairing truncation on a second attempt
    pub fn parse_json_response<T>(content: &str) -> CourseResult<T>
    where
        T: DeserializeOwned,
    {
        let json_content = Self::extract_json_from_response(content);
        match serde_json::from_str::<T>(&json_content) {
            Ok(parsed) => Ok(parsed),
            Err(first_error) => {
                let repaired = repair_truncated_json(&json_content);
                debug!(
                    error = %first_error,
                    repaired_length = repaired.len(),
                    "JSON parse failed, retrying with repaired JSON"
                );
                serde_json::from_str::<T>(&repaired).map_err(|e| {
                    CourseError::MalformedGeneration(format!("Failed to parse JSON response: {}", e))
                })
            }
        }
    }
}

/// Close whatever a cut-off reply left open: a dangling string, then every
/// unclosed array and object in reverse order. A trailing comma or a key
/// without a value is dropped first.
pub fn repair_truncated_json(json: &str) -> String {
    let mut closers = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in json.chars() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                closers.pop();
            }
            _ => {}
        }
    }

    let mut repaired = json.trim_end().to_string();
    if in_string {
        if escaped {
            repaired.pop();
        }
        repaired.push('"');
    }

    loop {
        let trimmed = repaired.trim_end();
        if let Some(stripped) = trimmed.strip_suffix(',') {
            repaired = stripped.to_string();
        } else if trimmed.ends_with(':') {
            // `"key":` with no value; drop the key as well
            let without_colon = &trimmed[..trimmed.len() - 1];
            match without_colon.trim_end().rfind(|c: char| c == ',' || c == '{') {
                Some(index) if without_colon.as_bytes()[index] == b'{' => {
                    repaired = without_colon[..=index].to_string();
                }
                Some(index) => repaired = without_colon[..index].to_string(),
                None => repaired = without_colon.to_string(),
            }
        } else {
            break;
        }
    }

    while let Some(closer) = closers.pop() {
        repaired.push(closer);
    }
    repaired
}

// ============================================================================
// Lenient field helpers
// ============================================================================

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.trim().to_string(),
        Value::Null => String::new(),
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| format!("{}: {}", key, value_to_text(value)))
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}

/// Accept a list of strings, a list of objects, a single string or null
fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .filter(|text| !text.is_empty())
            .collect(),
        Value::Null => Vec::new(),
        other => {
            let text = value_to_text(&other);
            if text.is_empty() { Vec::new() } else { vec![text] }
        }
    })
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_text(&value))
}

static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*•+]|\d+[.)])\s+").unwrap());
static MODULE_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[#*>\s-]*module\s+\d+\s*[:.)-]\s*(.+)$").unwrap());
static SUBMODULE_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[#*>\s-]*sub-?module\s+[\d.]+\s*[:.)-]\s*(.+)$").unwrap());
static LESSON_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[#*>\s-]*lesson\s+[\d.]+\s*[:.)-]\s*(.+)$").unwrap());
static MARKED_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__([^_]+?)__|\*\*([^*]+?)\*\*|<u>(.+?)</u>").unwrap());

fn strip_bullet(line: &str) -> &str {
    match BULLET.find(line) {
        Some(found) => line[found.end()..].trim(),
        None => line.trim(),
    }
}

fn is_bullet(line: &str) -> bool {
    strip_bullet(line).len() != line.trim().len()
}

fn clean_title(text: &str) -> String {
    text.trim()
        .trim_matches(|c: char| c == '*' || c == '"' || c == '#' || c == '_')
        .trim()
        .to_string()
}

// ============================================================================
// Curriculum
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct RawCurriculum {
    #[serde(default, alias = "sections")]
    modules: Vec<RawModule>,
}

#[derive(Debug, Default, Deserialize)]
struct RawModule {
    #[serde(default, alias = "module_title", alias = "name", deserialize_with = "lenient_text")]
    title: String,
    #[serde(default, alias = "subsections")]
    submodules: Vec<RawSubmodule>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSubmodule {
    #[serde(default, alias = "submodule_title", alias = "name", deserialize_with = "lenient_text")]
    title: String,
    #[serde(default, alias = "concepts")]
    lessons: Vec<RawLesson>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawLesson {
    Detailed {
        #[serde(default, alias = "lesson_title", alias = "name", deserialize_with = "lenient_text")]
        title: String,
        #[serde(
            default,
            alias = "lesson_overview",
            alias = "agenda",
            alias = "description",
            deserialize_with = "lenient_text"
        )]
        overview: String,
    },
    Title(String),
}

impl RawLesson {
    fn into_parts(self) -> (String, String) {
        match self {
            RawLesson::Detailed { title, overview } => (title, overview),
            RawLesson::Title(title) => (title, String::new()),
        }
    }
}

/// Parse a 7×10×10 curriculum. Extra entries are dropped; too few is malformed.
pub fn parse_curriculum(raw: &str) -> CourseResult<Vec<Module>> {
    if raw.trim().is_empty() {
        return Err(CourseError::MalformedGeneration("empty curriculum response".to_string()));
    }

    let json_attempt = JsonResponseParser::parse_json_response::<RawCurriculum>(raw)
        .and_then(shape_curriculum);

    match json_attempt {
        Ok(modules) => Ok(modules),
        Err(json_error) => {
            debug!(error = %json_error, "Curriculum JSON unusable, trying heading extraction");
            shape_curriculum(curriculum_from_headings(raw)).map_err(|heading_error| {
                CourseError::MalformedGeneration(format!(
                    "curriculum could not be parsed ({}); heading extraction: {}",
                    json_error, heading_error
                ))
            })
        }
    }
}

fn shape_curriculum(raw: RawCurriculum) -> CourseResult<Vec<Module>> {
    if raw.modules.len() < MODULES_PER_COURSE {
        return Err(CourseError::MalformedGeneration(format!(
            "expected {} modules, got {}",
            MODULES_PER_COURSE,
            raw.modules.len()
        )));
    }

    raw.modules
        .into_iter()
        .take(MODULES_PER_COURSE)
        .enumerate()
        .map(|(module_index, raw_module)| {
            let module_position = module_index as u8 + 1;
            if raw_module.submodules.len() < SUBMODULES_PER_MODULE {
                return Err(CourseError::MalformedGeneration(format!(
                    "module {} has {} submodules, expected {}",
                    module_position,
                    raw_module.submodules.len(),
                    SUBMODULES_PER_MODULE
                )));
            }

            let submodules = raw_module
                .submodules
                .into_iter()
                .take(SUBMODULES_PER_MODULE)
                .enumerate()
                .map(|(submodule_index, raw_submodule)| {
                    let submodule_position = submodule_index as u8 + 1;
                    if raw_submodule.lessons.len() < LESSONS_PER_SUBMODULE {
                        return Err(CourseError::MalformedGeneration(format!(
                            "submodule {}.{} has {} lessons, expected {}",
                            module_position,
                            submodule_position,
                            raw_submodule.lessons.len(),
                            LESSONS_PER_SUBMODULE
                        )));
                    }

                    let lessons = raw_submodule
                        .lessons
                        .into_iter()
                        .take(LESSONS_PER_SUBMODULE)
                        .enumerate()
                        .map(|(lesson_index, raw_lesson)| {
                            let position = lesson_index as u8 + 1;
                            let (title, overview) = raw_lesson.into_parts();
                            let title = non_empty_or(clean_title(&title), || format!("Lesson {}", position));
                            let overview = non_empty_or(overview.trim().to_string(), || format!("Learn {}", title));
                            LessonOutline {
                                position,
                                title,
                                overview,
                                expanded: false,
                                completed: false,
                            }
                        })
                        .collect();

                    Ok(Submodule {
                        position: submodule_position,
                        title: non_empty_or(clean_title(&raw_submodule.title), || {
                            format!("Submodule {}", submodule_position)
                        }),
                        lessons,
                    })
                })
                .collect::<CourseResult<Vec<_>>>()?;

            Ok(Module {
                position: module_position,
                title: non_empty_or(clean_title(&raw_module.title), || format!("Module {}", module_position)),
                submodules,
            })
        })
        .collect()
}

fn non_empty_or(value: String, fallback: impl FnOnce() -> String) -> String {
    if value.is_empty() { fallback() } else { value }
}

/// Read "Module 1: …", "Submodule 1.2: …", "Lesson 1.2.3: …" style outlines
fn curriculum_from_headings(raw: &str) -> RawCurriculum {
    let mut curriculum = RawCurriculum::default();

    for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
        if let Some(captures) = SUBMODULE_HEADING.captures(line) {
            if let Some(module) = curriculum.modules.last_mut() {
                module.submodules.push(RawSubmodule {
                    title: clean_title(&captures[1]),
                    lessons: Vec::new(),
                });
            }
        } else if let Some(captures) = MODULE_HEADING.captures(line) {
            curriculum.modules.push(RawModule {
                title: clean_title(&captures[1]),
                submodules: Vec::new(),
            });
        } else if let Some(captures) = LESSON_HEADING.captures(line) {
            let (title, overview) = match captures[1].split_once(" - ") {
                Some((title, overview)) => (clean_title(title), overview.trim().to_string()),
                None => (clean_title(&captures[1]), String::new()),
            };
            if let Some(submodule) = curriculum
                .modules
                .last_mut()
                .and_then(|module| module.submodules.last_mut())
            {
                submodule.lessons.push(RawLesson::Detailed { title, overview });
            }
        } else if let Some(RawLesson::Detailed { overview, .. }) = curriculum
            .modules
            .last_mut()
            .and_then(|module| module.submodules.last_mut())
            .and_then(|submodule| submodule.lessons.last_mut())
        {
            // A plain line right under a lesson heading is its overview
            if overview.is_empty() {
                let text = strip_bullet(line);
                let text = text
                    .strip_prefix("Overview:")
                    .or_else(|| text.strip_prefix("overview:"))
                    .unwrap_or(text);
                *overview = text.trim().to_string();
            }
        }
    }

    curriculum
}

// ============================================================================
// Lesson expansion
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct RawExpansion {
    #[serde(default, alias = "title", deserialize_with = "lenient_text")]
    lesson_title: String,
    #[serde(default, alias = "objectives", deserialize_with = "lenient_list")]
    learning_objectives: Vec<String>,
    #[serde(default, alias = "concepts", deserialize_with = "lenient_list")]
    key_concepts: Vec<String>,
    #[serde(default, alias = "grammar", deserialize_with = "lenient_list")]
    grammar_points: Vec<String>,
    #[serde(default, alias = "vocabulary_focus", deserialize_with = "lenient_list")]
    vocabulary: Vec<String>,
    #[serde(default, alias = "exercises", deserialize_with = "lenient_list")]
    practice_exercises: Vec<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    cultural_context: String,
    #[serde(default, alias = "content", deserialize_with = "lenient_text")]
    detailed_content: String,
}

impl RawExpansion {
    fn has_content(&self) -> bool {
        !self.learning_objectives.is_empty()
            || !self.key_concepts.is_empty()
            || !self.grammar_points.is_empty()
            || !self.vocabulary.is_empty()
            || !self.practice_exercises.is_empty()
            || !self.detailed_content.is_empty()
    }

    fn into_expansion(self, lesson_title: &str, overview: &str) -> ExpandedContent {
        ExpandedContent {
            lesson_title: non_empty_or(clean_title(&self.lesson_title), || lesson_title.to_string()),
            overview: overview.to_string(),
            learning_objectives: self.learning_objectives,
            key_concepts: self.key_concepts,
            grammar_points: self.grammar_points,
            vocabulary: self.vocabulary,
            practice_exercises: self.practice_exercises,
            cultural_context: self.cultural_context,
            detailed_content: self.detailed_content,
            generated_at: Utc::now(),
        }
    }
}

/// Minimum prose length accepted when the reply has no recognizable structure
const MIN_PROSE_CHARS: usize = 40;

/// Parse an expanded lesson. The lesson's own overview is always carried over.
pub fn parse_lesson_expansion(raw: &str, lesson_title: &str, overview: &str) -> CourseResult<ExpandedContent> {
    if let Ok(parsed) = JsonResponseParser::parse_json_response::<RawExpansion>(raw) {
        if parsed.has_content() {
            return Ok(parsed.into_expansion(lesson_title, overview));
        }
    }

    let sectioned = expansion_from_sections(raw);
    if sectioned.has_content() {
        return Ok(sectioned.into_expansion(lesson_title, overview));
    }

    Err(CourseError::MalformedGeneration(
        "lesson expansion contained no usable content".to_string(),
    ))
}

#[derive(Clone, Copy)]
enum ExpansionSection {
    Objectives,
    Concepts,
    Grammar,
    Vocabulary,
    Exercises,
    Culture,
    Body,
}

fn classify_heading(line: &str) -> Option<ExpansionSection> {
    let trimmed = line.trim();
    let looks_like_heading = trimmed.starts_with('#')
        || trimmed.ends_with(':')
        || (trimmed.starts_with("**") && trimmed.ends_with("**"));
    if !looks_like_heading || is_bullet(trimmed) {
        return None;
    }
    let lower = trimmed.to_lowercase();
    let section = if lower.contains("objective") {
        ExpansionSection::Objectives
    } else if lower.contains("concept") {
        ExpansionSection::Concepts
    } else if lower.contains("grammar") {
        ExpansionSection::Grammar
    } else if lower.contains("vocabulary") {
        ExpansionSection::Vocabulary
    } else if lower.contains("exercise") || lower.contains("practice") {
        ExpansionSection::Exercises
    } else if lower.contains("cultur") {
        ExpansionSection::Culture
    } else {
        ExpansionSection::Body
    };
    Some(section)
}

fn expansion_from_sections(raw: &str) -> RawExpansion {
    let mut expansion = RawExpansion::default();
    let mut section = ExpansionSection::Body;
    let mut body = Vec::new();
    let mut recognized_structure = false;

    for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
        if let Some(next) = classify_heading(line) {
            section = next;
            recognized_structure |= !matches!(next, ExpansionSection::Body);
            continue;
        }
        let item = strip_bullet(line).to_string();
        let listed = is_bullet(line);
        match section {
            ExpansionSection::Objectives
            | ExpansionSection::Concepts
            | ExpansionSection::Grammar
            | ExpansionSection::Vocabulary
            | ExpansionSection::Exercises
                if !listed =>
            {
                body.push(line.to_string())
            }
            ExpansionSection::Objectives => expansion.learning_objectives.push(item),
            ExpansionSection::Concepts => expansion.key_concepts.push(item),
            ExpansionSection::Grammar => expansion.grammar_points.push(item),
            ExpansionSection::Vocabulary => expansion.vocabulary.push(item),
            ExpansionSection::Exercises => expansion.practice_exercises.push(item),
            ExpansionSection::Culture => {
                if !expansion.cultural_context.is_empty() {
                    expansion.cultural_context.push(' ');
                }
                expansion.cultural_context.push_str(&item);
            }
            ExpansionSection::Body => body.push(line.to_string()),
        }
    }

    let body = body.join("\n");
    if recognized_structure || body.chars().count() >= MIN_PROSE_CHARS {
        expansion.detailed_content = body;
    }
    expansion
}

// ============================================================================
// Lesson content (story)
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawLessonContent {
    #[serde(default, alias = "sentences")]
    story: Vec<RawStorySentence>,
    #[serde(default)]
    lesson_focus: RawLessonFocus,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawStorySentence {
    Detailed {
        #[serde(alias = "text", deserialize_with = "lenient_text")]
        sentence: String,
        #[serde(default, alias = "english", deserialize_with = "lenient_text")]
        translation: String,
        #[serde(default, alias = "targets", deserialize_with = "lenient_list")]
        target_words: Vec<String>,
    },
    Plain(String),
}

#[derive(Debug, Default, Deserialize)]
struct RawLessonFocus {
    #[serde(default, deserialize_with = "lenient_list")]
    grammar_points: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    vocabulary: Vec<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    cultural_notes: String,
}

/// Words marked in a sentence as `__word__`, `**word**` or `<u>word</u>`
pub fn extract_marked_words(sentence: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    for captures in MARKED_WORD.captures_iter(sentence) {
        if let Some(word) = captures.iter().skip(1).flatten().next() {
            let word = word.as_str().trim().to_string();
            if !word.is_empty() && !words.contains(&word) {
                words.push(word);
            }
        }
    }
    words
}

fn story_sentence(sentence: String, translation: String, target_words: Vec<String>) -> StorySentence {
    let target_words = if target_words.is_empty() {
        extract_marked_words(&sentence)
    } else {
        target_words
    };
    StorySentence {
        sentence,
        translation,
        target_words,
    }
}

pub fn parse_lesson_content(raw: &str) -> CourseResult<LessonContent> {
    if let Ok(parsed) = JsonResponseParser::parse_json_response::<RawLessonContent>(raw) {
        let story: Vec<StorySentence> = parsed
            .story
            .into_iter()
            .map(|sentence| match sentence {
                RawStorySentence::Detailed {
                    sentence,
                    translation,
                    target_words,
                } => story_sentence(sentence, translation, target_words),
                RawStorySentence::Plain(sentence) => story_sentence(sentence, String::new(), Vec::new()),
            })
            .filter(|sentence| !sentence.sentence.is_empty())
            .collect();

        if !story.is_empty() {
            return Ok(LessonContent {
                story,
                lesson_focus: LessonFocus {
                    grammar_points: parsed.lesson_focus.grammar_points,
                    vocabulary: parsed.lesson_focus.vocabulary,
                    cultural_notes: parsed.lesson_focus.cultural_notes,
                },
                generated_at: Utc::now(),
            });
        }
    }

    // "sentence | translation" lines
    let story: Vec<StorySentence> = raw
        .lines()
        .filter_map(|line| {
            let (sentence, translation) = strip_bullet(line).split_once('|')?;
            let sentence = sentence.trim();
            (!sentence.is_empty()).then(|| {
                story_sentence(sentence.to_string(), translation.trim().to_string(), Vec::new())
            })
        })
        .collect();

    if story.is_empty() {
        return Err(CourseError::MalformedGeneration(
            "lesson content contained no story sentences".to_string(),
        ));
    }

    let mut vocabulary: Vec<String> = Vec::new();
    for word in story.iter().flat_map(|sentence| &sentence.target_words) {
        if !vocabulary.contains(word) {
            vocabulary.push(word.clone());
        }
    }

    Ok(LessonContent {
        story,
        lesson_focus: LessonFocus {
            vocabulary,
            ..LessonFocus::default()
        },
        generated_at: Utc::now(),
    })
}

// ============================================================================
// Search queries
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawQueries {
    List(Vec<Value>),
    Wrapped {
        #[serde(alias = "search_prompts", alias = "prompts", alias = "search_queries")]
        queries: Vec<Value>,
    },
}

/// Parse up to `max_queries` distinct, non-empty search queries
pub fn parse_search_queries(raw: &str, max_queries: usize) -> CourseResult<Vec<String>> {
    let candidates: Vec<String> = match JsonResponseParser::parse_json_response::<RawQueries>(raw) {
        Ok(RawQueries::List(values)) | Ok(RawQueries::Wrapped { queries: values }) => {
            values.iter().map(value_to_text).collect()
        }
        Err(_) => raw
            .lines()
            .filter(|line| is_bullet(line))
            .map(|line| strip_bullet(line).to_string())
            .collect(),
    };

    let mut queries: Vec<String> = Vec::new();
    for candidate in candidates {
        let query = candidate.trim().trim_matches(|c: char| c == '"' || c == '\'' || c == ',').trim().to_string();
        if !query.is_empty() && !queries.iter().any(|existing| existing.eq_ignore_ascii_case(&query)) {
            queries.push(query);
        }
        if queries.len() == max_queries {
            break;
        }
    }

    if queries.is_empty() {
        return Err(CourseError::MalformedGeneration(
            "no search queries found in response".to_string(),
        ));
    }
    Ok(queries)
}
