#![allow(dead_code)]

use async_trait::async_trait;
use course_generator::{
    ContentStore, CourseError, CourseResult, CourseService, GenerationOptions, JsonFileRecordStore,
    PipelineSettings, TextGenerator, TranscriptSegment, TranscriptSource, VideoCandidate, VideoSearch,
    prompts::Prompt,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// What a prompt is asking for, recognised from its system instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Curriculum,
    Expansion,
    Content,
    Queries,
    Summary,
    Relevance,
    Question,
}

pub fn prompt_kind(prompt: &Prompt) -> PromptKind {
    let system = prompt.system.as_str();
    if system.contains("lesson plans") {
        PromptKind::Expansion
    } else if system.contains("curriculum designer") {
        PromptKind::Curriculum
    } else if system.contains("graded reading") {
        PromptKind::Content
    } else if system.contains("search prompts") {
        PromptKind::Queries
    } else if system.contains("summarizer") {
        PromptKind::Summary
    } else if system.contains("curator") {
        PromptKind::Relevance
    } else {
        PromptKind::Question
    }
}

type Script = Box<dyn Fn(PromptKind, &Prompt, usize) -> CourseResult<String> + Send + Sync>;

/// Text generator answering from a closure; records every prompt it sees
pub struct ScriptedGenerator {
    script: Script,
    calls: Mutex<Vec<Prompt>>,
}

impl ScriptedGenerator {
    pub fn new(script: impl Fn(PromptKind, &Prompt, usize) -> CourseResult<String> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answers every prompt kind with a well-formed response
    pub fn happy() -> Self {
        Self::new(|kind, _, _| Ok(happy_response(kind)))
    }

    pub fn unavailable() -> Self {
        Self::new(|_, _, _| Err(CourseError::GenerationUnavailable("connection refused".to_string())))
    }

    pub fn calls(&self) -> Vec<Prompt> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, kind: PromptKind) -> Vec<Prompt> {
        self.calls().into_iter().filter(|p| prompt_kind(p) == kind).collect()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, prompt: &Prompt, _options: &GenerationOptions) -> CourseResult<String> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(prompt.clone());
            calls.len() - 1
        };
        (self.script)(prompt_kind(prompt), prompt, index)
    }
}

pub fn happy_response(kind: PromptKind) -> String {
    match kind {
        PromptKind::Curriculum => curriculum_json("Korean").to_string(),
        PromptKind::Expansion => expansion_json().to_string(),
        PromptKind::Content => lesson_content_json().to_string(),
        PromptKind::Queries => r#"["korean vowels basics", "hangul pronunciation"]"#.to_string(),
        PromptKind::Summary => "Covers the basic vowels with clear pronunciation drills.".to_string(),
        PromptKind::Relevance => "Shows every vowel from the lesson spoken slowly.".to_string(),
        PromptKind::Question => "Use 안녕하세요 with people you do not know well.".to_string(),
    }
}

/// A complete 7×10×10 curriculum in the shape the model is asked for
pub fn curriculum_json(subject: &str) -> Value {
    let modules: Vec<Value> = (1..=7)
        .map(|m| {
            let submodules: Vec<Value> = (1..=10)
                .map(|s| {
                    let lessons: Vec<Value> = (1..=10)
                        .map(|l| {
                            json!({
                                "lesson_title": format!("{} Lesson {}.{}.{}", subject, m, s, l),
                                "lesson_overview": format!("Overview of lesson {}.{}.{}", m, s, l),
                            })
                        })
                        .collect();
                    json!({ "submodule_title": format!("Submodule {}.{}", m, s), "lessons": lessons })
                })
                .collect();
            json!({ "module_title": format!("Module {} Topic", m), "submodules": submodules })
        })
        .collect();
    json!({ "course": subject, "modules": modules })
}

pub fn expansion_json() -> Value {
    json!({
        "lesson_title": "Vowels",
        "learning_objectives": ["Read the ten basic vowels", "Pronounce ㅏ and ㅓ"],
        "key_concepts": ["Vertical and horizontal vowels"],
        "grammar_points": [],
        "vocabulary": ["아이 (child)", "오이 (cucumber)"],
        "practice_exercises": ["Write each vowel five times"],
        "cultural_context": "Hangul was created in the 15th century.",
        "detailed_content": "Korean vowels are written with short strokes around a long line."
    })
}

pub fn lesson_content_json() -> Value {
    json!({
        "story": [
            {"sentence": "__아이__가 웃어요.", "translation": "The child laughs.", "target_words": ["아이"]},
            {"sentence": "__오이__를 먹어요.", "translation": "I eat a cucumber."}
        ],
        "lesson_focus": {
            "grammar_points": ["Subject marker 가"],
            "vocabulary": ["아이", "오이"],
            "cultural_notes": "Cucumbers are a common side dish."
        }
    })
}

/// Video search returning canned hits per query
#[derive(Default)]
pub struct FakeSearch {
    pub results: HashMap<String, Vec<VideoCandidate>>,
    pub failing: bool,
    pub queries: Mutex<Vec<String>>,
}

impl FakeSearch {
    /// Every query yields the same pair of videos
    pub fn with_videos(ids: &[&str]) -> Self {
        let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        let mut search = Self::default();
        search.results.insert("*".to_string(), ids.iter().map(|id| candidate(id, "*")).collect());
        search
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }
}

pub fn candidate(video_id: &str, query: &str) -> VideoCandidate {
    VideoCandidate {
        video_id: video_id.to_string(),
        title: format!("Video {}", video_id),
        channel: "Talk To Me In Korean".to_string(),
        search_query: query.to_string(),
    }
}

#[async_trait]
impl VideoSearch for FakeSearch {
    async fn search(&self, query: &str, max_results: u32) -> CourseResult<Vec<VideoCandidate>> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.failing {
            return Err(CourseError::ExternalDataUnavailable("quota exceeded".to_string()));
        }
        let hits = self
            .results
            .get(query)
            .or_else(|| self.results.get("*"))
            .cloned()
            .unwrap_or_default();
        Ok(hits
            .into_iter()
            .take(max_results as usize)
            .map(|mut hit| {
                hit.search_query = query.to_string();
                hit
            })
            .collect())
    }
}

/// Transcript source with a transcript for every video except the listed ones
#[derive(Default)]
pub struct FakeTranscripts {
    pub missing: Vec<String>,
}

impl FakeTranscripts {
    pub fn missing(ids: &[&str]) -> Self {
        Self {
            missing: ids.iter().map(|id| id.to_string()).collect(),
        }
    }
}

#[async_trait]
impl TranscriptSource for FakeTranscripts {
    async fn fetch(&self, video_id: &str) -> CourseResult<Vec<TranscriptSegment>> {
        if self.missing.iter().any(|id| id == video_id) {
            return Err(CourseError::ExternalDataUnavailable(format!(
                "no transcript available for video {}",
                video_id
            )));
        }
        Ok(vec![
            TranscriptSegment {
                start: 0.0,
                duration: 2.0,
                text: format!("Transcript of {}.", video_id),
            },
            TranscriptSegment {
                start: 2.0,
                duration: 3.0,
                text: "Repeat after me.".to_string(),
            },
        ])
    }
}

/// Temporary course and data roots; removed when dropped
pub struct TestDirs {
    pub root: TempDir,
}

impl TestDirs {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    pub fn store(&self) -> ContentStore {
        let records = Arc::new(JsonFileRecordStore::new(self.root.path().join("data")));
        ContentStore::new(self.root.path().join("courses"), records)
    }
}

pub fn settings() -> PipelineSettings {
    PipelineSettings {
        max_queries: 3,
        results_per_query: 2,
    }
}

pub fn service_with(
    dirs: &TestDirs,
    generator: Arc<ScriptedGenerator>,
    search: Arc<FakeSearch>,
    transcripts: Arc<FakeTranscripts>,
) -> CourseService {
    CourseService::new(generator, search, transcripts, dirs.store(), settings())
}

pub fn happy_service(dirs: &TestDirs) -> (CourseService, Arc<ScriptedGenerator>) {
    let generator = Arc::new(ScriptedGenerator::happy());
    let service = service_with(
        dirs,
        generator.clone(),
        Arc::new(FakeSearch::with_videos(&["vid001", "vid002"])),
        Arc::new(FakeTranscripts::default()),
    );
    (service, generator)
}
