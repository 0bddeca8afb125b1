use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::content_store::{AuditReport, ContentStore, run_blocking};
use crate::errors::{CourseError, CourseResult};
use crate::history_store::HistoryStore;
use crate::llm_providers::GenerationOptions;
use crate::llm_service::{LLMService, TextGenerator};
use crate::models::{
    Course, CourseProgress, CourseSummary, CurriculumRequest, DifficultyRecord, HistoryEntry,
    Lesson, LessonId, Module, QuestionRequest,
};
use crate::prompts::{PromptRequest, build_prompt};
use crate::record_store::JsonFileRecordStore;
use crate::response_parser::{parse_curriculum, parse_lesson_content, parse_lesson_expansion};
use crate::video::{TimedTextClient, TranscriptSource, VideoSearch, YouTubeSearchClient};
use crate::video_pipeline::{PipelineReport, PipelineSettings, VideoPipeline, lesson_text};

// Import logging macros
use crate::{log_service_error, log_service_start, log_service_success, log_service_warn};

/// History entries and difficulties replayed into prompts
const CONTEXT_ENTRIES: usize = 5;

/// Result of expanding a lesson. The expansion is committed even when the
/// optional video step fails; `video_error` then says why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionOutcome {
    pub lesson: Lesson,
    pub videos: Option<PipelineReport>,
    pub video_error: Option<String>,
}

#[derive(Clone)]
pub struct CourseService {
    generator: Arc<dyn TextGenerator>,
    store: ContentStore,
    history: HistoryStore,
    pipeline: VideoPipeline,
}

impl CourseService {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        search: Arc<dyn VideoSearch>,
        transcripts: Arc<dyn TranscriptSource>,
        store: ContentStore,
        settings: PipelineSettings,
    ) -> Self {
        let pipeline = VideoPipeline::new(
            generator.clone(),
            search,
            transcripts,
            store.clone(),
            settings,
        );
        Self {
            generator,
            history: HistoryStore::new(store.clone()),
            store,
            pipeline,
        }
    }

    /// Wire the production collaborators described by `config`
    pub fn from_config(config: &Config) -> Self {
        let records = Arc::new(JsonFileRecordStore::new(config.storage.data_root.clone()));
        let store = ContentStore::new(config.storage.course_root.clone(), records);
        Self::new(
            Arc::new(LLMService::from_config(&config.model)),
            Arc::new(YouTubeSearchClient::from_config(&config.video)),
            Arc::new(TimedTextClient::from_config(&config.video)),
            store,
            PipelineSettings::from_config(&config.video),
        )
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    // ========================================================================
    // Curriculum
    // ========================================================================

    /// Generate and persist a 7×10×10 course. A malformed first answer gets one
    /// more try with the compact prompt; nothing is written unless parsing succeeds.
    pub async fn generate_curriculum(&self, request: CurriculumRequest) -> CourseResult<Course> {
        let started = Instant::now();
        let course_id = ContentStore::course_id_for(&request.subject)?;
        log_service_start!("course_service", "generate_curriculum", course = course_id);

        if self.store.course_id_taken(&course_id) {
            return Err(CourseError::CourseExists(course_id));
        }

        let result = async {
            let modules = match self.request_curriculum(&request, false).await {
                Err(CourseError::MalformedGeneration(reason)) => {
                    log_service_warn!(
                        "course_service",
                        "generate_curriculum",
                        format!("first curriculum answer unusable ({}), retrying with compact prompt", reason)
                    );
                    self.request_curriculum(&request, true).await?
                }
                other => other?,
            };
            let store = self.store.clone();
            let CurriculumRequest { subject, background } = request;
            run_blocking(move || store.create_course(&subject, &background, modules)).await
        }
        .await;

        match &result {
            Ok(course) => {
                log_service_success!(
                    "course_service",
                    "generate_curriculum",
                    course = course.id,
                    duration_ms = started.elapsed().as_millis() as u64
                );
            }
            Err(e) => {
                log_service_error!("course_service", "generate_curriculum", course = course_id, error = e);
            }
        }
        result
    }

    async fn request_curriculum(
        &self,
        request: &CurriculumRequest,
        compact: bool,
    ) -> CourseResult<Vec<Module>> {
        let prompt = build_prompt(&PromptRequest::Curriculum {
            subject: &request.subject,
            background: &request.background,
            history_excerpt: None,
            compact,
        })?;
        let raw = self
            .generator
            .complete(&prompt, &GenerationOptions::for_curriculum())
            .await?;
        parse_curriculum(&raw)
    }

    // ========================================================================
    // Lessons
    // ========================================================================

    /// Lesson, course summary and history excerpt needed to prompt about a lesson
    async fn lesson_context(&self, id: &LessonId) -> CourseResult<(Lesson, CourseSummary, String)> {
        let store = self.store.clone();
        let history = self.history.clone();
        let id = id.clone();
        run_blocking(move || {
            let lesson = store.read_lesson(&id)?;
            let course = store.read_course_summary(&id.course)?;
            let excerpt = history.context_excerpt(&id.course, Some(&id), CONTEXT_ENTRIES)?;
            Ok((lesson, course, excerpt))
        })
        .await
    }

    /// Expand a lesson from its overview. A previous expansion is replaced only
    /// once the new one has been fully generated and parsed.
    pub async fn expand_lesson(&self, id: &LessonId, with_videos: bool) -> CourseResult<ExpansionOutcome> {
        let started = Instant::now();
        log_service_start!("course_service", "expand_lesson", lesson = id);

        let (lesson, course, excerpt) = self.lesson_context(id).await?;
        let prompt = build_prompt(&PromptRequest::LessonExpansion {
            subject: &course.name,
            module_title: &lesson.module_title,
            submodule_title: &lesson.submodule_title,
            lesson_title: &lesson.title,
            overview: &lesson.overview,
            history_excerpt: Some(&excerpt),
        })?;

        let expansion = async {
            let raw = self.generator.complete(&prompt, &GenerationOptions::default()).await?;
            parse_lesson_expansion(&raw, &lesson.title, &lesson.overview)
        }
        .await
        .inspect_err(|e| {
            log_service_error!("course_service", "expand_lesson", lesson = id, error = e);
        })?;

        let store = self.store.clone();
        let lesson_id = id.clone();
        let lesson = run_blocking(move || {
            store.write_lesson_expansion(&lesson_id, expansion)?;
            store.read_lesson(&lesson_id)
        })
        .await?;

        let (lesson, videos, video_error) = if with_videos {
            let outcome = self.pipeline.run(&lesson).await;
            let lesson = self.read_lesson(id).await?;
            match outcome {
                Ok(report) => (lesson, Some(report), None),
                Err(e) => {
                    log_service_warn!(
                        "course_service",
                        "expand_lesson",
                        format!("video discovery failed for {}: {}", id, e)
                    );
                    (lesson, None, Some(e.to_string()))
                }
            }
        } else {
            (lesson, None, None)
        };

        log_service_success!(
            "course_service",
            "expand_lesson",
            lesson = id,
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(ExpansionOutcome {
            lesson,
            videos,
            video_error,
        })
    }

    /// Run video discovery for a lesson on its own
    pub async fn attach_videos(&self, id: &LessonId) -> CourseResult<PipelineReport> {
        let started = Instant::now();
        log_service_start!("course_service", "attach_videos", lesson = id);
        let lesson = self.read_lesson(id).await?;
        let report = self.pipeline.run(&lesson).await.inspect_err(|e| {
            log_service_error!("course_service", "attach_videos", lesson = id, error = e);
        })?;
        log_service_success!(
            "course_service",
            "attach_videos",
            lesson = id,
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(report)
    }

    /// Generate the story-based lesson material
    pub async fn generate_lesson_content(&self, id: &LessonId) -> CourseResult<Lesson> {
        let started = Instant::now();
        log_service_start!("course_service", "generate_lesson_content", lesson = id);

        let (lesson, course, _) = self.lesson_context(id).await?;
        let prompt = build_prompt(&PromptRequest::LessonContent {
            subject: &course.name,
            lesson_title: &lesson.title,
            expansion: lesson.expanded.as_ref(),
            overview: &lesson.overview,
        })?;

        let options = GenerationOptions {
            max_tokens: 4096,
            ..GenerationOptions::default()
        };
        let content = async {
            let raw = self.generator.complete(&prompt, &options).await?;
            parse_lesson_content(&raw)
        }
        .await
        .inspect_err(|e| {
            log_service_error!("course_service", "generate_lesson_content", lesson = id, error = e);
        })?;

        let store = self.store.clone();
        let lesson_id = id.clone();
        let lesson = run_blocking(move || {
            store.write_lesson_content(&lesson_id, &content)?;
            store.read_lesson(&lesson_id)
        })
        .await?;
        log_service_success!(
            "course_service",
            "generate_lesson_content",
            lesson = id,
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(lesson)
    }

    // ========================================================================
    // Learner interaction
    // ========================================================================

    /// Answer a learner question with recent history and difficulties as context.
    /// The question is recorded before generation so it survives a failure.
    pub async fn ask_question(&self, course: &str, request: QuestionRequest) -> CourseResult<HistoryEntry> {
        let started = Instant::now();
        log_service_start!("course_service", "ask_question", course = course);

        if request.question.trim().is_empty() {
            return Err(CourseError::Validation("question must not be empty".to_string()));
        }
        let lesson_id = request
            .lesson
            .as_ref()
            .map(|position| LessonId::new(course, position.module, position.submodule, position.lesson));

        let store = self.store.clone();
        let history = self.history.clone();
        let course_id = course.to_string();
        let question = request.question.clone();
        let scope = lesson_id.clone();
        let (summary, lesson, excerpt) = run_blocking(move || {
            let summary = store.read_course_summary(&course_id)?;
            let lesson = match &scope {
                Some(id) => Some(store.read_lesson(id)?),
                None => None,
            };
            history.record_question(&course_id, &question, scope.clone())?;
            let excerpt = history.context_excerpt(&course_id, scope.as_ref(), CONTEXT_ENTRIES)?;
            Ok((summary, lesson, excerpt))
        })
        .await?;

        let lesson_context = lesson.as_ref().map(lesson_text);
        let prompt = build_prompt(&PromptRequest::Question {
            subject: &summary.name,
            question: &request.question,
            lesson_context: lesson_context.as_deref(),
            history_excerpt: Some(&excerpt),
        })?;

        let answer = self
            .generator
            .complete(&prompt, &GenerationOptions::default())
            .await
            .inspect_err(|e| {
                log_service_error!("course_service", "ask_question", course = course, error = e);
            })?;

        let history = self.history.clone();
        let course_id = course.to_string();
        let question = request.question;
        let entry = run_blocking(move || {
            history.record_query(&course_id, &question, answer.trim(), lesson_id)
        })
        .await?;
        log_service_success!(
            "course_service",
            "ask_question",
            course = course,
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(entry)
    }

    pub async fn record_difficulty(&self, id: &LessonId, text: &str) -> CourseResult<DifficultyRecord> {
        let history = self.history.clone();
        let id = id.clone();
        let text = text.to_string();
        run_blocking(move || history.record_difficulty(&id, &text)).await
    }

    pub async fn difficulties(&self, id: &LessonId) -> CourseResult<Vec<DifficultyRecord>> {
        let store = self.store.clone();
        let history = self.history.clone();
        let id = id.clone();
        run_blocking(move || {
            store.read_lesson(&id)?;
            history.difficulties_for(&id)
        })
        .await
    }

    /// Most recent first
    pub async fn history(&self, course: &str, limit: usize) -> CourseResult<Vec<HistoryEntry>> {
        let history = self.history.clone();
        let course = course.to_string();
        run_blocking(move || history.get_context(&course, limit)).await
    }

    // ========================================================================
    // Reads and progress
    // ========================================================================

    pub async fn list_courses(&self) -> CourseResult<Vec<CourseSummary>> {
        let store = self.store.clone();
        run_blocking(move || store.list_courses()).await
    }

    pub async fn read_course(&self, course: &str) -> CourseResult<Course> {
        let store = self.store.clone();
        let course = course.to_string();
        run_blocking(move || store.read_course(&course)).await
    }

    pub async fn read_lesson(&self, id: &LessonId) -> CourseResult<Lesson> {
        let store = self.store.clone();
        let id = id.clone();
        run_blocking(move || store.read_lesson(&id)).await
    }

    pub async fn mark_lesson_completed(&self, id: &LessonId, completed: bool) -> CourseResult<Lesson> {
        let store = self.store.clone();
        let id = id.clone();
        run_blocking(move || store.mark_lesson_completed(&id, completed)).await
    }

    pub async fn course_progress(&self, course: &str) -> CourseResult<CourseProgress> {
        let store = self.store.clone();
        let course = course.to_string();
        run_blocking(move || store.course_progress(&course)).await
    }

    pub async fn audit_course(&self, course: &str) -> CourseResult<AuditReport> {
        let store = self.store.clone();
        let course = course.to_string();
        run_blocking(move || store.audit_course(&course)).await
    }
}
