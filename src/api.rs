use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    content_store::AuditReport,
    course_service::{CourseService, ExpansionOutcome},
    errors::ErrorContext,
    models::*,
    video_pipeline::PipelineReport,
};

// Import logging macros
use crate::{log_api_error, log_api_start, log_api_success, log_api_warn};

const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Clone)]
pub struct AppState {
    pub course_service: CourseService,
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<()>>)>;

/// `/api/courses/:course/modules/:module/submodules/:submodule/lessons/:lesson`
#[derive(Debug, Deserialize)]
pub struct LessonPath {
    pub course: String,
    pub module: u8,
    pub submodule: u8,
    pub lesson: u8,
}

impl LessonPath {
    fn id(&self) -> LessonId {
        LessonId::new(self.course.clone(), self.module, self.submodule, self.lesson)
    }
}

#[derive(Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

// Course endpoints
pub async fn create_course(
    State(state): State<AppState>,
    Json(request): Json<CurriculumRequest>,
) -> ApiResult<Course> {
    info!(
        subject = %request.subject,
        background = %request.background,
        "Generating course curriculum"
    );
    let subject = request.subject.clone();

    match state.course_service.generate_curriculum(request).await {
        Ok(course) => {
            log_api_success!("create_course", course = course.id, "curriculum generated");
            Ok(Json(ApiResponse::success(course)))
        }
        Err(e) => {
            let context = ErrorContext::new("create_course", "course").with_id(&subject);
            Err(e.to_response_with_context(context))
        }
    }
}

pub async fn list_courses(State(state): State<AppState>) -> ApiResult<Vec<CourseSummary>> {
    debug!("Listing courses");

    match state.course_service.list_courses().await {
        Ok(courses) => {
            log_api_success!("list_courses", count = courses.len(), "courses listed");
            Ok(Json(ApiResponse::success(courses)))
        }
        Err(e) => Err(e.to_response_with_context(ErrorContext::new("list_courses", "course"))),
    }
}

pub async fn get_course(
    State(state): State<AppState>,
    Path(course): Path<String>,
) -> ApiResult<Course> {
    log_api_start!("get_course", course = course);

    match state.course_service.read_course(&course).await {
        Ok(data) => {
            log_api_success!("get_course", course = course, "course retrieved");
            Ok(Json(ApiResponse::success(data)))
        }
        Err(e) => {
            let context = ErrorContext::new("get_course", "course").with_id(&course);
            Err(e.to_response_with_context(context))
        }
    }
}

pub async fn get_course_progress(
    State(state): State<AppState>,
    Path(course): Path<String>,
) -> ApiResult<CourseProgress> {
    log_api_start!("get_course_progress", course = course);

    state
        .course_service
        .course_progress(&course)
        .await
        .map(|progress| Json(ApiResponse::success(progress)))
        .map_err(|e| {
            let context = ErrorContext::new("get_course_progress", "course").with_id(&course);
            e.to_response_with_context(context)
        })
}

pub async fn audit_course(
    State(state): State<AppState>,
    Path(course): Path<String>,
) -> ApiResult<AuditReport> {
    log_api_start!("audit_course", course = course);

    match state.course_service.audit_course(&course).await {
        Ok(report) => {
            if !report.is_healthy() {
                log_api_warn!(
                    "audit_course",
                    format!("{} has {} structural issues", course, report.issues.len())
                );
            }
            Ok(Json(ApiResponse::success(report)))
        }
        Err(e) => {
            let context = ErrorContext::new("audit_course", "course").with_id(&course);
            Err(e.to_response_with_context(context))
        }
    }
}

// History endpoints
pub async fn get_history(
    State(state): State<AppState>,
    Path(course): Path<String>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Vec<HistoryEntry>> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    debug!(course = %course, limit, "Getting learner history");

    match state.course_service.history(&course, limit).await {
        Ok(entries) => {
            log_api_success!("get_history", count = entries.len(), "history retrieved");
            Ok(Json(ApiResponse::success(entries)))
        }
        Err(e) => {
            let context = ErrorContext::new("get_history", "course").with_id(&course);
            Err(e.to_response_with_context(context))
        }
    }
}

pub async fn ask_question(
    State(state): State<AppState>,
    Path(course): Path<String>,
    Json(request): Json<QuestionRequest>,
) -> ApiResult<HistoryEntry> {
    log_api_start!("ask_question", course = course);

    match state.course_service.ask_question(&course, request).await {
        Ok(entry) => {
            log_api_success!("ask_question", course = course, "question answered");
            Ok(Json(ApiResponse::success(entry)))
        }
        Err(e) => {
            log_api_error!("ask_question", course = course, error = e, "question could not be answered");
            let context = ErrorContext::new("ask_question", "course").with_id(&course);
            Err(e.to_response_with_context(context))
        }
    }
}

// Lesson endpoints
pub async fn get_lesson(
    State(state): State<AppState>,
    Path(path): Path<LessonPath>,
) -> ApiResult<Lesson> {
    let id = path.id();
    log_api_start!("get_lesson", lesson = id);

    match state.course_service.read_lesson(&id).await {
        Ok(lesson) => {
            log_api_success!("get_lesson", lesson = id, "lesson retrieved");
            Ok(Json(ApiResponse::success(lesson)))
        }
        Err(e) => {
            let context = ErrorContext::new("get_lesson", "lesson").with_id(&id.to_string());
            Err(e.to_response_with_context(context))
        }
    }
}

pub async fn expand_lesson(
    State(state): State<AppState>,
    Path(path): Path<LessonPath>,
    Json(request): Json<ExpandLessonRequest>,
) -> ApiResult<ExpansionOutcome> {
    let id = path.id();
    info!(lesson = %id, with_videos = request.with_videos, "Expanding lesson");

    match state.course_service.expand_lesson(&id, request.with_videos).await {
        Ok(outcome) => {
            if let Some(video_error) = &outcome.video_error {
                log_api_warn!("expand_lesson", lesson = id, format!("expanded without videos: {}", video_error));
            }
            log_api_success!("expand_lesson", lesson = id, "lesson expanded");
            Ok(Json(ApiResponse::success(outcome)))
        }
        Err(e) => {
            log_api_error!("expand_lesson", lesson = id, error = e, "lesson expansion failed");
            let context = ErrorContext::new("expand_lesson", "lesson").with_id(&id.to_string());
            Err(e.to_response_with_context(context))
        }
    }
}

pub async fn generate_lesson_content(
    State(state): State<AppState>,
    Path(path): Path<LessonPath>,
) -> ApiResult<Lesson> {
    let id = path.id();
    log_api_start!("generate_lesson_content", lesson = id);

    match state.course_service.generate_lesson_content(&id).await {
        Ok(lesson) => {
            log_api_success!("generate_lesson_content", lesson = id, "lesson content generated");
            Ok(Json(ApiResponse::success(lesson)))
        }
        Err(e) => {
            log_api_error!("generate_lesson_content", lesson = id, error = e, "lesson content failed");
            let context = ErrorContext::new("generate_lesson_content", "lesson").with_id(&id.to_string());
            Err(e.to_response_with_context(context))
        }
    }
}

pub async fn attach_videos(
    State(state): State<AppState>,
    Path(path): Path<LessonPath>,
) -> ApiResult<PipelineReport> {
    let id = path.id();
    log_api_start!("attach_videos", lesson = id);

    match state.course_service.attach_videos(&id).await {
        Ok(report) => {
            info!(
                lesson = %id,
                video_count = report.videos.len(),
                skipped_count = report.skipped.len(),
                "Video discovery finished"
            );
            Ok(Json(ApiResponse::success(report)))
        }
        Err(e) => {
            let context = ErrorContext::new("attach_videos", "lesson").with_id(&id.to_string());
            Err(e.to_response_with_context(context))
        }
    }
}

pub async fn get_difficulties(
    State(state): State<AppState>,
    Path(path): Path<LessonPath>,
) -> ApiResult<Vec<DifficultyRecord>> {
    let id = path.id();
    log_api_start!("get_difficulties", lesson = id);

    state
        .course_service
        .difficulties(&id)
        .await
        .map(|records| Json(ApiResponse::success(records)))
        .map_err(|e| {
            let context = ErrorContext::new("get_difficulties", "lesson").with_id(&id.to_string());
            e.to_response_with_context(context)
        })
}

pub async fn record_difficulty(
    State(state): State<AppState>,
    Path(path): Path<LessonPath>,
    Json(request): Json<DifficultyRequest>,
) -> ApiResult<DifficultyRecord> {
    let id = path.id();
    log_api_start!("record_difficulty", lesson = id);

    match state.course_service.record_difficulty(&id, &request.text).await {
        Ok(record) => {
            log_api_success!("record_difficulty", lesson = id, "difficulty recorded");
            Ok(Json(ApiResponse::success(record)))
        }
        Err(e) => {
            let context = ErrorContext::new("record_difficulty", "lesson").with_id(&id.to_string());
            Err(e.to_response_with_context(context))
        }
    }
}

pub async fn complete_lesson(
    State(state): State<AppState>,
    Path(path): Path<LessonPath>,
    Json(request): Json<CompletionRequest>,
) -> ApiResult<Lesson> {
    let id = path.id();
    info!(lesson = %id, completed = request.completed, "Updating lesson completion");

    match state.course_service.mark_lesson_completed(&id, request.completed).await {
        Ok(lesson) => {
            log_api_success!("complete_lesson", lesson = id, "completion updated");
            Ok(Json(ApiResponse::success(lesson)))
        }
        Err(e) => {
            let context = ErrorContext::new("complete_lesson", "lesson").with_id(&id.to_string());
            Err(e.to_response_with_context(context))
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    const LESSON: &str = "/api/courses/:course/modules/:module/submodules/:submodule/lessons/:lesson";

    Router::new()
        // Course routes
        .route("/api/courses", post(create_course))
        .route("/api/courses", get(list_courses))
        .route("/api/courses/:course", get(get_course))
        .route("/api/courses/:course/progress", get(get_course_progress))
        .route("/api/courses/:course/audit", get(audit_course))

        // Learner history routes
        .route("/api/courses/:course/history", get(get_history))
        .route("/api/courses/:course/questions", post(ask_question))

        // Lesson routes
        .route(LESSON, get(get_lesson))
        .route(&format!("{LESSON}/expand"), post(expand_lesson))
        .route(&format!("{LESSON}/content"), post(generate_lesson_content))
        .route(&format!("{LESSON}/videos"), post(attach_videos))
        .route(&format!("{LESSON}/difficulties"), get(get_difficulties).post(record_difficulty))
        .route(&format!("{LESSON}/complete"), post(complete_lesson))

        .with_state(state)
}
