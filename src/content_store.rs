//! Filesystem-backed system of record for courses.
//!
//! Layout under the course root:
//!
//! ```text
//! <course>/course.json
//! <course>/module_01_<title>/module.json
//! <course>/module_01_<title>/submodule_01_<title>/submodule.json
//! <course>/module_01_<title>/submodule_01_<title>/lesson_01_<title>/
//!     lesson.json  overview.txt  expanded_lesson.json  lesson_content.json
//!     videos.json  video_transcripts/<id>.txt  video_summaries/<id>.txt
//! ```
//!
//! Directories are found by their position prefix, never by title. Every file
//! is written to a temporary file in the same directory and renamed into place.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::NamedTempFile;
use tracing::warn;
use uuid::Uuid;

use crate::errors::{CourseError, CourseResult};
use crate::models::{
    Course, CourseProgress, CourseSummary, DifficultyRecord, ExpandedContent, HistoryEntry,
    LESSONS_PER_SUBMODULE, Lesson, LessonContent, LessonContextRecord, LessonId, LessonOutline,
    MODULES_PER_COURSE, Module, ModuleProgress, QueryRecord, SUBMODULES_PER_MODULE, Submodule,
    VideoReference,
};
use crate::record_store::{RecordKind, RecordStore};

// Import logging macros
use crate::log_store_operation;

const COURSE_FILE: &str = "course.json";
const MODULE_FILE: &str = "module.json";
const SUBMODULE_FILE: &str = "submodule.json";
const LESSON_FILE: &str = "lesson.json";
const OVERVIEW_FILE: &str = "overview.txt";
const EXPANDED_FILE: &str = "expanded_lesson.json";
const CONTENT_FILE: &str = "lesson_content.json";
const VIDEOS_FILE: &str = "videos.json";
const TRANSCRIPTS_DIR: &str = "video_transcripts";
const SUMMARIES_DIR: &str = "video_summaries";
const STAGING_PREFIX: &str = ".staging-";

const MAX_SAFE_NAME_CHARS: usize = 50;

/// Filesystem-safe form of a title: letters, digits, `-` and `_` survive,
/// spaces become `_`, everything else is dropped; at most 50 characters.
pub fn safe_name(text: &str) -> String {
    let kept: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    kept.trim()
        .replace(' ', "_")
        .chars()
        .take(MAX_SAFE_NAME_CHARS)
        .collect()
}

fn node_dir_name(kind: &str, position: u8, title: &str) -> String {
    let title = safe_name(title);
    if title.is_empty() {
        format!("{}_{:02}", kind, position)
    } else {
        format!("{}_{:02}_{}", kind, position, title)
    }
}

/// Position encoded in a `<kind>_NN[_title]` directory name
fn position_from_dir_name(kind: &str, name: &str) -> Option<u8> {
    let rest = name.strip_prefix(kind)?.strip_prefix('_')?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    let tail = &rest[digits.len()..];
    if digits.is_empty() || !(tail.is_empty() || tail.starts_with('_')) {
        return None;
    }
    digits.parse().ok()
}

/// Run filesystem work on tokio's blocking pool instead of an async worker
pub async fn run_blocking<T, F>(work: F) -> CourseResult<T>
where
    F: FnOnce() -> CourseResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CourseError::StorageTask(e.to_string()))?
}

pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> CourseResult<()> {
    let started = Instant::now();
    let dir = path.parent().ok_or_else(|| {
        CourseError::Validation(format!("'{}' has no parent directory", path.display()))
    })?;
    fs::create_dir_all(dir).map_err(|e| CourseError::filesystem(dir, e))?;

    let mut temp = NamedTempFile::new_in(dir).map_err(|e| CourseError::filesystem(dir, e))?;
    temp.write_all(contents)
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| CourseError::filesystem(path, e))?;
    temp.persist(path)
        .map_err(|e| CourseError::filesystem(path, e.error))?;

    log_store_operation!(
        debug,
        "write_file",
        path = path,
        duration_ms = started.elapsed().as_millis() as u64
    );
    Ok(())
}

pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> CourseResult<()> {
    let json = serde_json::to_vec_pretty(value).map_err(|e| CourseError::serialization(path, e))?;
    write_atomic(path, &json)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> CourseResult<T> {
    let raw = fs::read_to_string(path).map_err(|e| CourseError::filesystem(path, e))?;
    serde_json::from_str(&raw).map_err(|e| CourseError::serialization(path, e))
}

fn read_json_optional<T: DeserializeOwned>(path: &Path) -> CourseResult<Option<T>> {
    match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| CourseError::serialization(path, e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CourseError::filesystem(path, e)),
    }
}

fn read_text(path: &Path) -> CourseResult<String> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(CourseError::filesystem(path, e)),
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CourseManifest {
    id: String,
    name: String,
    #[serde(default)]
    background: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NodeManifest {
    position: u8,
    title: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct LessonManifest {
    position: u8,
    title: String,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
}

struct LessonPaths {
    module: PathBuf,
    submodule: PathBuf,
    lesson: PathBuf,
}

/// Findings of an offline consistency check of one course tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub course: String,
    pub modules: usize,
    pub submodules: usize,
    pub lessons: usize,
    pub expanded_lessons: usize,
    pub lessons_with_content: usize,
    pub completed_lessons: usize,
    pub videos: usize,
    pub issues: Vec<String>,
}

impl AuditReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Clone)]
pub struct ContentStore {
    course_root: PathBuf,
    records: Arc<dyn RecordStore>,
}

impl ContentStore {
    pub fn new(course_root: impl Into<PathBuf>, records: Arc<dyn RecordStore>) -> Self {
        Self {
            course_root: course_root.into(),
            records,
        }
    }

    pub fn course_root(&self) -> &Path {
        &self.course_root
    }

    /// Course id derived from the subject the learner typed
    pub fn course_id_for(subject: &str) -> CourseResult<String> {
        let id = safe_name(subject);
        if id.is_empty() {
            return Err(CourseError::Validation(format!(
                "subject '{}' does not yield a usable course name",
                subject
            )));
        }
        Ok(id)
    }

    fn course_dir(&self, course: &str) -> CourseResult<PathBuf> {
        if course.is_empty() || course.starts_with('.') || course.contains(['/', '\\']) {
            return Err(CourseError::Validation(format!("invalid course id '{}'", course)));
        }
        let dir = self.course_root.join(course);
        if !dir.join(COURSE_FILE).is_file() {
            return Err(CourseError::NotFound(format!("course '{}'", course)));
        }
        Ok(dir)
    }

    /// Whether anything already occupies the course's directory, manifest or not
    pub fn course_id_taken(&self, course: &str) -> bool {
        self.course_root.join(course).exists()
    }

    /// `(position, path)` of every `<kind>_NN…` directory under `dir`, ordered by position
    fn child_dirs(dir: &Path, kind: &str) -> CourseResult<Vec<(u8, PathBuf)>> {
        let entries = fs::read_dir(dir).map_err(|e| CourseError::filesystem(dir, e))?;
        let mut children = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CourseError::filesystem(dir, e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if let Some(position) = position_from_dir_name(kind, &name.to_string_lossy()) {
                children.push((position, path));
            }
        }
        children.sort_by_key(|(position, _)| *position);
        Ok(children)
    }

    fn find_child(dir: &Path, kind: &str, position: u8, label: &str) -> CourseResult<PathBuf> {
        Self::child_dirs(dir, kind)?
            .into_iter()
            .find(|(found, _)| *found == position)
            .map(|(_, path)| path)
            .ok_or_else(|| CourseError::NotFound(format!("{} {} in {}", kind, position, label)))
    }

    fn lesson_paths(&self, id: &LessonId) -> CourseResult<LessonPaths> {
        let course_dir = self.course_dir(&id.course)?;
        let label = format!("course '{}'", id.course);
        let module = Self::find_child(&course_dir, "module", id.module, &label)?;
        let submodule = Self::find_child(&module, "submodule", id.submodule, &label)?;
        let lesson = Self::find_child(&submodule, "lesson", id.lesson, &label)?;
        Ok(LessonPaths {
            module,
            submodule,
            lesson,
        })
    }

    fn validate_tree(modules: &[Module]) -> CourseResult<()> {
        let contiguous = |positions: Vec<u8>, expected: usize| {
            positions.len() == expected
                && positions.iter().enumerate().all(|(index, p)| *p as usize == index + 1)
        };
        if !contiguous(modules.iter().map(|m| m.position).collect(), MODULES_PER_COURSE) {
            return Err(CourseError::Validation(format!(
                "a course needs modules 1..={}",
                MODULES_PER_COURSE
            )));
        }
        for module in modules {
            if !contiguous(module.submodules.iter().map(|s| s.position).collect(), SUBMODULES_PER_MODULE) {
                return Err(CourseError::Validation(format!(
                    "module {} needs submodules 1..={}",
                    module.position, SUBMODULES_PER_MODULE
                )));
            }
            for submodule in &module.submodules {
                if !contiguous(submodule.lessons.iter().map(|l| l.position).collect(), LESSONS_PER_SUBMODULE) {
                    return Err(CourseError::Validation(format!(
                        "submodule {}.{} needs lessons 1..={}",
                        module.position, submodule.position, LESSONS_PER_SUBMODULE
                    )));
                }
            }
        }
        Ok(())
    }

    /// Persist a new course. The tree is written to a hidden staging directory
    /// and renamed into place, so a failure leaves nothing behind.
    pub fn create_course(&self, subject: &str, background: &str, modules: Vec<Module>) -> CourseResult<Course> {
        let started = Instant::now();
        let id = Self::course_id_for(subject)?;
        Self::validate_tree(&modules)?;

        if self.course_id_taken(&id) {
            return Err(CourseError::CourseExists(id));
        }
        let target = self.course_root.join(&id);

        let course = Course {
            id: id.clone(),
            name: subject.trim().to_string(),
            background: background.trim().to_string(),
            created_at: Utc::now(),
            modules: modules
                .into_iter()
                .map(|mut module| {
                    for lesson in module.submodules.iter_mut().flat_map(|s| s.lessons.iter_mut()) {
                        lesson.expanded = false;
                        lesson.completed = false;
                    }
                    module
                })
                .collect(),
        };

        let staging = self
            .course_root
            .join(format!("{}{}", STAGING_PREFIX, Uuid::new_v4()));
        fs::create_dir_all(&staging).map_err(|e| CourseError::filesystem(&staging, e))?;

        let committed = Self::write_tree(&staging, &course).and_then(|_| {
            fs::rename(&staging, &target).map_err(|e| {
                if target.exists() {
                    CourseError::CourseExists(id.clone())
                } else {
                    CourseError::filesystem(&target, e)
                }
            })
        });

        if let Err(e) = committed {
            log_store_operation!(error, "create_course", error = e);
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                warn!(path = %staging.display(), error = %cleanup, "Failed to remove staging directory");
            }
            return Err(e);
        }

        log_store_operation!(
            debug,
            "create_course",
            path = target,
            duration_ms = started.elapsed().as_millis() as u64
        );
        log_store_operation!(info, "create_course", format!("course '{}' committed", course.id));
        Ok(course)
    }

    fn write_tree(root: &Path, course: &Course) -> CourseResult<()> {
        write_json_atomic(
            &root.join(COURSE_FILE),
            &CourseManifest {
                id: course.id.clone(),
                name: course.name.clone(),
                background: course.background.clone(),
                created_at: course.created_at,
            },
        )?;

        for module in &course.modules {
            let module_dir = root.join(node_dir_name("module", module.position, &module.title));
            write_json_atomic(
                &module_dir.join(MODULE_FILE),
                &NodeManifest {
                    position: module.position,
                    title: module.title.clone(),
                },
            )?;

            for submodule in &module.submodules {
                let submodule_dir =
                    module_dir.join(node_dir_name("submodule", submodule.position, &submodule.title));
                write_json_atomic(
                    &submodule_dir.join(SUBMODULE_FILE),
                    &NodeManifest {
                        position: submodule.position,
                        title: submodule.title.clone(),
                    },
                )?;

                for lesson in &submodule.lessons {
                    let lesson_dir =
                        submodule_dir.join(node_dir_name("lesson", lesson.position, &lesson.title));
                    write_json_atomic(
                        &lesson_dir.join(LESSON_FILE),
                        &LessonManifest {
                            position: lesson.position,
                            title: lesson.title.clone(),
                            completed: false,
                            completed_at: None,
                        },
                    )?;
                    write_atomic(&lesson_dir.join(OVERVIEW_FILE), lesson.overview.as_bytes())?;
                }
            }
        }
        Ok(())
    }

    pub fn list_courses(&self) -> CourseResult<Vec<CourseSummary>> {
        let entries = match fs::read_dir(&self.course_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CourseError::filesystem(&self.course_root, e)),
        };

        let mut courses = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CourseError::filesystem(&self.course_root, e))?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let manifest_path = entry.path().join(COURSE_FILE);
            if !manifest_path.is_file() {
                continue;
            }
            let manifest: CourseManifest = read_json(&manifest_path)?;
            courses.push(CourseSummary {
                id: manifest.id,
                name: manifest.name,
                background: manifest.background,
                created_at: manifest.created_at,
            });
        }
        courses.sort_by(|a, b| a.id.cmp(&b.id));

        log_store_operation!(debug, "list_courses", count = courses.len());
        Ok(courses)
    }

    pub fn read_course_summary(&self, course: &str) -> CourseResult<CourseSummary> {
        let manifest: CourseManifest = read_json(&self.course_dir(course)?.join(COURSE_FILE))?;
        Ok(CourseSummary {
            id: manifest.id,
            name: manifest.name,
            background: manifest.background,
            created_at: manifest.created_at,
        })
    }

    pub fn read_course(&self, course: &str) -> CourseResult<Course> {
        let course_dir = self.course_dir(course)?;
        let manifest: CourseManifest = read_json(&course_dir.join(COURSE_FILE))?;

        let mut modules = Vec::new();
        for (_, module_dir) in Self::child_dirs(&course_dir, "module")? {
            let module_manifest: NodeManifest = read_json(&module_dir.join(MODULE_FILE))?;
            let mut submodules = Vec::new();
            for (_, submodule_dir) in Self::child_dirs(&module_dir, "submodule")? {
                let submodule_manifest: NodeManifest = read_json(&submodule_dir.join(SUBMODULE_FILE))?;
                let lessons = Self::child_dirs(&submodule_dir, "lesson")?
                    .into_iter()
                    .map(|(_, lesson_dir)| Self::read_outline(&lesson_dir))
                    .collect::<CourseResult<Vec<_>>>()?;
                submodules.push(Submodule {
                    position: submodule_manifest.position,
                    title: submodule_manifest.title,
                    lessons,
                });
            }
            modules.push(Module {
                position: module_manifest.position,
                title: module_manifest.title,
                submodules,
            });
        }

        Ok(Course {
            id: manifest.id,
            name: manifest.name,
            background: manifest.background,
            created_at: manifest.created_at,
            modules,
        })
    }

    fn read_outline(lesson_dir: &Path) -> CourseResult<LessonOutline> {
        let manifest: LessonManifest = read_json(&lesson_dir.join(LESSON_FILE))?;
        Ok(LessonOutline {
            position: manifest.position,
            title: manifest.title,
            overview: read_text(&lesson_dir.join(OVERVIEW_FILE))?.trim().to_string(),
            expanded: lesson_dir.join(EXPANDED_FILE).is_file(),
            completed: manifest.completed,
        })
    }

    pub fn read_lesson(&self, id: &LessonId) -> CourseResult<Lesson> {
        let paths = self.lesson_paths(id)?;
        let module: NodeManifest = read_json(&paths.module.join(MODULE_FILE))?;
        let submodule: NodeManifest = read_json(&paths.submodule.join(SUBMODULE_FILE))?;
        let manifest: LessonManifest = read_json(&paths.lesson.join(LESSON_FILE))?;

        Ok(Lesson {
            id: id.clone(),
            title: manifest.title,
            module_title: module.title,
            submodule_title: submodule.title,
            overview: read_text(&paths.lesson.join(OVERVIEW_FILE))?.trim().to_string(),
            expanded: read_json_optional(&paths.lesson.join(EXPANDED_FILE))?,
            content: read_json_optional(&paths.lesson.join(CONTENT_FILE))?,
            videos: Self::read_videos(&paths.lesson)?,
            completed: manifest.completed,
            completed_at: manifest.completed_at,
        })
    }

    fn read_videos(lesson_dir: &Path) -> CourseResult<Vec<VideoReference>> {
        Ok(read_json_optional(&lesson_dir.join(VIDEOS_FILE))?.unwrap_or_default())
    }

    /// Store an expansion; the stored copy always carries the lesson's own overview
    pub fn write_lesson_expansion(&self, id: &LessonId, mut expansion: ExpandedContent) -> CourseResult<ExpandedContent> {
        let paths = self.lesson_paths(id)?;
        expansion.overview = read_text(&paths.lesson.join(OVERVIEW_FILE))?.trim().to_string();
        write_json_atomic(&paths.lesson.join(EXPANDED_FILE), &expansion)?;
        Ok(expansion)
    }

    pub fn write_lesson_content(&self, id: &LessonId, content: &LessonContent) -> CourseResult<()> {
        let paths = self.lesson_paths(id)?;
        write_json_atomic(&paths.lesson.join(CONTENT_FILE), content)
    }

    /// Append one video; a video already attached to the lesson is not added twice.
    /// Returns the number of attached videos.
    pub fn append_video(&self, id: &LessonId, video: VideoReference) -> CourseResult<usize> {
        let paths = self.lesson_paths(id)?;
        let mut videos = Self::read_videos(&paths.lesson)?;
        if !videos.iter().any(|existing| existing.video_id == video.video_id) {
            videos.push(video);
            write_json_atomic(&paths.lesson.join(VIDEOS_FILE), &videos)?;
        }
        Ok(videos.len())
    }

    pub fn write_video_artifacts(
        &self,
        id: &LessonId,
        video_id: &str,
        transcript: &str,
        summary: Option<&str>,
    ) -> CourseResult<()> {
        if video_id.is_empty()
            || !video_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CourseError::Validation(format!("invalid video id '{}'", video_id)));
        }
        let paths = self.lesson_paths(id)?;
        let file_name = format!("{}.txt", video_id);
        write_atomic(
            &paths.lesson.join(TRANSCRIPTS_DIR).join(&file_name),
            transcript.as_bytes(),
        )?;
        if let Some(summary) = summary {
            write_atomic(&paths.lesson.join(SUMMARIES_DIR).join(&file_name), summary.as_bytes())?;
        }
        Ok(())
    }

    pub fn mark_lesson_completed(&self, id: &LessonId, completed: bool) -> CourseResult<Lesson> {
        let paths = self.lesson_paths(id)?;
        let manifest_path = paths.lesson.join(LESSON_FILE);
        let mut manifest: LessonManifest = read_json(&manifest_path)?;
        if manifest.completed != completed {
            manifest.completed = completed;
            manifest.completed_at = completed.then(Utc::now);
            write_json_atomic(&manifest_path, &manifest)?;
        }
        self.read_lesson(id)
    }

    pub fn course_progress(&self, course: &str) -> CourseResult<CourseProgress> {
        let course_dir = self.course_dir(course)?;
        let mut progress = CourseProgress {
            course: course.to_string(),
            total_lessons: 0,
            completed_lessons: 0,
            expanded_lessons: 0,
            attached_videos: 0,
            completion_percentage: 0.0,
            modules: Vec::new(),
        };

        for (_, module_dir) in Self::child_dirs(&course_dir, "module")? {
            let module: NodeManifest = read_json(&module_dir.join(MODULE_FILE))?;
            let mut module_progress = ModuleProgress {
                position: module.position,
                title: module.title,
                total_lessons: 0,
                completed_lessons: 0,
            };
            for (_, submodule_dir) in Self::child_dirs(&module_dir, "submodule")? {
                for (_, lesson_dir) in Self::child_dirs(&submodule_dir, "lesson")? {
                    let outline = Self::read_outline(&lesson_dir)?;
                    module_progress.total_lessons += 1;
                    if outline.completed {
                        module_progress.completed_lessons += 1;
                    }
                    if outline.expanded {
                        progress.expanded_lessons += 1;
                    }
                    progress.attached_videos += Self::read_videos(&lesson_dir)?.len();
                }
            }
            progress.total_lessons += module_progress.total_lessons;
            progress.completed_lessons += module_progress.completed_lessons;
            progress.modules.push(module_progress);
        }

        if progress.total_lessons > 0 {
            progress.completion_percentage =
                progress.completed_lessons as f64 / progress.total_lessons as f64 * 100.0;
        }
        Ok(progress)
    }

    // ========================================================================
    // Learner records
    // ========================================================================

    fn append_record<T: Serialize>(&self, kind: RecordKind, course: &str, record: &T) -> CourseResult<()> {
        self.course_dir(course)?;
        let value = serde_json::to_value(record).map_err(|e| {
            CourseError::serialization(PathBuf::from(kind.dir_name()).join(course), e)
        })?;
        self.records.append(kind, course, value)
    }

    /// Records that no longer decode are skipped rather than failing the read
    fn read_records<T: DeserializeOwned>(&self, kind: RecordKind, course: &str) -> CourseResult<Vec<T>> {
        self.course_dir(course)?;
        let values = self.records.get(kind, course)?;
        let total = values.len();
        let records: Vec<T> = values
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect();
        if records.len() != total {
            warn!(
                kind = kind.dir_name(),
                course = %course,
                skipped = total - records.len(),
                "Skipped undecodable records"
            );
        }
        Ok(records)
    }

    pub fn append_history(&self, entry: &HistoryEntry) -> CourseResult<()> {
        self.append_record(RecordKind::History, &entry.course, entry)
    }

    pub fn append_query(&self, course: &str, record: &QueryRecord) -> CourseResult<()> {
        self.append_record(RecordKind::Queries, course, record)
    }

    /// Difficulties must point at a lesson that exists
    pub fn append_difficulty(&self, record: &DifficultyRecord) -> CourseResult<()> {
        self.lesson_paths(&record.lesson)?;
        self.append_record(RecordKind::Difficulties, &record.lesson.course, record)
    }

    pub fn append_lesson_context(&self, record: &LessonContextRecord) -> CourseResult<()> {
        self.append_record(RecordKind::Context, &record.lesson.course, record)
    }

    /// History entries in insertion order (oldest first)
    pub fn history(&self, course: &str) -> CourseResult<Vec<HistoryEntry>> {
        self.read_records(RecordKind::History, course)
    }

    pub fn queries(&self, course: &str) -> CourseResult<Vec<QueryRecord>> {
        self.read_records(RecordKind::Queries, course)
    }

    pub fn difficulties(&self, course: &str) -> CourseResult<Vec<DifficultyRecord>> {
        self.read_records(RecordKind::Difficulties, course)
    }

    pub fn lesson_contexts(&self, course: &str) -> CourseResult<Vec<LessonContextRecord>> {
        self.read_records(RecordKind::Context, course)
    }

    // ========================================================================
    // Audit
    // ========================================================================

    /// Walk a course tree and report structural problems without changing anything
    pub fn audit_course(&self, course: &str) -> CourseResult<AuditReport> {
        let course_dir = self.course_dir(course)?;
        let mut report = AuditReport {
            course: course.to_string(),
            ..AuditReport::default()
        };

        if let Err(e) = read_json::<CourseManifest>(&course_dir.join(COURSE_FILE)) {
            report.issues.push(format!("course manifest unreadable: {}", e));
        }

        let modules = Self::child_dirs(&course_dir, "module")?;
        Self::audit_positions(&mut report, "course", &modules, MODULES_PER_COURSE);
        for (module_position, module_dir) in &modules {
            report.modules += 1;
            Self::audit_manifest(&mut report, &module_dir.join(MODULE_FILE), *module_position);
            let module_label = format!("module {}", module_position);

            let submodules = Self::child_dirs(module_dir, "submodule")?;
            Self::audit_positions(&mut report, &module_label, &submodules, SUBMODULES_PER_MODULE);
            for (submodule_position, submodule_dir) in &submodules {
                report.submodules += 1;
                Self::audit_manifest(&mut report, &submodule_dir.join(SUBMODULE_FILE), *submodule_position);
                let submodule_label = format!("submodule {}.{}", module_position, submodule_position);

                let lessons = Self::child_dirs(submodule_dir, "lesson")?;
                Self::audit_positions(&mut report, &submodule_label, &lessons, LESSONS_PER_SUBMODULE);
                for (lesson_position, lesson_dir) in &lessons {
                    report.lessons += 1;
                    let label = format!("lesson {}.{}.{}", module_position, submodule_position, lesson_position);
                    Self::audit_lesson(&mut report, &label, lesson_dir, *lesson_position);
                }
            }
        }

        log_store_operation!(debug, "audit_course", count = report.issues.len());
        Ok(report)
    }

    fn audit_positions(report: &mut AuditReport, parent: &str, children: &[(u8, PathBuf)], expected: usize) {
        if children.len() != expected {
            report.issues.push(format!(
                "{} has {} children, expected {}",
                parent,
                children.len(),
                expected
            ));
        }
        for (index, (position, _)) in children.iter().enumerate() {
            if *position as usize != index + 1 {
                report.issues.push(format!(
                    "{} positions are not contiguous: found {} at index {}",
                    parent,
                    position,
                    index + 1
                ));
                break;
            }
        }
    }

    fn audit_manifest(report: &mut AuditReport, path: &Path, position: u8) {
        match read_json::<NodeManifest>(path) {
            Ok(manifest) if manifest.position != position => report.issues.push(format!(
                "{} records position {} but its directory says {}",
                path.display(),
                manifest.position,
                position
            )),
            Ok(_) => {}
            Err(e) => report.issues.push(e.to_string()),
        }
    }

    fn audit_lesson(report: &mut AuditReport, label: &str, lesson_dir: &Path, position: u8) {
        match read_json::<LessonManifest>(&lesson_dir.join(LESSON_FILE)) {
            Ok(manifest) => {
                if manifest.position != position {
                    report.issues.push(format!(
                        "{} records position {} but its directory says {}",
                        label, manifest.position, position
                    ));
                }
                if manifest.completed {
                    report.completed_lessons += 1;
                }
            }
            Err(e) => report.issues.push(e.to_string()),
        }

        let overview = match read_text(&lesson_dir.join(OVERVIEW_FILE)) {
            Ok(text) => {
                if text.trim().is_empty() {
                    report.issues.push(format!("{} has an empty overview", label));
                }
                Some(text)
            }
            Err(e) => {
                report.issues.push(e.to_string());
                None
            }
        };

        match read_json_optional::<ExpandedContent>(&lesson_dir.join(EXPANDED_FILE)) {
            Ok(Some(expanded)) => {
                report.expanded_lessons += 1;
                if overview.is_some_and(|overview| expanded.overview.trim() != overview.trim()) {
                    report.issues.push(format!("{} expansion does not carry the lesson overview", label));
                }
            }
            Ok(None) => {}
            Err(e) => report.issues.push(e.to_string()),
        }

        match read_json_optional::<LessonContent>(&lesson_dir.join(CONTENT_FILE)) {
            Ok(Some(_)) => report.lessons_with_content += 1,
            Ok(None) => {}
            Err(e) => report.issues.push(e.to_string()),
        }

        match read_json_optional::<Vec<VideoReference>>(&lesson_dir.join(VIDEOS_FILE)) {
            Ok(videos) => report.videos += videos.map(|v| v.len()).unwrap_or(0),
            Err(e) => report.issues.push(e.to_string()),
        }
    }

    /// Rewrite manifests whose recorded position disagrees with their directory
    /// prefix. Returns how many manifests were fixed.
    pub fn repair_positions(&self, course: &str) -> CourseResult<usize> {
        let course_dir = self.course_dir(course)?;
        let mut repaired = 0;

        for (module_position, module_dir) in Self::child_dirs(&course_dir, "module")? {
            repaired += Self::repair_node(&module_dir.join(MODULE_FILE), module_position)?;
            for (submodule_position, submodule_dir) in Self::child_dirs(&module_dir, "submodule")? {
                repaired += Self::repair_node(&submodule_dir.join(SUBMODULE_FILE), submodule_position)?;
                for (lesson_position, lesson_dir) in Self::child_dirs(&submodule_dir, "lesson")? {
                    let path = lesson_dir.join(LESSON_FILE);
                    let mut manifest: LessonManifest = read_json(&path)?;
                    if manifest.position != lesson_position {
                        manifest.position = lesson_position;
                        write_json_atomic(&path, &manifest)?;
                        repaired += 1;
                    }
                }
            }
        }

        log_store_operation!(info, "repair_positions", format!("{} manifests repaired in '{}'", repaired, course));
        Ok(repaired)
    }

    fn repair_node(path: &Path, position: u8) -> CourseResult<usize> {
        let mut manifest: NodeManifest = read_json(path)?;
        if manifest.position == position {
            return Ok(0);
        }
        manifest.position = position;
        write_json_atomic(path, &manifest)?;
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_blocking_returns_work_result() {
        let value = run_blocking(|| Ok(42)).await.unwrap();
        assert_eq!(value, 42);

        let error = run_blocking::<(), _>(|| Err(CourseError::NotFound("lesson".to_string())))
            .await
            .unwrap_err();
        assert!(matches!(error, CourseError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_run_blocking_reports_panics() {
        let error = run_blocking::<(), _>(|| panic!("disk vanished")).await.unwrap_err();
        assert!(matches!(error, CourseError::StorageTask(_)));
        assert_eq!(error.kind(), "storage_task");
    }

    #[test]
    fn test_safe_name() {
        assert_eq!(safe_name("Korean"), "Korean");
        assert_eq!(safe_name("  Learn C++: pointers & refs  "), "Learn_C_pointers__refs");
        assert_eq!(safe_name("한국어 기초"), "한국어_기초");
        assert_eq!(safe_name("../../etc"), "etc");
        assert_eq!(safe_name("!!!"), "");
        assert_eq!(safe_name(&"a".repeat(80)).chars().count(), 50);
    }

    #[test]
    fn test_position_from_dir_name() {
        assert_eq!(position_from_dir_name("module", "module_03_Greetings"), Some(3));
        assert_eq!(position_from_dir_name("module", "module_10"), Some(10));
        assert_eq!(position_from_dir_name("module", "submodule_01_x"), None);
        assert_eq!(position_from_dir_name("lesson", "lesson_x"), None);
        assert_eq!(position_from_dir_name("lesson", "lesson_01x"), None);
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("file.json");
        write_json_atomic(&path, &vec![1, 2, 3]).unwrap();
        write_json_atomic(&path, &vec![4]).unwrap();

        let stored: Vec<i32> = read_json(&path).unwrap();
        assert_eq!(stored, vec![4]);
        // Only the target remains; no temp files left beside it
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }
}
