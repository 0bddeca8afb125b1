//! Best-effort video discovery for a lesson.
//!
//! Query generation, search, transcript download, summary and relevance are
//! each allowed to fail on their own; failures are collected into the
//! [`PipelineReport`] and the pipeline carries on with what it has. Only
//! store writes propagate as errors.

use chrono::Utc;
use futures_util::future::join;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::VideoConfig;
use crate::content_store::{ContentStore, run_blocking};
use crate::errors::{CourseError, CourseResult};
use crate::history_store::HistoryStore;
use crate::llm_providers::GenerationOptions;
use crate::llm_service::TextGenerator;
use crate::models::{Lesson, VideoCandidate, VideoReference};
use crate::prompts::{PromptRequest, build_prompt};
use crate::response_parser::parse_search_queries;
use crate::video::{TranscriptSource, VideoSearch, transcript_text};

// Import logging macros
use crate::log_pipeline_step;

/// Words of at most this many characters are not key terms
const MIN_KEY_TERM_CHARS: usize = 4;
const MAX_KEY_TERMS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    pub max_queries: usize,
    pub results_per_query: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_queries: 3,
            results_per_query: 1,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &VideoConfig) -> Self {
        Self {
            max_queries: config.max_queries,
            results_per_query: config.results_per_query,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Queries,
    Search,
    Transcript,
    Summary,
    Relevance,
    Context,
}

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::Queries => "queries",
            PipelineStep::Search => "search",
            PipelineStep::Transcript => "transcript",
            PipelineStep::Summary => "summary",
            PipelineStep::Relevance => "relevance",
            PipelineStep::Context => "context",
        }
    }
}

/// A step that failed and was skipped; `subject` is the query or video id involved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailure {
    pub step: PipelineStep,
    pub subject: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub queries: Vec<String>,
    /// Videos attached by this run, in the order they were committed
    pub videos: Vec<VideoReference>,
    pub skipped: Vec<StepFailure>,
}

impl PipelineReport {
    fn skip(&mut self, step: PipelineStep, subject: &str, error: &CourseError) {
        log_pipeline_step!(skip, step.as_str(), subject = subject, error = error);
        self.skipped.push(StepFailure {
            step,
            subject: subject.to_string(),
            error: error.to_string(),
        });
    }
}

/// Search queries built from the lesson's longer words, used when the model
/// cannot produce any
pub fn fallback_queries(lesson_text: &str, max_queries: usize) -> Vec<String> {
    let lowered = lesson_text.to_lowercase();
    let mut terms: Vec<&str> = Vec::new();
    for word in lowered.split_whitespace() {
        if word.chars().count() > MIN_KEY_TERM_CHARS
            && word.chars().all(char::is_alphabetic)
            && !terms.contains(&word)
        {
            terms.push(word);
        }
        if terms.len() == MAX_KEY_TERMS {
            break;
        }
    }

    let span = |start: usize, end: usize| &terms[start.min(terms.len())..end.min(terms.len())];
    let candidates = [
        (span(0, 2), "tutorial"),
        (span(2, 4), "programming"),
        (span(0, 3), "examples"),
    ];

    let mut queries: Vec<String> = Vec::new();
    for (words, suffix) in candidates {
        if words.is_empty() {
            continue;
        }
        let query = format!("{} {}", words.join(" "), suffix);
        if !queries.contains(&query) {
            queries.push(query);
        }
    }
    queries.truncate(max_queries);
    queries
}

/// Text the pipeline reasons about: the expansion when present, else title and overview
pub fn lesson_text(lesson: &Lesson) -> String {
    match &lesson.expanded {
        Some(expanded) => expanded.as_prompt_text(),
        None => format!("{}\n{}", lesson.title, lesson.overview),
    }
}

#[derive(Clone)]
pub struct VideoPipeline {
    generator: Arc<dyn TextGenerator>,
    search: Arc<dyn VideoSearch>,
    transcripts: Arc<dyn TranscriptSource>,
    store: ContentStore,
    history: HistoryStore,
    settings: PipelineSettings,
}

impl VideoPipeline {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        search: Arc<dyn VideoSearch>,
        transcripts: Arc<dyn TranscriptSource>,
        store: ContentStore,
        settings: PipelineSettings,
    ) -> Self {
        let history = HistoryStore::new(store.clone());
        Self {
            generator,
            search,
            transcripts,
            store,
            history,
            settings,
        }
    }

    pub async fn run(&self, lesson: &Lesson) -> CourseResult<PipelineReport> {
        let mut report = PipelineReport::default();
        let text = lesson_text(lesson);

        let queries = self.derive_queries(&text, &mut report).await;
        report.queries = queries;
        log_pipeline_step!(done, PipelineStep::Queries.as_str(), count = report.queries.len());

        let candidates = self.find_candidates(lesson, &mut report).await;
        log_pipeline_step!(done, PipelineStep::Search.as_str(), count = candidates.len());

        let mut gathered_transcripts = Vec::new();
        for candidate in candidates {
            let transcript = match self.transcripts.fetch(&candidate.video_id).await {
                Ok(segments) => transcript_text(&segments),
                Err(e) => {
                    report.skip(PipelineStep::Transcript, &candidate.video_id, &e);
                    continue;
                }
            };
            if transcript.is_empty() {
                let error = CourseError::ExternalDataUnavailable("transcript is empty".to_string());
                report.skip(PipelineStep::Transcript, &candidate.video_id, &error);
                continue;
            }

            let (summary, relevance) = join(
                self.summarize(&candidate, &transcript),
                self.explain_relevance(&candidate, &text),
            )
            .await;
            let summary = summary
                .map_err(|e| report.skip(PipelineStep::Summary, &candidate.video_id, &e))
                .ok();
            let relevance = relevance
                .map_err(|e| report.skip(PipelineStep::Relevance, &candidate.video_id, &e))
                .ok();

            let video = VideoReference {
                url: candidate.url(),
                video_id: candidate.video_id,
                title: candidate.title,
                channel: candidate.channel,
                search_query: candidate.search_query,
                summary,
                relevance,
                added_at: Utc::now(),
            };

            // Committed one at a time so a later failure keeps earlier videos
            let store = self.store.clone();
            let lesson_id = lesson.id.clone();
            let committed = video.clone();
            let transcript = run_blocking(move || {
                store.append_video(&lesson_id, committed.clone())?;
                store.write_video_artifacts(&lesson_id, &committed.video_id, &transcript, committed.summary.as_deref())?;
                Ok(transcript)
            })
            .await?;
            gathered_transcripts.push(transcript);
            report.videos.push(video);
        }
        log_pipeline_step!(done, PipelineStep::Transcript.as_str(), count = report.videos.len());

        let history = self.history.clone();
        let lesson_id = lesson.id.clone();
        let context_text = text.clone();
        let recorded = run_blocking(move || {
            history.record_lesson_context(&lesson_id, &context_text, gathered_transcripts)
        })
        .await;
        if let Err(e) = recorded {
            report.skip(PipelineStep::Context, &lesson.id.to_string(), &e);
        }

        Ok(report)
    }

    async fn derive_queries(&self, text: &str, report: &mut PipelineReport) -> Vec<String> {
        let generated = async {
            let prompt = build_prompt(&PromptRequest::VideoQueries {
                lesson_text: text,
                max_queries: self.settings.max_queries,
            })?;
            let raw = self.generator.complete(&prompt, &GenerationOptions::default()).await?;
            parse_search_queries(&raw, self.settings.max_queries)
        }
        .await;

        match generated {
            Ok(queries) => queries,
            Err(e) => {
                report.skip(PipelineStep::Queries, "model", &e);
                fallback_queries(text, self.settings.max_queries)
            }
        }
    }

    /// Search every query; drop repeats and videos the lesson already has
    async fn find_candidates(&self, lesson: &Lesson, report: &mut PipelineReport) -> Vec<VideoCandidate> {
        let mut seen: HashSet<String> = lesson.videos.iter().map(|v| v.video_id.clone()).collect();
        let mut candidates = Vec::new();

        for query in report.queries.clone() {
            match self.search.search(&query, self.settings.results_per_query).await {
                Ok(results) => {
                    for candidate in results {
                        if seen.insert(candidate.video_id.clone()) {
                            candidates.push(candidate);
                        }
                    }
                }
                Err(e) => report.skip(PipelineStep::Search, &query, &e),
            }
        }
        candidates
    }

    async fn summarize(&self, candidate: &VideoCandidate, transcript: &str) -> CourseResult<String> {
        let prompt = build_prompt(&PromptRequest::VideoSummary {
            video_title: &candidate.title,
            transcript,
        })?;
        let summary = self.generator.complete(&prompt, &GenerationOptions::default()).await?;
        Ok(summary.trim().to_string())
    }

    async fn explain_relevance(&self, candidate: &VideoCandidate, lesson_text: &str) -> CourseResult<String> {
        let url = candidate.url();
        let prompt = build_prompt(&PromptRequest::VideoRelevance {
            video_title: &candidate.title,
            video_url: &url,
            lesson_context: lesson_text,
        })?;
        let relevance = self.generator.complete(&prompt, &GenerationOptions::default()).await?;
        Ok(relevance.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_queries_from_key_terms() {
        let text = "Korean vowels and consonants in the Hangul writing system";
        assert_eq!(
            fallback_queries(text, 3),
            vec![
                "korean vowels tutorial",
                "consonants hangul programming",
                "korean vowels consonants examples",
            ]
        );
    }

    #[test]
    fn test_fallback_queries_with_few_terms() {
        assert_eq!(fallback_queries("Hangul", 3), vec!["hangul tutorial", "hangul examples"]);
        assert!(fallback_queries("a b c", 3).is_empty());
        assert_eq!(fallback_queries("vowels consonants syllables", 1).len(), 1);
    }
}
