pub mod api;
pub mod config;
pub mod content_store;
pub mod course_service;
pub mod errors;
pub mod history_store;
pub mod llm_providers;
pub mod llm_service;
pub mod logging;
pub mod models;
pub mod prompts;
pub mod record_store;
pub mod response_parser;
pub mod video;
pub mod video_pipeline;

pub use config::Config;
pub use content_store::{AuditReport, ContentStore};
pub use course_service::{CourseService, ExpansionOutcome};
pub use errors::*;
pub use history_store::HistoryStore;
pub use llm_providers::{GenerationOptions, LLMProvider, LLMProviderFactory, LLMProviderType};
pub use llm_service::{LLMService, TextGenerator};
pub use models::*;
pub use record_store::{InMemoryRecordStore, JsonFileRecordStore, RecordKind, RecordStore};
pub use response_parser::JsonResponseParser;
pub use video::{TimedTextClient, TranscriptSource, VideoSearch, YouTubeSearchClient};
pub use video_pipeline::{PipelineReport, PipelineSettings, VideoPipeline};
