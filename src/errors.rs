use std::path::{Path, PathBuf};

use crate::api::ApiResponse;
use axum::{http::StatusCode, response::Json};
use tracing::{error, info, warn};

/// Every failure the content pipeline can surface
#[derive(Debug, thiserror::Error)]
pub enum CourseError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Course already exists: {0}")]
    CourseExists(String),

    /// Model endpoint unreachable, erroring or timing out after all retries
    #[error("Generation unavailable: {0}")]
    GenerationUnavailable(String),

    /// The model answered but nothing usable could be extracted
    #[error("Malformed generation: {0}")]
    MalformedGeneration(String),

    /// Video search or transcript failures; absorbed by the video pipeline
    #[error("External data unavailable: {0}")]
    ExternalDataUnavailable(String),

    #[error("Filesystem error at '{}': {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON at '{}': {source}", path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A blocking storage task panicked or was cancelled
    #[error("Storage task failed: {0}")]
    StorageTask(String),
}

pub type CourseResult<T> = Result<T, CourseError>;

impl CourseError {
    pub fn filesystem(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        CourseError::Filesystem {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn serialization(path: impl AsRef<Path>, source: serde_json::Error) -> Self {
        CourseError::Serialization {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Short stable name used in logs and pipeline reports
    pub fn kind(&self) -> &'static str {
        match self {
            CourseError::Validation(_) => "validation",
            CourseError::NotFound(_) => "not_found",
            CourseError::CourseExists(_) => "course_exists",
            CourseError::GenerationUnavailable(_) => "generation_unavailable",
            CourseError::MalformedGeneration(_) => "malformed_generation",
            CourseError::ExternalDataUnavailable(_) => "external_data_unavailable",
            CourseError::Filesystem { .. } => "filesystem",
            CourseError::Serialization { .. } => "serialization",
            CourseError::StorageTask(_) => "storage_task",
        }
    }
}

/// Error context for structured logging
#[derive(Debug)]
pub struct ErrorContext {
    pub operation: String,
    pub resource_id: Option<String>,
    pub resource_type: String,
    pub user_friendly_message: Option<String>,
}

impl ErrorContext {
    pub fn new(operation: &str, resource_type: &str) -> Self {
        Self {
            operation: operation.to_string(),
            resource_id: None,
            resource_type: resource_type.to_string(),
            user_friendly_message: None,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn with_user_message(mut self, message: &str) -> Self {
        self.user_friendly_message = Some(message.to_string());
        self
    }
}

impl CourseError {
    /// Convert the error to an HTTP response with consistent structure and logging
    pub fn to_response_with_context(
        self,
        context: ErrorContext,
    ) -> (StatusCode, Json<ApiResponse<()>>) {
        match &self {
            CourseError::NotFound(_) => {
                info!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Resource not found"
                );
                (
                    StatusCode::NOT_FOUND,
                    Json(ApiResponse::error(
                        context
                            .user_friendly_message
                            .unwrap_or_else(|| format!("{} not found", context.resource_type)),
                    )),
                )
            }
            CourseError::Validation(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Validation error"
                );
                (
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::error(self.to_string())),
                )
            }
            CourseError::CourseExists(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Duplicate course"
                );
                (
                    StatusCode::CONFLICT,
                    Json(ApiResponse::error(self.to_string())),
                )
            }
            CourseError::GenerationUnavailable(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Model endpoint unavailable"
                );
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ApiResponse::error(
                        "AI service temporarily unavailable. Please try again.".to_string(),
                    )),
                )
            }
            CourseError::MalformedGeneration(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Model returned unusable content"
                );
                (
                    StatusCode::BAD_GATEWAY,
                    Json(ApiResponse::error(
                        "The AI response could not be understood. Please try again.".to_string(),
                    )),
                )
            }
            CourseError::ExternalDataUnavailable(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "External data unavailable"
                );
                (
                    StatusCode::BAD_GATEWAY,
                    Json(ApiResponse::error(self.to_string())),
                )
            }
            CourseError::Filesystem { .. }
            | CourseError::Serialization { .. }
            | CourseError::StorageTask(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Storage error"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::error(self.to_string())),
                )
            }
        }
    }

    /// Simple conversion without a named operation
    pub fn to_response(self) -> (StatusCode, Json<ApiResponse<()>>) {
        let context = ErrorContext::new("unknown", "resource");
        self.to_response_with_context(context)
    }
}
