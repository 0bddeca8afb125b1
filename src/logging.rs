use anyhow::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Standardized logging macros for consistent field names and message patterns
///
/// These macros ensure:
/// - Consistent field naming (`course`, `lesson`, `operation`, `duration_ms`)
/// - Appropriate logging levels for different scenarios
/// - Structured logging with context

// ============================================================================
// API Operation Logging Macros
// ============================================================================

/// Log the start of an API operation
#[macro_export]
macro_rules! log_api_start {
    ($operation:expr, course = $course:expr) => {
        tracing::debug!(
            operation = $operation,
            course = %$course,
            "API operation started"
        );
    };
    ($operation:expr, lesson = $lesson:expr) => {
        tracing::debug!(
            operation = $operation,
            lesson = %$lesson,
            "API operation started"
        );
    };
    ($operation:expr) => {
        tracing::debug!(operation = $operation, "API operation started");
    };
}

/// Log successful completion of an API operation
#[macro_export]
macro_rules! log_api_success {
    ($operation:expr, course = $course:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            course = %$course,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, lesson = $lesson:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            lesson = %$lesson,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, count = $count:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            count = $count,
            "API operation completed: {}", $msg
        );
    };
}

/// Log API operation errors
#[macro_export]
macro_rules! log_api_error {
    ($operation:expr, course = $course:expr, error = $error:expr, $msg:expr) => {
        tracing::error!(
            operation = $operation,
            course = %$course,
            error = %$error,
            "API operation failed: {}", $msg
        );
    };
    ($operation:expr, lesson = $lesson:expr, error = $error:expr, $msg:expr) => {
        tracing::error!(
            operation = $operation,
            lesson = %$lesson,
            error = %$error,
            "API operation failed: {}", $msg
        );
    };
}

/// Log API warnings with context
#[macro_export]
macro_rules! log_api_warn {
    ($operation:expr, lesson = $lesson:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            lesson = %$lesson,
            "API operation warning: {}", $msg
        );
    };
    ($operation:expr, $msg:expr) => {
        tracing::warn!(operation = $operation, "API operation warning: {}", $msg);
    };
}

// ============================================================================
// Service Layer Logging Macros
// ============================================================================

/// Log service operation start with context
#[macro_export]
macro_rules! log_service_start {
    ($service:expr, $operation:expr, course = $course:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            course = %$course,
            "Service operation started"
        );
    };
    ($service:expr, $operation:expr, lesson = $lesson:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            lesson = %$lesson,
            "Service operation started"
        );
    };
}

/// Log service operation success
#[macro_export]
macro_rules! log_service_success {
    ($service:expr, $operation:expr, course = $course:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            course = %$course,
            duration_ms = $duration,
            "Service operation completed successfully"
        );
    };
    ($service:expr, $operation:expr, lesson = $lesson:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            lesson = %$lesson,
            duration_ms = $duration,
            "Service operation completed successfully"
        );
    };
}

/// Log service operation errors
#[macro_export]
macro_rules! log_service_error {
    ($service:expr, $operation:expr, course = $course:expr, error = $error:expr) => {
        tracing::error!(
            service = $service,
            operation = $operation,
            course = %$course,
            error = %$error,
            "Service operation failed"
        );
    };
    ($service:expr, $operation:expr, lesson = $lesson:expr, error = $error:expr) => {
        tracing::error!(
            service = $service,
            operation = $operation,
            lesson = %$lesson,
            error = %$error,
            "Service operation failed"
        );
    };
}

/// Log service warnings
#[macro_export]
macro_rules! log_service_warn {
    ($service:expr, $operation:expr, $msg:expr) => {
        tracing::warn!(
            service = $service,
            operation = $operation,
            "Service warning: {}",
            $msg
        );
    };
}

// ============================================================================
// Storage Logging Macros
// ============================================================================

/// Log content/record store operations
#[macro_export]
macro_rules! log_store_operation {
    (debug, $operation:expr, path = $path:expr, duration_ms = $duration:expr) => {
        tracing::debug!(
            component = "content_store",
            operation = $operation,
            path = %$path.display(),
            duration_ms = $duration,
            "Store operation completed"
        );
    };
    (debug, $operation:expr, count = $count:expr) => {
        tracing::debug!(
            component = "content_store",
            operation = $operation,
            result_count = $count,
            "Store operation completed"
        );
    };
    (info, $operation:expr, $msg:expr) => {
        tracing::info!(
            component = "content_store",
            operation = $operation,
            "Store operation: {}", $msg
        );
    };
    (error, $operation:expr, error = $error:expr) => {
        tracing::error!(
            component = "content_store",
            operation = $operation,
            error = %$error,
            "Store operation failed"
        );
    };
}

// ============================================================================
// LLM Logging Macros
// ============================================================================

/// Log model client operations with provider context
#[macro_export]
macro_rules! log_llm_operation {
    (start, provider = $provider:expr, model = $model:expr, prompt_chars = $chars:expr) => {
        tracing::info!(
            component = "llm_service",
            provider = %$provider,
            model = %$model,
            prompt_chars = $chars,
            "LLM request started"
        );
    };
    (success, provider = $provider:expr, duration_ms = $duration:expr, response_chars = $chars:expr) => {
        tracing::info!(
            component = "llm_service",
            provider = %$provider,
            duration_ms = $duration,
            response_chars = $chars,
            "LLM request completed successfully"
        );
    };
    (error, provider = $provider:expr, error = $error:expr, retry_count = $retry:expr) => {
        tracing::error!(
            component = "llm_service",
            provider = %$provider,
            error = %$error,
            retry_count = $retry,
            "LLM request failed"
        );
    };
    (warn, $msg:expr) => {
        tracing::warn!(component = "llm_service", "LLM warning: {}", $msg);
    };
}

// ============================================================================
// Video Pipeline Logging Macros
// ============================================================================

/// Log video pipeline steps; skipped steps are warnings, never errors
#[macro_export]
macro_rules! log_pipeline_step {
    (done, $step:expr, count = $count:expr) => {
        tracing::info!(
            component = "video_pipeline",
            step = $step,
            count = $count,
            "Pipeline step completed"
        );
    };
    (skip, $step:expr, subject = $subject:expr, error = $error:expr) => {
        tracing::warn!(
            component = "video_pipeline",
            step = $step,
            subject = %$subject,
            error = %$error,
            "Pipeline step skipped"
        );
    };
}

// ============================================================================
// System Event Logging Macros
// ============================================================================

/// Log system startup and shutdown events
#[macro_export]
macro_rules! log_system_event {
    (startup, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "startup",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (shutdown, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "shutdown",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (config, $msg:expr) => {
        tracing::info!(event_type = "configuration", "System event: {}", $msg);
    };
}

// ============================================================================
// Validation Logging Macros
// ============================================================================

/// Log validation results consistently
#[macro_export]
macro_rules! log_validation {
    (success, $component:expr, $msg:expr) => {
        tracing::debug!(
            event_type = "validation",
            component = $component,
            result = "success",
            "Validation completed: {}", $msg
        );
    };
    (failure, $component:expr, error = $error:expr) => {
        tracing::warn!(
            event_type = "validation",
            component = $component,
            result = "failure",
            error = %$error,
            "Validation failed"
        );
    };
}

/// Install the global subscriber: console and/or daily-rolling file output.
///
/// The returned guard must be held for the lifetime of the process, otherwise
/// buffered file output is lost.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = config.console_enabled.then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(true)
    });

    let (file_layer, guard) = if config.file_enabled {
        std::fs::create_dir_all(&config.log_directory)?;
        let file_appender =
            tracing_appender::rolling::daily(&config.log_directory, "course-generator.log");
        let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);
        let layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_writer(non_blocking_file);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    info!(
        log_directory = %config.log_directory,
        file_enabled = config.file_enabled,
        console_enabled = config.console_enabled,
        "Logging initialized"
    );

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    #[test]
    fn test_logging_macros_compile() {
        let course = "Korean";
        let lesson = "Korean/1/1/1";
        let error = anyhow::anyhow!("test error");
        let path = Path::new("/tmp/courses/Korean");

        log_api_start!("create_course", course = course);
        log_api_start!("read_lesson", lesson = lesson);
        log_api_start!("list_courses");

        log_api_success!("create_course", course = course, "course created");
        log_api_success!("read_lesson", lesson = lesson, "lesson retrieved");
        log_api_success!("list_courses", count = 3, "courses listed");

        log_api_error!("create_course", course = course, error = error, "failed");
        log_api_error!("read_lesson", lesson = lesson, error = error, "failed");
        log_api_warn!("read_lesson", lesson = lesson, "lesson not found");
        log_api_warn!("list_courses", "empty course root");

        log_service_start!("course_service", "generate_curriculum", course = course);
        log_service_start!("course_service", "expand_lesson", lesson = lesson);
        log_service_success!("course_service", "generate_curriculum", course = course, duration_ms = 10);
        log_service_success!("course_service", "expand_lesson", lesson = lesson, duration_ms = 10);
        log_service_error!("course_service", "generate_curriculum", course = course, error = error);
        log_service_error!("course_service", "expand_lesson", lesson = lesson, error = error);
        log_service_warn!("course_service", "expand_lesson", "video pipeline failed");

        log_store_operation!(debug, "write_json", path = path, duration_ms = 1);
        log_store_operation!(debug, "list_courses", count = 2);
        log_store_operation!(info, "create_course", "course committed");
        log_store_operation!(error, "create_course", error = error);

        log_llm_operation!(start, provider = "Ollama", model = "phi3:14b", prompt_chars = 120);
        log_llm_operation!(success, provider = "Ollama", duration_ms = 1500, response_chars = 900);
        log_llm_operation!(error, provider = "Ollama", error = error, retry_count = 1);
        log_llm_operation!(warn, "empty response");

        log_pipeline_step!(done, "search", count = 3);
        log_pipeline_step!(skip, "transcript", subject = "abc123", error = error);

        log_system_event!(startup, component = "server", "server starting");
        log_system_event!(shutdown, component = "server", "server stopped");
        log_system_event!(config, "configuration loaded successfully");

        log_validation!(success, "configuration", "configuration validated");
        log_validation!(failure, "configuration", error = error);
    }
}
