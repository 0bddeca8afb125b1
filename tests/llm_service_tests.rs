use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use course_generator::{
    CourseError, GenerationOptions, LLMProviderFactory, LLMProviderType, LLMService, TextGenerator,
    prompts::Prompt,
};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
struct MockModel {
    /// Requests answered with a 500 before the first success
    failures_before_success: usize,
    empty_reply: bool,
    calls: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<Value>>>,
}

impl MockModel {
    fn record(&self, body: Value) -> usize {
        self.bodies.lock().unwrap().push(body);
        self.calls.fetch_add(1, Ordering::SeqCst)
    }

    fn reply(&self) -> &'static str {
        if self.empty_reply { "   " } else { "안녕하세요" }
    }
}

async fn ollama_chat(State(mock): State<MockModel>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let call = mock.record(body);
    if call < mock.failures_before_success {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "model loading"})));
    }
    (
        StatusCode::OK,
        Json(json!({"message": {"role": "assistant", "content": mock.reply()}, "done": true})),
    )
}

async fn openai_chat(State(mock): State<MockModel>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let call = mock.record(body);
    if call < mock.failures_before_success {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": "overloaded"})));
    }
    (
        StatusCode::OK,
        Json(json!({"choices": [{"message": {"role": "assistant", "content": mock.reply()}}]})),
    )
}

/// Serve the mock on an ephemeral local port and return its base URL
async fn spawn_mock(mock: MockModel) -> String {
    let app = Router::new()
        .route("/api/chat", post(ollama_chat))
        .route("/v1/chat/completions", post(openai_chat))
        .with_state(mock);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn service(provider: LLMProviderType, base_url: String, max_retries: u32) -> LLMService {
    let provider = LLMProviderFactory::create_provider(
        provider,
        "test-key".to_string(),
        Some(base_url),
        Some("phi3:14b".to_string()),
        Duration::from_secs(5),
    );
    LLMService::new(provider, max_retries, Duration::from_millis(1))
}

fn prompt() -> Prompt {
    Prompt {
        system: "You are a concise, patient tutor.".to_string(),
        user: "How do I say hello?".to_string(),
    }
}

#[tokio::test]
async fn test_ollama_request_shape() {
    let mock = MockModel::default();
    let base_url = spawn_mock(mock.clone()).await;
    let llm = service(LLMProviderType::Ollama, base_url, 0);

    let options = GenerationOptions {
        temperature: 0.3,
        max_tokens: 512,
    };
    let reply = llm.complete(&prompt(), &options).await.unwrap();
    assert_eq!(reply, "안녕하세요");

    let bodies = mock.bodies.lock().unwrap();
    let body = &bodies[0];
    assert_eq!(body["model"], "phi3:14b");
    assert_eq!(body["stream"], false);
    assert_eq!(body["options"]["num_predict"], 512);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["role"], "user");
    assert_eq!(body["messages"][1]["content"], "How do I say hello?");
}

#[tokio::test]
async fn test_ollama_url_already_pointing_at_chat() {
    let mock = MockModel::default();
    let base_url = spawn_mock(mock.clone()).await;
    let llm = service(LLMProviderType::Ollama, format!("{}/api/chat", base_url), 0);

    llm.complete(&prompt(), &GenerationOptions::default()).await.unwrap();
    assert_eq!(mock.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let mock = MockModel {
        failures_before_success: 2,
        ..MockModel::default()
    };
    let base_url = spawn_mock(mock.clone()).await;
    let llm = service(LLMProviderType::Ollama, base_url, 2);

    let reply = llm.complete(&prompt(), &GenerationOptions::default()).await.unwrap();
    assert_eq!(reply, "안녕하세요");
    assert_eq!(mock.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let mock = MockModel {
        failures_before_success: 10,
        ..MockModel::default()
    };
    let base_url = spawn_mock(mock.clone()).await;
    let llm = service(LLMProviderType::OpenAI, format!("{}/v1", base_url), 1);

    let error = llm
        .complete(&prompt(), &GenerationOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(error, CourseError::GenerationUnavailable(ref message) if message.contains("2 attempts")));
    assert_eq!(mock.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_empty_reply_is_unavailable() {
    let mock = MockModel {
        empty_reply: true,
        ..MockModel::default()
    };
    let base_url = spawn_mock(mock.clone()).await;
    let llm = service(LLMProviderType::OpenAI, format!("{}/v1", base_url), 1);

    let error = llm
        .complete(&prompt(), &GenerationOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(error, CourseError::GenerationUnavailable(_)));
    assert_eq!(mock.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_unavailable() {
    // Bind then drop to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let llm = service(LLMProviderType::Ollama, format!("http://{}", addr), 1);
    let error = llm
        .complete(&prompt(), &GenerationOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(error, CourseError::GenerationUnavailable(_)));
}

#[tokio::test]
async fn test_maximum_retry_count_does_not_overflow() {
    let mock = MockModel::default();
    let base_url = spawn_mock(mock.clone()).await;
    let llm = service(LLMProviderType::Ollama, base_url, u32::MAX);

    let reply = llm.complete(&prompt(), &GenerationOptions::default()).await.unwrap();
    assert_eq!(reply, "안녕하세요");
    assert_eq!(mock.calls.load(Ordering::SeqCst), 1);
}
