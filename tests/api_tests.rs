mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use common::*;
use course_generator::{CourseError, api::*};
use serde_json::{Value, json};
use std::sync::Arc;

const LESSON_1_1_1: &str = "/api/courses/Korean/modules/1/submodules/1/lessons/1";

fn create_test_server(dirs: &TestDirs, generator: ScriptedGenerator) -> TestServer {
    let course_service = service_with(
        dirs,
        Arc::new(generator),
        Arc::new(FakeSearch::with_videos(&["vid001"])),
        Arc::new(FakeTranscripts::default()),
    );
    let app = create_router(AppState { course_service });
    TestServer::new(app).unwrap()
}

async fn server_with_course(dirs: &TestDirs) -> TestServer {
    let server = create_test_server(dirs, ScriptedGenerator::happy());
    server
        .post("/api/courses")
        .json(&json!({"subject": "Korean", "background": "complete beginner"}))
        .await
        .assert_status_ok();
    server
}

#[tokio::test]
async fn test_api_create_and_read_course() {
    let dirs = TestDirs::new();
    let server = create_test_server(&dirs, ScriptedGenerator::happy());

    let response = server
        .post("/api/courses")
        .json(&json!({"subject": "Korean", "background": "complete beginner"}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["id"], "Korean");
    assert_eq!(body["data"]["modules"].as_array().unwrap().len(), 7);

    let response = server.get("/api/courses").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["background"], "complete beginner");

    let response = server.get("/api/courses/Korean").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["modules"][6]["submodules"][9]["lessons"][9]["position"], 10);
}

#[tokio::test]
async fn test_api_duplicate_course_conflicts() {
    let dirs = TestDirs::new();
    let server = server_with_course(&dirs).await;

    let response = server
        .post("/api/courses")
        .json(&json!({"subject": "Korean"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert!(body["data"].is_null());
}

#[tokio::test]
async fn test_api_blank_subject_is_bad_request() {
    let dirs = TestDirs::new();
    let server = create_test_server(&dirs, ScriptedGenerator::happy());

    let response = server.post("/api/courses").json(&json!({"subject": "  "})).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_api_generation_failures_map_to_gateway_statuses() {
    let dirs = TestDirs::new();
    let server = create_test_server(&dirs, ScriptedGenerator::unavailable());
    let response = server.post("/api/courses").json(&json!({"subject": "Korean"})).await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);

    let dirs = TestDirs::new();
    let server = create_test_server(&dirs, ScriptedGenerator::new(|_, _, _| Ok("no".to_string())));
    let response = server.post("/api/courses").json(&json!({"subject": "Korean"})).await;
    assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);

    let response = server.get("/api/courses").await;
    let body: Value = response.json();
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_api_missing_resources_are_not_found() {
    let dirs = TestDirs::new();
    let server = server_with_course(&dirs).await;

    let response = server.get("/api/courses/Japanese").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let response = server
        .get("/api/courses/Korean/modules/8/submodules/1/lessons/1")
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"], "lesson not found");

    let response = server
        .get("/api/courses/Korean/modules/one/submodules/1/lessons/1")
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_api_lesson_lifecycle() {
    let dirs = TestDirs::new();
    let server = server_with_course(&dirs).await;

    let response = server.get(LESSON_1_1_1).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["overview"], "Overview of lesson 1.1.1");
    assert!(body["data"]["expanded"].is_null());
    assert_eq!(body["data"]["videos"], json!([]));

    let response = server
        .post(&format!("{}/expand", LESSON_1_1_1))
        .json(&json!({"with_videos": true}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["lesson"]["expanded"]["overview"], "Overview of lesson 1.1.1");
    assert_eq!(body["data"]["videos"]["videos"].as_array().unwrap().len(), 1);
    assert!(body["data"]["video_error"].is_null());

    let response = server.post(&format!("{}/content", LESSON_1_1_1)).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["content"]["story"].as_array().unwrap().len(), 2);

    let response = server
        .post(&format!("{}/complete", LESSON_1_1_1))
        .json(&json!({}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["completed"], true);

    let response = server.get("/api/courses/Korean/progress").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["total_lessons"], 700);
    assert_eq!(body["data"]["completed_lessons"], 1);
    assert_eq!(body["data"]["expanded_lessons"], 1);
    assert_eq!(body["data"]["attached_videos"], 1);
}

#[tokio::test]
async fn test_api_attach_videos_reports_skips() {
    let dirs = TestDirs::new();
    let generator = ScriptedGenerator::new(|kind, _, _| match kind {
        PromptKind::Relevance => Err(CourseError::GenerationUnavailable("busy".to_string())),
        other => Ok(happy_response(other)),
    });
    let server = create_test_server(&dirs, generator);
    server
        .post("/api/courses")
        .json(&json!({"subject": "Korean"}))
        .await
        .assert_status_ok();

    let response = server.post(&format!("{}/videos", LESSON_1_1_1)).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["videos"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["skipped"][0]["step"], "relevance");
    assert!(body["data"]["videos"][0]["relevance"].is_null());
}

#[tokio::test]
async fn test_api_questions_and_history() {
    let dirs = TestDirs::new();
    let server = server_with_course(&dirs).await;

    for question in ["What is 한글?", "How do I count?", "What is 받침?"] {
        server
            .post("/api/courses/Korean/questions")
            .json(&json!({"question": question}))
            .await
            .assert_status_ok();
    }

    let response = server
        .post("/api/courses/Korean/questions")
        .json(&json!({"question": "Which vowel?", "lesson": {"module": 1, "submodule": 1, "lesson": 1}}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["lesson"]["module"], 1);

    let response = server
        .get("/api/courses/Korean/history")
        .add_query_param("limit", 2)
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let history = body["data"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["query"], "Which vowel?");
    assert_eq!(history[1]["query"], "What is 받침?");

    let response = server
        .post("/api/courses/Korean/questions")
        .json(&json!({"question": ""}))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_api_difficulties() {
    let dirs = TestDirs::new();
    let server = server_with_course(&dirs).await;
    let path = format!("{}/difficulties", LESSON_1_1_1);

    server
        .post(&path)
        .json(&json!({"text": "ㅓ and ㅗ sound alike"}))
        .await
        .assert_status_ok();

    let response = server.get(&path).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"][0]["text"], "ㅓ and ㅗ sound alike");

    let response = server.post(&path).json(&json!({"text": " "})).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_api_audit() {
    let dirs = TestDirs::new();
    let server = server_with_course(&dirs).await;

    let response = server.get("/api/courses/Korean/audit").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["lessons"], 700);
    assert_eq!(body["data"]["issues"], json!([]));
}
