//! Upload-to-answer flow against mocked Qdrant and Ollama endpoints.
#![cfg(unix)]

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use httpmock::{
    Method::{GET, POST, PUT},
    MockServer,
};
use pdfrag::{
    api,
    config::{CONFIG, Config, EmbeddingProvider},
    retrieval::NOT_READY_MESSAGE,
    service::RagService,
};
use serde_json::{Value, json};
use tower::ServiceExt;

const BOUNDARY: &str = "pdfrag-e2e-boundary";

fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("pdfrag-e2e-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("scratch dir");
    dir
}

fn write_converter(root: &std::path::Path) -> PathBuf {
    let script = root.join(format!("fake_marker_{}.sh", uuid::Uuid::new_v4()));
    std::fs::write(
        &script,
        r#"#!/bin/sh
mkdir -p "$2/$3"
printf 'Quarterly revenue grew strongly.\n\n![chart](chart.png)\n' > "$2/$3/$3.md"
printf 'png-bytes' > "$2/$3/chart.png"
"#,
    )
    .expect("converter script");
    script
}

fn test_config(
    root: &std::path::Path,
    qdrant_url: String,
    ollama_url: String,
    llm_url: String,
) -> Config {
    let script = write_converter(root);
    Config {
        qdrant_url,
        qdrant_api_key: None,
        embedding_provider: EmbeddingProvider::Ollama,
        embedding_model: "nomic-embed-text".into(),
        embedding_dimension: 4,
        ollama_url,
        openai_api_key: None,
        openai_base_url: "https://api.openai.com/v1".into(),
        llm_api_key: "test-key".into(),
        llm_base_url: llm_url,
        llm_model: "gpt-oss:120b".into(),
        llm_temperature: 0.7,
        vision_model: "qwen3-vl:235b-cloud".into(),
        vision_concurrency: 1,
        extract_command: format!("sh {} {{input}} {{output_dir}} {{stem}}", script.display()),
        upload_dir: root.join("uploads"),
        work_dir: root.join("processed"),
        static_dir: root.join("frontend"),
        text_splitter_chunk_size: None,
        text_splitter_chunk_overlap: 50,
        retrieval_top_k: 5,
        upload_max_bytes: 1024 * 1024,
        server_port: None,
    }
}

/// The router reads the upload directory and body limit from the global config,
/// so every test shares one; service endpoints come from each test's own config.
fn install_global_config(root: &std::path::Path) -> &'static Config {
    CONFIG.get_or_init(|| {
        let unused = "http://127.0.0.1:9".to_string();
        test_config(root, unused.clone(), unused.clone(), unused)
    })
}

fn upload_request(filename: &str, content: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request")
}

fn chat_request(message: &str, collection: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/chat")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "message": message, "collection_identifier": collection }).to_string(),
        ))
        .expect("request")
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("router response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn wait_for_terminal_job(app: &Router, job_id: &str) -> Value {
    for _ in 0..200 {
        let request = Request::builder()
            .uri(format!("/jobs/{job_id}"))
            .body(Body::empty())
            .expect("request");
        let (status, job) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        if matches!(job["status"].as_str(), Some("ready" | "failed")) {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {job_id} did not finish");
}

#[tokio::test]
async fn upload_then_chat_after_indexing_completes() {
    let qdrant = MockServer::start_async().await;
    let ollama = MockServer::start_async().await;
    let hosted = MockServer::start_async().await;
    let root = scratch_dir();
    install_global_config(&root);
    let config = test_config(&root, qdrant.base_url(), ollama.base_url(), hosted.base_url());

    let mut empty_listing = qdrant
        .mock_async(|when, then| {
            when.method(GET).path("/collections");
            then.status(200)
                .json_body(json!({ "result": { "collections": [] } }));
        })
        .await;
    let create = qdrant
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/collections/E2E_Report")
                .json_body_partial(r#"{"vectors":{"size":4,"distance":"Cosine"}}"#);
            then.status(200).json_body(json!({ "result": true }));
        })
        .await;
    let upsert = qdrant
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/collections/E2E_Report/points")
                .query_param("wait", "true")
                .body_contains("Image Description:** A pie chart")
                .body_contains("\"source_file\":\"E2E Report.pdf\"");
            then.status(200)
                .json_body(json!({ "result": { "status": "completed" } }));
        })
        .await;
    let query = qdrant
        .mock_async(|when, then| {
            when.method(POST)
                .path("/collections/E2E_Report/points/query")
                .json_body_partial(r#"{"limit":5}"#);
            then.status(200).json_body(json!({
                "result": { "points": [
                    { "id": "p-1", "score": 0.75, "payload": { "text": "Quarterly revenue grew strongly." } }
                ] }
            }));
        })
        .await;

    ollama
        .mock_async(|when, then| {
            when.method(POST).path("/api/embed");
            then.status(200)
                .json_body(json!({ "embeddings": [[0.5, 0.25, 0.75, 1.0]] }));
        })
        .await;
    let vision = ollama
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/chat")
                .body_contains("\"images\"")
                .json_body_partial(r#"{"model":"qwen3-vl:235b-cloud"}"#);
            then.status(200).json_body(json!({
                "message": { "role": "assistant", "content": "A pie chart" },
                "done": true
            }));
        })
        .await;
    let generation = hosted
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/chat")
                .header("authorization", "Bearer test-key")
                .body_contains("Quarterly revenue grew strongly.");
            then.status(200).json_body(json!({
                "message": { "role": "assistant", "content": "Revenue grew strongly." },
                "done": true
            }));
        })
        .await;

    let service = RagService::from_config(&config).expect("service");
    let app = api::create_router(Arc::new(service));

    let (status, uploaded) = send(&app, upload_request("E2E Report.pdf", b"%PDF-1.7 e2e")).await;
    assert_eq!(status, StatusCode::OK, "{uploaded}");
    assert_eq!(uploaded["collection_identifier"], "E2E_Report");
    assert_eq!(uploaded["filename"], "E2E Report.pdf");
    let job_id = uploaded["job_id"].as_str().expect("job id").to_string();

    let job = wait_for_terminal_job(&app, &job_id).await;
    assert_eq!(job["status"], "ready", "{job}");
    assert_eq!(job["chunk_count"], 1);
    create.assert_async().await;
    upsert.assert_async().await;
    vision.assert_async().await;

    let (_, not_ready) = send(&app, chat_request("Anything?", "missing")).await;
    assert_eq!(not_ready["answer"], NOT_READY_MESSAGE);

    empty_listing.delete_async().await;
    qdrant
        .mock_async(|when, then| {
            when.method(GET).path("/collections");
            then.status(200).json_body(json!({
                "result": { "collections": [{ "name": "E2E_Report" }] }
            }));
        })
        .await;

    let (status, answer) = send(&app, chat_request("How did revenue do?", "E2E_Report")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(answer["answer"], "Revenue grew strongly.");
    query.assert_async().await;
    generation.assert_async().await;

    let (_, metrics) = send(
        &app,
        Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(metrics["uploads_accepted"], 1);
    assert_eq!(metrics["pipelines_succeeded"], 1);
    assert_eq!(metrics["chunks_indexed"], 1);
    assert_eq!(metrics["chat_answers"], 1);
    assert_eq!(metrics["chat_not_ready"], 1);
}

#[tokio::test]
async fn non_pdf_upload_is_rejected_before_storage() {
    let qdrant = MockServer::start_async().await;
    let root = scratch_dir();
    let global = install_global_config(&root);
    let config = test_config(&root, qdrant.base_url(), qdrant.base_url(), qdrant.base_url());

    let service = RagService::from_config(&config).expect("service");
    let app = api::create_router(Arc::new(service));

    let (status, body) = send(&app, upload_request("slides.pptx", b"not a pdf")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "detail": "Only PDF files are allowed." }));
    assert!(!global.upload_dir.join("slides.pptx").exists());
}
