//! HTTP surface for the PDF RAG server.
//!
//! Routes:
//!
//! - `POST /upload` (alias `POST /upload-pdf/`) – Multipart upload of a single PDF in the `file`
//!   field. The file is stored under `UPLOAD_DIR`, a collection identifier is derived from its
//!   name, and the ingestion pipeline starts in the background.
//! - `POST /chat` – Answer `{ "message", "collection_identifier" }` against an indexed document.
//! - `GET /` and `GET /chat` – Static upload and chat pages from `STATIC_DIR`.
//! - `GET /jobs`, `GET /jobs/:id` – Pipeline job status.
//! - `GET /collections` – Qdrant collections.
//! - `GET /metrics` – Upload, pipeline, and chat counters.

use crate::{
    config::get_config,
    pipeline::{DocumentJob, JobId, StoredDocument, Submission},
    service::{RagApi, ServiceError},
};
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Path as RoutePath, State,
        multipart::{Field, Multipart, MultipartError},
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::{path::Path, sync::Arc};
use tokio::io::AsyncWriteExt;

const ONLY_PDF: &str = "Only PDF files are allowed.";
const UPLOAD_DIR_HASH_CHARS: usize = 8;

/// Build the HTTP router.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: RagApi + 'static,
{
    let body_limit = get_config().upload_max_bytes;
    Router::new()
        .route("/", get(index_page))
        .route("/upload", post(upload_document::<S>))
        .route("/upload-pdf/", post(upload_document::<S>))
        .route("/chat", get(chat_page).post(chat::<S>))
        .route("/jobs", get(list_jobs::<S>))
        .route("/jobs/:id", get(get_job::<S>))
        .route("/collections", get(list_collections::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(service)
}

/// Success response for uploads.
#[derive(Serialize)]
struct UploadResponse {
    filename: String,
    message: String,
    path: String,
    collection_identifier: String,
    /// Same value as `collection_identifier`, under the name the bundled pages read.
    collection_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<JobId>,
}

/// Store an uploaded PDF and schedule its ingestion.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError>
where
    S: RagApi,
{
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(base_filename)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AppError::BadRequest(ONLY_PDF.into()))?;
        if !is_pdf(&filename) {
            return Err(AppError::BadRequest(ONLY_PDF.into()));
        }

        let document = store_upload(field, &get_config().upload_dir, &filename).await?;
        tracing::info!(
            filename = %document.filename,
            path = %document.path.display(),
            "Upload stored"
        );
        let path = document.path.display().to_string();
        let submission = service.schedule_ingestion(document).await?;

        let message = match &submission {
            Submission::Scheduled { .. } => format!(
                "File '{filename}' uploaded successfully. Processing started in background."
            ),
            Submission::AlreadyIndexed { .. } => {
                format!("File '{filename}' is already indexed. Chat with it right away.")
            }
        };
        let collection = submission.collection().to_string();
        return Ok(Json(UploadResponse {
            collection_name: collection.clone(),
            collection_identifier: collection,
            job_id: submission.job_id(),
            filename,
            message,
            path,
        }));
    }

    Err(AppError::BadRequest("Missing multipart field 'file'.".into()))
}

/// Strip any client-supplied directory components.
fn base_filename(raw: &str) -> String {
    raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim().to_string()
}

fn is_pdf(filename: &str) -> bool {
    filename.to_ascii_lowercase().ends_with(".pdf")
}

/// Stream a multipart field to `upload_dir/<hash8>/filename`, hashing as it goes.
///
/// Data lands in a staging file that is renamed into place once complete. Keying the directory
/// on content means a later upload under the same filename never replaces bytes that an earlier
/// job has yet to read.
async fn store_upload(
    mut field: Field<'_>,
    upload_dir: &Path,
    filename: &str,
) -> Result<StoredDocument, AppError> {
    tokio::fs::create_dir_all(upload_dir).await?;
    let staging = upload_dir.join(format!(".{}.part", uuid::Uuid::new_v4()));

    let mut file = tokio::fs::File::create(&staging).await?;
    let mut hasher = Sha256::new();
    let written = async {
        while let Some(chunk) = field.chunk().await? {
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok::<_, AppError>(())
    }
    .await;
    drop(file);

    if let Err(error) = written {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(error);
    }
    let content_hash = hex::encode(hasher.finalize());
    let destination_dir = upload_dir.join(&content_hash[..UPLOAD_DIR_HASH_CHARS]);
    let destination = destination_dir.join(filename);
    let placed = async {
        tokio::fs::create_dir_all(&destination_dir).await?;
        tokio::fs::rename(&staging, &destination).await
    }
    .await;
    if let Err(error) = placed {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(error.into());
    }

    Ok(StoredDocument {
        filename: filename.to_string(),
        path: destination,
        content_hash,
    })
}

/// Request body for `POST /chat`.
#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(alias = "collection_name")]
    collection_identifier: String,
}

/// Response body for `POST /chat`.
#[derive(Serialize)]
struct ChatResponse {
    answer: String,
}

async fn chat<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<ChatRequest>,
) -> Json<ChatResponse>
where
    S: RagApi,
{
    tracing::info!(collection = %request.collection_identifier, "Chat request");
    let answer = service
        .answer(&request.message, &request.collection_identifier)
        .await;
    Json(ChatResponse { answer })
}

async fn index_page() -> Response {
    serve_page("index.html").await
}

async fn chat_page() -> Response {
    serve_page("chat.html").await
}

async fn serve_page(name: &str) -> Response {
    let path = get_config().static_dir.join(name);
    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Html(html).into_response(),
        Err(error) => {
            tracing::warn!(page = %path.display(), error = %error, "Static page unavailable");
            (
                StatusCode::NOT_FOUND,
                Html(format!("<h1>404 - {name} not found</h1>")),
            )
                .into_response()
        }
    }
}

#[derive(Serialize)]
struct JobsResponse {
    jobs: Vec<DocumentJob>,
}

async fn list_jobs<S>(State(service): State<Arc<S>>) -> Json<JobsResponse>
where
    S: RagApi,
{
    Json(JobsResponse {
        jobs: service.jobs().await,
    })
}

async fn get_job<S>(
    State(service): State<Arc<S>>,
    RoutePath(id): RoutePath<String>,
) -> Result<Json<DocumentJob>, AppError>
where
    S: RagApi,
{
    let not_found = || AppError::NotFound(format!("Job '{id}' not found."));
    let job_id: JobId = id.parse().map_err(|_| not_found())?;
    service.job(job_id).await.map(Json).ok_or_else(not_found)
}

/// Response body for `GET /collections`.
#[derive(Serialize)]
struct CollectionsResponse {
    collections: Vec<String>,
}

async fn list_collections<S>(
    State(service): State<Arc<S>>,
) -> Result<Json<CollectionsResponse>, AppError>
where
    S: RagApi,
{
    let collections = service.list_collections().await?;
    Ok(Json(CollectionsResponse { collections }))
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> impl IntoResponse
where
    S: RagApi,
{
    Json(service.metrics_snapshot())
}

/// Failures rendered as `{"detail": ...}` JSON.
#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Multipart(MultipartError),
    Storage(std::io::Error),
    Service(ServiceError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            AppError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            AppError::NotFound(detail) => (StatusCode::NOT_FOUND, detail),
            AppError::Multipart(error) => (error.status(), error.body_text()),
            AppError::Storage(error) => {
                tracing::error!(error = %error, "Failed to store upload");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to store the uploaded file.".to_string(),
                )
            }
            AppError::Service(error) => {
                tracing::error!(error = %error, "Request failed");
                (StatusCode::BAD_GATEWAY, error.to_string())
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<MultipartError> for AppError {
    fn from(inner: MultipartError) -> Self {
        Self::Multipart(inner)
    }
}

impl From<std::io::Error> for AppError {
    fn from(inner: std::io::Error) -> Self {
        Self::Storage(inner)
    }
}

impl From<ServiceError> for AppError {
    fn from(inner: ServiceError) -> Self {
        Self::Service(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::create_router;
    use crate::config::{CONFIG, Config, EmbeddingProvider};
    use crate::metrics::MetricsSnapshot;
    use crate::pipeline::{DocumentJob, JobId, StoredDocument, Submission};
    use crate::service::{RagApi, ServiceError};
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{Value, json};
    use std::{
        path::PathBuf,
        sync::{Arc, Once},
    };
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    const BOUNDARY: &str = "pdfrag-test-boundary";

    #[tokio::test]
    async fn upload_rejects_non_pdf_files() {
        ensure_test_config();
        let service = Arc::new(StubRagService::default());
        let app = create_router(service.clone());

        let response = app
            .oneshot(multipart_request("/upload", "notes.txt", b"plain text"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body, json!({ "detail": "Only PDF files are allowed." }));
        assert!(service.stored.lock().await.is_empty());
    }

    #[tokio::test]
    async fn upload_stores_file_and_schedules_ingestion() {
        ensure_test_config();
        let service = Arc::new(StubRagService::default());
        let app = create_router(service.clone());

        let response = app
            .oneshot(multipart_request(
                "/upload-pdf/",
                "Annual Report 2024.PDF",
                b"%PDF-1.7 body",
            ))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["filename"], "Annual Report 2024.PDF");
        assert_eq!(body["collection_identifier"], "stub-collection");
        assert_eq!(body["collection_name"], "stub-collection");
        assert!(body["job_id"].is_string());
        assert!(
            body["message"]
                .as_str()
                .expect("message")
                .contains("Processing started")
        );

        let stored = service.stored.lock().await;
        assert_eq!(stored.len(), 1);
        let document = &stored[0];
        assert_eq!(document.filename, "Annual Report 2024.PDF");
        assert_eq!(
            document.content_hash,
            crate::qdrant::compute_content_hash(b"%PDF-1.7 body")
        );
        assert_eq!(
            std::fs::read(&document.path).expect("stored file"),
            b"%PDF-1.7 body"
        );
    }

    #[tokio::test]
    async fn upload_drops_client_directories_from_filename() {
        ensure_test_config();
        let service = Arc::new(StubRagService::default());
        let app = create_router(service.clone());

        let response = app
            .oneshot(multipart_request("/upload", "../../etc/evil.pdf", b"%PDF"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let stored = service.stored.lock().await;
        assert_eq!(stored[0].filename, "evil.pdf");
        let hash = crate::qdrant::compute_content_hash(b"%PDF");
        assert_eq!(
            stored[0].path,
            test_upload_dir().join(&hash[..8]).join("evil.pdf")
        );
    }

    #[tokio::test]
    async fn repeated_filename_keeps_each_upload_intact() {
        ensure_test_config();
        let service = Arc::new(StubRagService::default());
        let app = create_router(service.clone());

        for content in [b"%PDF-1.7 first".as_slice(), b"%PDF-1.7 second".as_slice()] {
            let response = app
                .clone()
                .oneshot(multipart_request("/upload", "same-name.pdf", content))
                .await
                .expect("router response");
            assert_eq!(response.status(), StatusCode::OK);
        }

        let stored = service.stored.lock().await;
        assert_eq!(stored.len(), 2);
        assert_ne!(stored[0].path, stored[1].path);
        assert_eq!(
            std::fs::read(&stored[0].path).expect("first upload"),
            b"%PDF-1.7 first"
        );
        assert_eq!(
            std::fs::read(&stored[1].path).expect("second upload"),
            b"%PDF-1.7 second"
        );
        for document in stored.iter() {
            assert_eq!(
                document.path.file_name().and_then(|name| name.to_str()),
                Some("same-name.pdf")
            );
        }
    }

    #[tokio::test]
    async fn chat_accepts_collection_name_alias() {
        ensure_test_config();
        let service = Arc::new(StubRagService::default());
        let app = create_router(service.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({ "message": "What grew?", "collection_name": "report" })
                            .to_string(),
                    ))
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({ "answer": "answer about report: What grew?" })
        );
    }

    #[tokio::test]
    async fn unknown_or_malformed_job_ids_are_not_found() {
        ensure_test_config();
        let app = create_router(Arc::new(StubRagService::default()));

        for uri in ["/jobs/not-a-uuid", &format!("/jobs/{}", JobId::new())] {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .uri(uri)
                        .body(Body::empty())
                        .expect("request"),
                )
                .await
                .expect("router response");
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            let body = json_body(response).await;
            assert!(body["detail"].as_str().expect("detail").contains("not found"));
        }
    }

    #[tokio::test]
    async fn missing_static_page_returns_inline_404() {
        ensure_test_config();
        let app = create_router(Arc::new(StubRagService::default()));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).expect("request"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert!(String::from_utf8_lossy(&body).contains("index.html not found"));
    }

    #[tokio::test]
    async fn collections_and_metrics_are_exposed() {
        ensure_test_config();
        let app = create_router(Arc::new(StubRagService::default()));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/collections")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(
            json_body(response).await,
            json!({ "collections": ["stub-collection"] })
        );

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        let body = json_body(response).await;
        assert_eq!(body["uploads_accepted"], 0);
        assert_eq!(body["chat_answers"], 0);
    }

    fn multipart_request(uri: &str, filename: &str, content: &[u8]) -> Request<Body> {
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
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request")
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json body")
    }

    #[derive(Default)]
    struct StubRagService {
        stored: Mutex<Vec<StoredDocument>>,
    }

    #[async_trait]
    impl RagApi for StubRagService {
        async fn schedule_ingestion(
            &self,
            document: StoredDocument,
        ) -> Result<Submission, ServiceError> {
            self.stored.lock().await.push(document);
            Ok(Submission::Scheduled {
                job_id: JobId::new(),
                collection: "stub-collection".into(),
            })
        }

        async fn answer(&self, message: &str, collection: &str) -> String {
            format!("answer about {collection}: {message}")
        }

        async fn job(&self, _id: JobId) -> Option<DocumentJob> {
            None
        }

        async fn jobs(&self) -> Vec<DocumentJob> {
            Vec::new()
        }

        async fn list_collections(&self) -> Result<Vec<String>, ServiceError> {
            Ok(vec!["stub-collection".into()])
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot::default()
        }
    }

    fn test_upload_dir() -> PathBuf {
        std::env::temp_dir().join(format!("pdfrag-api-tests-{}", std::process::id()))
    }

    fn ensure_test_config() {
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            let root = test_upload_dir();
            let _ = CONFIG.set(Config {
                qdrant_url: "http://127.0.0.1:6333".into(),
                qdrant_api_key: None,
                embedding_provider: EmbeddingProvider::Ollama,
                embedding_model: "nomic-embed-text".into(),
                embedding_dimension: 768,
                ollama_url: "http://127.0.0.1:11434".into(),
                openai_api_key: None,
                openai_base_url: "https://api.openai.com/v1".into(),
                llm_api_key: "test-key".into(),
                llm_base_url: "https://ollama.com".into(),
                llm_model: "gpt-oss:120b".into(),
                llm_temperature: 0.7,
                vision_model: "qwen3-vl:235b-cloud".into(),
                vision_concurrency: 1,
                extract_command: "marker_single {input} --output_dir {output_dir}".into(),
                upload_dir: root.clone(),
                work_dir: root.join("processed"),
                static_dir: root.join("static-missing"),
                text_splitter_chunk_size: None,
                text_splitter_chunk_overlap: 50,
                retrieval_top_k: 5,
                upload_max_bytes: 10 * 1024 * 1024,
                server_port: None,
            });
        });
    }
}
