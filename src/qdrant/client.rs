//! HTTP client wrapper for interacting with Qdrant.

use crate::config::Config;
use crate::qdrant::{
    payload::{build_payload, current_timestamp_rfc3339, generate_point_id},
    types::{
        ChunkProvenance, ListCollectionsResponse, PointInsert, QdrantError, QueryResponse,
        QueryResponseResult, ScoredPoint,
    },
};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};

const UPSERT_BATCH_SIZE: usize = 256;

/// Lightweight HTTP client for Qdrant operations.
pub struct QdrantService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl QdrantService {
    /// Construct a new client from the loaded configuration.
    pub fn new(config: &Config) -> Result<Self, QdrantError> {
        let client = Client::builder().user_agent("pdfrag/0.1").build()?;

        let base_url = normalize_base_url(&config.qdrant_url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = %config
                .qdrant_api_key
                .as_deref()
                .map(|value| !value.is_empty())
                .unwrap_or(false),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key: config.qdrant_api_key.clone(),
        })
    }

    /// Create a collection with cosine distance and the specified vector size.
    pub async fn create_collection(
        &self,
        collection_name: &str,
        vector_size: u64,
    ) -> Result<(), QdrantError> {
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}"))
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, vector_size, "Collection created");
        })
        .await
    }

    /// Drop a collection and all of its points. Missing collections are not an error.
    pub async fn delete_collection(&self, collection_name: &str) -> Result<(), QdrantError> {
        let response = self
            .request(Method::DELETE, &format!("collections/{collection_name}"))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, "Collection deleted");
        })
        .await
    }

    /// Retrieve the names of all collections present in Qdrant.
    pub async fn list_collections(&self) -> Result<Vec<String>, QdrantError> {
        let response = self.request(Method::GET, "collections").send().await?;

        if response.status().is_success() {
            let payload: ListCollectionsResponse = response.json().await?;
            let names = payload
                .result
                .collections
                .into_iter()
                .map(|collection| collection.name)
                .collect();
            Ok(names)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Failed to list collections");
            Err(error)
        }
    }

    /// Upload vectors to the given collection, waiting for Qdrant to apply each batch.
    ///
    /// Returns the number of points written.
    pub async fn upsert_points(
        &self,
        collection_name: &str,
        points: Vec<PointInsert>,
        provenance: &ChunkProvenance,
    ) -> Result<usize, QdrantError> {
        if points.is_empty() {
            return Ok(0);
        }

        let now = current_timestamp_rfc3339();
        let serialized: Vec<Value> = points
            .into_iter()
            .map(|point| {
                let payload = build_payload(
                    &point.text,
                    &point.chunk_hash,
                    point.chunk_index,
                    &now,
                    provenance,
                );
                json!({
                    "id": generate_point_id(),
                    "vector": point.vector,
                    "payload": payload,
                })
            })
            .collect();

        let mut written = 0;
        for batch in serialized.chunks(UPSERT_BATCH_SIZE) {
            let response = self
                .request(
                    Method::PUT,
                    &format!("collections/{collection_name}/points"),
                )
                .query(&[("wait", true)])
                .json(&json!({ "points": batch }))
                .send()
                .await?;

            self.ensure_success(response, || {
                tracing::debug!(
                    collection = collection_name,
                    points = batch.len(),
                    "Points indexed"
                );
            })
            .await?;
            written += batch.len();
        }

        Ok(written)
    }

    /// Perform a similarity search against a collection, returning scored payloads.
    pub async fn search_points(
        &self,
        collection_name: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, QdrantError> {
        let body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
        });

        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/query"),
            )
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(collection = collection_name, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        Ok(points
            .into_iter()
            .map(|point| ScoredPoint {
                id: stringify_point_id(point.id),
                score: point.score,
                payload: point.payload,
            })
            .collect())
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), QdrantError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{
        Method::{DELETE, GET, POST, PUT},
        MockServer,
    };

    fn service(base_url: String) -> QdrantService {
        QdrantService {
            client: Client::builder()
                .user_agent("pdfrag-test")
                .build()
                .expect("client"),
            base_url,
            api_key: Some("qdrant-key".into()),
        }
    }

    #[tokio::test]
    async fn search_points_emits_expected_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/demo/points/query")
                    .header("api-key", "qdrant-key")
                    .json_body_partial(r#"{"limit":5,"with_payload":true}"#);
                then.status(200).json_body(json!({
                    "status": "ok",
                    "time": 0.0,
                    "result": {
                        "points": [
                            { "id": "p-1", "score": 0.5, "payload": { "text": "Example" } },
                            { "id": 7, "score": 0.25, "payload": { "text": "Other" } }
                        ]
                    }
                }));
            })
            .await;

        let results = service(server.base_url())
            .search_points("demo", vec![0.5, 0.25], 5)
            .await
            .expect("search request");

        mock.assert_async().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "p-1");
        assert_eq!(results[1].id, "7");
        let payload = results[0].payload.as_ref().expect("payload");
        assert_eq!(payload["text"], Value::String("Example".into()));
    }

    #[tokio::test]
    async fn list_collections_returns_names() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections");
                then.status(200).json_body(json!({
                    "result": { "collections": [{ "name": "alpha" }, { "name": "beta" }] }
                }));
            })
            .await;

        let names = service(server.base_url())
            .list_collections()
            .await
            .expect("names");
        assert_eq!(names, vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[tokio::test]
    async fn upsert_points_waits_and_counts() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/report/points")
                    .query_param("wait", "true")
                    .body_contains("\"source_file\":\"report.pdf\"");
                then.status(200).json_body(json!({ "result": { "status": "completed" } }));
            })
            .await;

        let points = vec![
            PointInsert {
                text: "one".into(),
                chunk_hash: "h1".into(),
                chunk_index: 0,
                vector: vec![1.0, 0.0],
            },
            PointInsert {
                text: "two".into(),
                chunk_hash: "h2".into(),
                chunk_index: 1,
                vector: vec![0.0, 1.0],
            },
        ];
        let provenance = ChunkProvenance {
            source_file: Some("report.pdf".into()),
            job_id: None,
        };
        let written = service(server.base_url())
            .upsert_points("report", points, &provenance)
            .await
            .expect("upsert");

        mock.assert_async().await;
        assert_eq!(written, 2);
    }

    #[tokio::test]
    async fn delete_collection_tolerates_missing() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(DELETE).path("/collections/ghost");
                then.status(404).body("not found");
            })
            .await;

        service(server.base_url())
            .delete_collection("ghost")
            .await
            .expect("missing collection is fine");
    }

    #[test]
    fn base_url_is_normalized() {
        assert_eq!(
            normalize_base_url("http://localhost:6333/").expect("url"),
            "http://localhost:6333/"
        );
        assert_eq!(
            format_endpoint("http://localhost:6333/", "/collections"),
            "http://localhost:6333/collections"
        );
    }
}
