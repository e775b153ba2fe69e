//! Process-wide application context shared by the HTTP server and the CLI.

use crate::{
    config::Config,
    embedding::{EmbeddingClientError, build_embedding_client},
    llm::{LlmClientError, OllamaChatClient},
    metrics::{MetricsSnapshot, PipelineMetrics},
    pipeline::{
        CommandExtractor, DocumentJob, ImageAnnotator, JobId, JobRegistry, PipelineCoordinator,
        StageRunner, StoredDocument, Submission, VectorIndexer,
    },
    processing::{IndexingService, IndexingSettings, ProcessingError},
    qdrant::{QdrantError, QdrantService},
    retrieval::{ChatFacade, ReadinessCheck},
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while building or using the application context.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Embedding client could not be constructed.
    #[error("Embedding client setup failed: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Chat-model client could not be constructed.
    #[error("Model client setup failed: {0}")]
    Llm(#[from] LlmClientError),
    /// Qdrant client could not be constructed.
    #[error("Qdrant client setup failed: {0}")]
    Qdrant(#[from] QdrantError),
    /// The vector store could not be queried.
    #[error("Vector store unavailable: {0}")]
    Store(#[from] ProcessingError),
}

/// Operations exposed to the HTTP surface.
#[async_trait]
pub trait RagApi: Send + Sync {
    /// Register a stored upload and start its pipeline in the background.
    async fn schedule_ingestion(&self, document: StoredDocument)
    -> Result<Submission, ServiceError>;

    /// Answer a question against a collection, or explain that it is not ready.
    async fn answer(&self, message: &str, collection: &str) -> String;

    /// Look up one job.
    async fn job(&self, id: JobId) -> Option<DocumentJob>;

    /// Every job known to this process.
    async fn jobs(&self) -> Vec<DocumentJob>;

    /// Collections currently held by the vector store.
    async fn list_collections(&self) -> Result<Vec<String>, ServiceError>;

    /// Current counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Owns every long-lived client and the job registry. Build once at startup and share via `Arc`.
pub struct RagService {
    indexing: Arc<IndexingService>,
    coordinator: PipelineCoordinator,
    chat: ChatFacade,
    metrics: Arc<PipelineMetrics>,
}

impl RagService {
    /// Construct all clients from configuration.
    pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
        tracing::info!("Initializing embedding client");
        let embedding_client = build_embedding_client(config)?;
        let qdrant = QdrantService::new(config)?;
        let indexing = Arc::new(IndexingService::new(
            embedding_client,
            qdrant,
            IndexingSettings::from_config(config),
        ));

        let generator = Arc::new(OllamaChatClient::for_generation(config)?);
        let vision = Arc::new(OllamaChatClient::for_vision(config)?);
        tracing::info!(
            llm_model = %config.llm_model,
            vision_model = %config.vision_model,
            "Model clients initialized"
        );

        let runner = Arc::new(StageRunner::new(
            Arc::new(CommandExtractor::new(config.extract_command.clone())),
            Arc::new(ImageAnnotator::new(vision, config.vision_concurrency)),
            Arc::new(VectorIndexer::new(Arc::clone(&indexing))),
        ));
        let registry = Arc::new(JobRegistry::new());
        let metrics = Arc::new(PipelineMetrics::new());

        let coordinator = PipelineCoordinator::new(
            Arc::clone(&registry),
            runner,
            indexing.clone(),
            Arc::clone(&metrics),
            config.work_dir.clone(),
        );
        let chat = ChatFacade::new(
            ReadinessCheck::new(indexing.clone(), registry),
            indexing.clone(),
            generator,
            Arc::clone(&metrics),
            config.retrieval_top_k,
        );

        Ok(Self {
            indexing,
            coordinator,
            chat,
            metrics,
        })
    }

    /// Shared indexing service.
    pub fn indexing(&self) -> &Arc<IndexingService> {
        &self.indexing
    }
}

#[async_trait]
impl RagApi for RagService {
    async fn schedule_ingestion(
        &self,
        document: StoredDocument,
    ) -> Result<Submission, ServiceError> {
        Ok(self.coordinator.submit(document).await?)
    }

    async fn answer(&self, message: &str, collection: &str) -> String {
        self.chat.answer(message, collection).await
    }

    async fn job(&self, id: JobId) -> Option<DocumentJob> {
        self.coordinator.registry().get(id).await
    }

    async fn jobs(&self) -> Vec<DocumentJob> {
        self.coordinator.registry().list().await
    }

    async fn list_collections(&self) -> Result<Vec<String>, ServiceError> {
        Ok(self.indexing.list_collections().await?)
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
