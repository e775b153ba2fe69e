//! Background scheduling of ingestion pipelines.

use crate::{
    metrics::PipelineMetrics,
    pipeline::{
        jobs::{JobRegistry, NewJob, Reservation},
        runner::StageRunner,
        types::JobId,
    },
    processing::{CollectionCatalog, ProcessingError},
};
use serde::Serialize;
use std::{path::PathBuf, sync::Arc};
use tracing::Instrument;

/// An upload persisted to disk and ready to be processed.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    /// Filename as uploaded.
    pub filename: String,
    /// Location of the stored file.
    pub path: PathBuf,
    /// SHA-256 hex digest of the stored bytes.
    pub content_hash: String,
}

/// What happened to a submitted upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Submission {
    /// A pipeline was started in the background.
    Scheduled {
        /// Job tracking the pipeline.
        job_id: JobId,
        /// Collection the document will be indexed into.
        collection: String,
    },
    /// Identical content is already indexed; nothing was started.
    AlreadyIndexed {
        /// Collection holding the existing index.
        collection: String,
    },
}

impl Submission {
    /// Collection identifier the client should chat against.
    pub fn collection(&self) -> &str {
        match self {
            Submission::Scheduled { collection, .. }
            | Submission::AlreadyIndexed { collection } => collection,
        }
    }

    /// Background job, if one was started.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            Submission::Scheduled { job_id, .. } => Some(*job_id),
            Submission::AlreadyIndexed { .. } => None,
        }
    }
}

/// Registers jobs for uploads and runs their pipelines off the request path.
///
/// There is no queue or concurrency limit: every submission spawns its own task.
pub struct PipelineCoordinator {
    registry: Arc<JobRegistry>,
    runner: Arc<StageRunner>,
    catalog: Arc<dyn CollectionCatalog>,
    metrics: Arc<PipelineMetrics>,
    work_dir: PathBuf,
}

impl PipelineCoordinator {
    /// Assemble the coordinator.
    pub fn new(
        registry: Arc<JobRegistry>,
        runner: Arc<StageRunner>,
        catalog: Arc<dyn CollectionCatalog>,
        metrics: Arc<PipelineMetrics>,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            registry,
            runner,
            catalog,
            metrics,
            work_dir,
        }
    }

    /// Claim an identifier for `document` and start its pipeline without waiting for it.
    ///
    /// Fails only when the vector store cannot be asked which collections exist.
    pub async fn submit(&self, document: StoredDocument) -> Result<Submission, ProcessingError> {
        let existing = self.catalog.list_collections().await?;
        self.metrics.record_upload();

        let reservation = self
            .registry
            .reserve(
                NewJob {
                    filename: document.filename,
                    source: document.path,
                    content_hash: document.content_hash,
                },
                &self.work_dir,
                &existing,
            )
            .await;

        let job = match reservation {
            Reservation::Scheduled(job) => job,
            Reservation::AlreadyIndexed { collection } => {
                return Ok(Submission::AlreadyIndexed { collection });
            }
        };

        let submission = Submission::Scheduled {
            job_id: job.id,
            collection: job.collection.clone(),
        };
        let span = tracing::info_span!("pipeline", job_id = %job.id, collection = %job.collection);
        let runner = Arc::clone(&self.runner);
        let registry = Arc::clone(&self.registry);
        let metrics = Arc::clone(&self.metrics);
        tokio::spawn(
            async move {
                match runner.run(&job, &registry).await {
                    Ok(outcome) => metrics.record_success(outcome.chunk_count as u64),
                    Err(_) => metrics.record_failure(),
                }
            }
            .instrument(span),
        );

        Ok(submission)
    }

    /// Shared job registry.
    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }
}
