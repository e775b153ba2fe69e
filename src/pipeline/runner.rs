//! Sequential execution of the three pipeline stages for one job.

use crate::{
    pipeline::{
        annotate::Annotator,
        extract::Extractor,
        index::Indexer,
        jobs::JobRegistry,
        types::{DocumentJob, JobState, Stage, StageError},
    },
    processing::IndexingOutcome,
    qdrant::ChunkProvenance,
};
use std::{future::Future, sync::Arc};
use thiserror::Error;

/// A stage failed and the remaining stages were skipped.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {error}")]
pub struct PipelineFailure {
    /// Stage that failed.
    pub stage: Stage,
    /// Underlying stage error.
    #[source]
    pub error: StageError,
}

/// Runs extraction, annotation, and indexing in order, halting at the first failure.
pub struct StageRunner {
    extractor: Arc<dyn Extractor>,
    annotator: Arc<dyn Annotator>,
    indexer: Arc<dyn Indexer>,
}

impl StageRunner {
    /// Assemble a runner from its three stages.
    pub fn new(
        extractor: Arc<dyn Extractor>,
        annotator: Arc<dyn Annotator>,
        indexer: Arc<dyn Indexer>,
    ) -> Self {
        Self {
            extractor,
            annotator,
            indexer,
        }
    }

    /// Drive `job` to `ready` or `failed`, recording every transition in `registry`.
    pub async fn run(
        &self,
        job: &DocumentJob,
        registry: &JobRegistry,
    ) -> Result<IndexingOutcome, PipelineFailure> {
        let artifacts = &job.artifacts;
        tracing::info!(
            job_id = %job.id,
            collection = %job.collection,
            filename = %job.filename,
            "Pipeline started"
        );

        let extraction = self
            .stage(job, registry, Stage::Extraction, self.extractor.extract(artifacts))
            .await?;

        let summary = self
            .stage(
                job,
                registry,
                Stage::Annotation,
                self.annotator.annotate(
                    &extraction.markdown,
                    &artifacts.asset_dir,
                    &artifacts.annotated_markdown,
                ),
            )
            .await?;
        tracing::info!(
            job_id = %job.id,
            images = summary.images,
            described = summary.described,
            missing = summary.missing,
            failed = summary.failed,
            "Images annotated"
        );

        let provenance = ChunkProvenance {
            source_file: Some(job.filename.clone()),
            job_id: Some(job.id.to_string()),
        };
        let outcome = self
            .stage(
                job,
                registry,
                Stage::Indexing,
                self.indexer
                    .index(&artifacts.annotated_markdown, &job.collection, &provenance),
            )
            .await?;

        registry.mark_ready(job.id, outcome.chunk_count).await;
        tracing::info!(
            job_id = %job.id,
            collection = %job.collection,
            chunks = outcome.chunk_count,
            "Pipeline finished; collection ready"
        );
        Ok(outcome)
    }

    async fn stage<T, F>(
        &self,
        job: &DocumentJob,
        registry: &JobRegistry,
        stage: Stage,
        work: F,
    ) -> Result<T, PipelineFailure>
    where
        F: Future<Output = Result<T, StageError>>,
    {
        registry.transition(job.id, JobState::running(stage)).await;
        tracing::debug!(job_id = %job.id, %stage, "Stage started");

        match work.await {
            Ok(value) => Ok(value),
            Err(error) => {
                let diagnostic = error.diagnostic();
                tracing::error!(
                    job_id = %job.id,
                    collection = %job.collection,
                    %stage,
                    diagnostic = %diagnostic,
                    "Stage failed; pipeline halted"
                );
                registry
                    .transition(job.id, JobState::Failed { stage, diagnostic })
                    .await;
                Err(PipelineFailure { stage, error })
            }
        }
    }
}
