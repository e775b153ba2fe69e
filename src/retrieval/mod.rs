//! Readiness checks and retrieval-augmented answering for chat requests.

use crate::{
    llm::GenerationClient,
    metrics::PipelineMetrics,
    pipeline::JobRegistry,
    processing::{CollectionCatalog, ContextRetriever},
    prompts::{CONTEXT_SEPARATOR, render_rag_prompt},
};
use std::sync::Arc;

/// Answer returned while a collection is missing or still being written.
pub const NOT_READY_MESSAGE: &str =
    "The document is still being processed or was not found. Please wait a moment and try again.";

/// Whether a collection can be queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Collection exists and no job is still writing it.
    Ready,
    /// Collection is absent, in flight, or the store could not be asked.
    NotReady,
}

/// Decides readiness from the live collection list plus the in-flight job set.
pub struct ReadinessCheck {
    catalog: Arc<dyn CollectionCatalog>,
    registry: Arc<JobRegistry>,
}

impl ReadinessCheck {
    /// Build a check over the given store and registry.
    pub fn new(catalog: Arc<dyn CollectionCatalog>, registry: Arc<JobRegistry>) -> Self {
        Self { catalog, registry }
    }

    /// Never errors: store failures are logged and reported as not ready.
    pub async fn check(&self, collection: &str) -> Readiness {
        if self.registry.is_in_flight(collection).await {
            tracing::debug!(collection, "Collection still being indexed");
            return Readiness::NotReady;
        }
        match self.catalog.list_collections().await {
            Ok(names) if names.iter().any(|name| name == collection) => Readiness::Ready,
            Ok(_) => {
                tracing::debug!(collection, "Collection not found");
                Readiness::NotReady
            }
            Err(error) => {
                tracing::warn!(
                    collection,
                    error = %error,
                    "Collection lookup failed; treating as not ready"
                );
                Readiness::NotReady
            }
        }
    }
}

/// Answers questions against one collection at a time. Holds no conversation state.
pub struct ChatFacade {
    readiness: ReadinessCheck,
    retriever: Arc<dyn ContextRetriever>,
    generator: Arc<dyn GenerationClient>,
    metrics: Arc<PipelineMetrics>,
    top_k: usize,
}

impl ChatFacade {
    /// Assemble the facade.
    pub fn new(
        readiness: ReadinessCheck,
        retriever: Arc<dyn ContextRetriever>,
        generator: Arc<dyn GenerationClient>,
        metrics: Arc<PipelineMetrics>,
        top_k: usize,
    ) -> Self {
        Self {
            readiness,
            retriever,
            generator,
            metrics,
            top_k: top_k.max(1),
        }
    }

    /// Produce an answer for `message` using context from `collection`.
    ///
    /// Retrieval or generation failures come back as an error marker string rather than `Err`.
    pub async fn answer(&self, message: &str, collection: &str) -> String {
        if self.readiness.check(collection).await == Readiness::NotReady {
            self.metrics.record_chat(false);
            return NOT_READY_MESSAGE.to_string();
        }
        self.metrics.record_chat(true);

        let chunks = match self.retriever.retrieve(collection, message, self.top_k).await {
            Ok(chunks) => chunks,
            Err(error) => {
                tracing::error!(collection, error = %error, "Context retrieval failed");
                return error_marker(&error);
            }
        };
        tracing::debug!(collection, chunks = chunks.len(), "Context retrieved");

        let prompt = render_rag_prompt(&chunks.join(CONTEXT_SEPARATOR), message);
        match self.generator.generate(&prompt).await {
            Ok(answer) => answer,
            Err(error) => {
                tracing::error!(collection, error = %error, "Answer generation failed");
                error_marker(&error)
            }
        }
    }
}

fn error_marker(error: &dyn std::fmt::Display) -> String {
    format!("[[ERROR: Could not generate an answer: {error}]]")
}
