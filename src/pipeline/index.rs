//! Stage 3: chunk, embed, and write the annotated markdown into its collection.

use crate::{
    pipeline::types::StageError,
    processing::{IndexingOutcome, IndexingService},
    qdrant::ChunkProvenance,
};
use async_trait::async_trait;
use std::{path::Path, sync::Arc};

/// Writes a markdown document into a named vector collection.
#[async_trait]
pub trait Indexer: Send + Sync {
    /// Index `markdown` into `collection`, tagging every chunk with `provenance`.
    async fn index(
        &self,
        markdown: &Path,
        collection: &str,
        provenance: &ChunkProvenance,
    ) -> Result<IndexingOutcome, StageError>;
}

/// Indexer backed by the shared [`IndexingService`].
pub struct VectorIndexer {
    service: Arc<IndexingService>,
}

impl VectorIndexer {
    /// Wrap the indexing service.
    pub fn new(service: Arc<IndexingService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Indexer for VectorIndexer {
    async fn index(
        &self,
        markdown: &Path,
        collection: &str,
        provenance: &ChunkProvenance,
    ) -> Result<IndexingOutcome, StageError> {
        let text = tokio::fs::read_to_string(markdown)
            .await
            .map_err(|source| StageError::io(markdown, source))?;
        Ok(self
            .service
            .index_document(collection, &text, provenance)
            .await?)
    }
}
