//! Indexing service coordinating chunking, embedding, and Qdrant writes and reads.

use crate::{
    config::Config,
    embedding::EmbeddingClient,
    processing::{
        chunking::{MarkdownChunker, determine_chunk_size},
        mappers::{dedupe_chunks, hit_text},
        types::{IndexingOutcome, ProcessingError},
    },
    qdrant::{ChunkProvenance, PointInsert, QdrantService},
};
use async_trait::async_trait;
use std::sync::Arc;

/// Read access to the set of collections held by the vector store.
#[async_trait]
pub trait CollectionCatalog: Send + Sync {
    /// Names of every collection, queried fresh on each call.
    async fn list_collections(&self) -> Result<Vec<String>, ProcessingError>;
}

/// Similarity search returning chunk text for a question.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Text of the `top_k` chunks in `collection` closest to `question`, best first.
    async fn retrieve(
        &self,
        collection: &str,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<String>, ProcessingError>;
}

/// Chunking and vector parameters applied to every indexed document.
#[derive(Debug, Clone)]
pub struct IndexingSettings {
    /// Embedding model name, used to pick a tokenizer.
    pub model: String,
    /// Vector size every collection is created with.
    pub dimension: usize,
    /// Explicit per-chunk token budget, if configured.
    pub chunk_size_override: Option<usize>,
    /// Tokens shared between adjacent chunks.
    pub chunk_overlap: usize,
}

impl IndexingSettings {
    /// Extract indexing parameters from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.embedding_model.clone(),
            dimension: config.embedding_dimension,
            chunk_size_override: config.text_splitter_chunk_size,
            chunk_overlap: config.text_splitter_chunk_overlap,
        }
    }
}

/// Turns annotated markdown into a populated collection and answers similarity queries.
///
/// Construct once near process start and share through an `Arc`; the HTTP server, the
/// background pipeline, and the CLI all reuse the same instance.
pub struct IndexingService {
    embedding_client: Arc<dyn EmbeddingClient>,
    qdrant_service: QdrantService,
    settings: IndexingSettings,
}

impl IndexingService {
    /// Assemble the service from its collaborators.
    pub fn new(
        embedding_client: Arc<dyn EmbeddingClient>,
        qdrant_service: QdrantService,
        settings: IndexingSettings,
    ) -> Self {
        Self {
            embedding_client,
            qdrant_service,
            settings,
        }
    }

    /// Chunk, embed, and write a document into a fresh collection.
    ///
    /// Every embedding is computed before the collection is created, so provider failures never
    /// leave an empty collection behind. If writing points fails, the collection is dropped.
    pub async fn index_document(
        &self,
        collection_name: &str,
        text: &str,
        provenance: &ChunkProvenance,
    ) -> Result<IndexingOutcome, ProcessingError> {
        let settings = &self.settings;
        let chunk_size = determine_chunk_size(settings.chunk_size_override);
        tracing::debug!(
            collection = collection_name,
            chunk_size,
            overlap = settings.chunk_overlap,
            model = %settings.model,
            "Chunking document"
        );

        let chunks = MarkdownChunker::new(&settings.model, chunk_size, settings.chunk_overlap)?
            .chunk(text);
        let (prepared, skipped_duplicates) = dedupe_chunks(chunks);
        if prepared.is_empty() {
            return Err(ProcessingError::EmptyDocument);
        }

        let texts: Vec<String> = prepared.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.embedding_client.generate_embeddings(texts).await?;
        for vector in &embeddings {
            self.check_dimension(vector.len())?;
        }

        let points: Vec<PointInsert> = prepared
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, vector)| PointInsert {
                text: chunk.text,
                chunk_hash: chunk.chunk_hash,
                chunk_index: chunk.chunk_index,
                vector,
            })
            .collect();

        self.qdrant_service
            .create_collection(collection_name, settings.dimension as u64)
            .await?;

        let chunk_count = match self
            .qdrant_service
            .upsert_points(collection_name, points, provenance)
            .await
        {
            Ok(written) => written,
            Err(error) => {
                if let Err(cleanup) = self.qdrant_service.delete_collection(collection_name).await
                {
                    tracing::warn!(
                        collection = collection_name,
                        error = %cleanup,
                        "Failed to drop partially indexed collection"
                    );
                }
                return Err(error.into());
            }
        };

        tracing::info!(
            collection = collection_name,
            chunks = chunk_count,
            chunk_size,
            skipped_duplicates,
            "Document indexed"
        );

        Ok(IndexingOutcome {
            chunk_count,
            chunk_size,
            skipped_duplicates,
        })
    }

    /// Return the text of the `top_k` chunks most similar to `question`, best first.
    pub async fn retrieve(
        &self,
        collection_name: &str,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<String>, ProcessingError> {
        let mut vectors = self
            .embedding_client
            .generate_embeddings(vec![question.to_string()])
            .await?;
        let vector = vectors
            .pop()
            .ok_or(ProcessingError::DimensionMismatch {
                expected: self.settings.dimension,
                actual: 0,
            })?;
        self.check_dimension(vector.len())?;

        let hits = self
            .qdrant_service
            .search_points(collection_name, vector, top_k.max(1))
            .await?;
        tracing::debug!(collection = collection_name, hits = hits.len(), "Retrieved context");
        Ok(hits.into_iter().filter_map(hit_text).collect())
    }

    /// Enumerate all collections currently known to Qdrant.
    pub async fn list_collections(&self) -> Result<Vec<String>, ProcessingError> {
        Ok(self.qdrant_service.list_collections().await?)
    }

    fn check_dimension(&self, actual: usize) -> Result<(), ProcessingError> {
        let expected = self.settings.dimension;
        if actual == expected {
            Ok(())
        } else {
            Err(ProcessingError::DimensionMismatch { expected, actual })
        }
    }
}

#[async_trait]
impl CollectionCatalog for IndexingService {
    async fn list_collections(&self) -> Result<Vec<String>, ProcessingError> {
        IndexingService::list_collections(self).await
    }
}

#[async_trait]
impl ContextRetriever for IndexingService {
    async fn retrieve(
        &self,
        collection: &str,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<String>, ProcessingError> {
        IndexingService::retrieve(self, collection, question, top_k).await
    }
}
