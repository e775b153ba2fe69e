//! Error and outcome types for chunking, indexing, and retrieval.

use crate::{embedding::EmbeddingClientError, qdrant::QdrantError};
use anyhow::Error as TokenizerError;
use thiserror::Error;

/// Errors produced while turning raw text into semantic chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible token budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Embedding model we attempted to load.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Errors emitted while indexing a document or retrieving context for a question.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors for the input text.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Qdrant interaction failed.
    #[error("Qdrant request failed: {0}")]
    Qdrant(#[from] QdrantError),
    /// Returned embedding dimension does not match configuration.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension configured through `EMBEDDING_DIMENSION`.
        expected: usize,
        /// Dimension produced by the provider.
        actual: usize,
    },
    /// The document produced no indexable text.
    #[error("Document contains no indexable text")]
    EmptyDocument,
}

/// Summary of a completed indexing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexingOutcome {
    /// Number of points written to the collection.
    pub chunk_count: usize,
    /// Token budget used for chunking.
    pub chunk_size: usize,
    /// Chunks dropped because their text repeated an earlier chunk.
    pub skipped_duplicates: usize,
}
