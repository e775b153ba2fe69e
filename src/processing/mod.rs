//! Document indexing: chunking, embedding, and Qdrant orchestration.

pub mod chunking;
mod mappers;
mod service;
pub mod types;

pub use service::{CollectionCatalog, ContextRetriever, IndexingService, IndexingSettings};
pub use types::{ChunkingError, IndexingOutcome, ProcessingError};
