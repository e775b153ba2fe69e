//! Qdrant vector store integration.

pub mod client;
pub mod payload;
pub mod types;

pub use client::QdrantService;
pub use payload::{compute_chunk_hash, compute_content_hash};
pub use types::{ChunkProvenance, PointInsert, QdrantError, ScoredPoint};
