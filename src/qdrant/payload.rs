//! Helpers for constructing and hashing Qdrant payloads.

use crate::qdrant::types::ChunkProvenance;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

/// Build the payload object stored alongside each indexed chunk.
pub(crate) fn build_payload(
    text: &str,
    chunk_hash: &str,
    chunk_index: usize,
    indexed_at: &str,
    provenance: &ChunkProvenance,
) -> Value {
    let mut payload = Map::new();
    payload.insert("text".into(), Value::String(text.to_string()));
    payload.insert("chunk_hash".into(), Value::String(chunk_hash.to_string()));
    payload.insert("chunk_index".into(), Value::from(chunk_index));
    payload.insert("indexed_at".into(), Value::String(indexed_at.to_string()));

    if let Some(source_file) = provenance
        .source_file
        .as_ref()
        .filter(|value| !value.trim().is_empty())
    {
        payload.insert("source_file".into(), Value::String(source_file.clone()));
    }

    if let Some(job_id) = provenance.job_id.as_ref() {
        payload.insert("job_id".into(), Value::String(job_id.clone()));
    }

    Value::Object(payload)
}

/// Compute a deterministic SHA-256 hex digest of the given bytes.
pub fn compute_content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    compute_content_hash(text.as_bytes())
}

/// Current timestamp formatted for payload storage.
pub fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Construct a point identifier accepted by Qdrant.
pub(crate) fn generate_point_id() -> String {
    Uuid::new_v4().to_string()
}
