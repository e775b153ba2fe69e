//! Chunk preparation and search-hit mapping helpers.

use crate::qdrant::{ScoredPoint, compute_chunk_hash};
use serde_json::Value;
use std::collections::HashSet;

/// Chunk text with its position and hash, ready for embedding.
#[derive(Debug, Clone)]
pub(crate) struct PreparedChunk {
    /// Chunk text content.
    pub(crate) text: String,
    /// Stable digest used for dedupe.
    pub(crate) chunk_hash: String,
    /// Position among the kept chunks of the document.
    pub(crate) chunk_index: usize,
}

/// Remove blank and duplicate chunks within a document, keeping first occurrences.
///
/// Returns the kept chunks and the number of duplicates dropped.
pub(crate) fn dedupe_chunks(chunks: Vec<String>) -> (Vec<PreparedChunk>, usize) {
    let mut seen = HashSet::new();
    let mut prepared = Vec::new();
    let mut skipped = 0;

    for text in chunks {
        if text.trim().is_empty() {
            continue;
        }
        let hash = compute_chunk_hash(&text);
        if seen.insert(hash.clone()) {
            let chunk_index = prepared.len();
            prepared.push(PreparedChunk {
                text,
                chunk_hash: hash,
                chunk_index,
            });
        } else {
            skipped += 1;
        }
    }

    (prepared, skipped)
}

/// Pull the stored chunk text out of a scored point, if any.
pub(crate) fn hit_text(point: ScoredPoint) -> Option<String> {
    let mut payload = point.payload?;
    match payload.remove("text") {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text),
        _ => None,
    }
}
