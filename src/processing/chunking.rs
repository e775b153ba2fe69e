//! Splitting annotated markdown into overlapping, token-budgeted chunks.
//!
//! Documents are cut into 512-token chunks by default, each carrying up to 50 tokens of the
//! previous chunk's trailing words. Boundaries come from `semchunk-rs`, which prefers
//! paragraph, then line, then sentence, then word breaks. Tokens are counted with the embedding
//! model's `tiktoken-rs` encoding; models tiktoken does not know (every Ollama model) are
//! counted with `cl100k_base`.

use std::sync::Arc;

use semchunk_rs::Chunker;
use tiktoken_rs::{CoreBPE, cl100k_base, get_bpe_from_model};

use super::types::ChunkingError;

/// Token budget used when `TEXT_SPLITTER_CHUNK_SIZE` is unset.
pub(crate) const DEFAULT_CHUNK_SIZE: usize = 512;

/// Per-chunk token budget: the configured override, or [`DEFAULT_CHUNK_SIZE`].
pub(crate) fn determine_chunk_size(override_size: Option<usize>) -> usize {
    override_size.map_or(DEFAULT_CHUNK_SIZE, |size| size.max(1))
}

/// Splits one document at a time for a given embedding model.
pub(crate) struct MarkdownChunker {
    encoding: Arc<CoreBPE>,
    chunk_size: usize,
    overlap: usize,
}

impl MarkdownChunker {
    /// Overlap is capped at half of `chunk_size` so every chunk keeps fresh text.
    pub(crate) fn new(
        model: &str,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        let encoding = match get_bpe_from_model(model.trim()) {
            Ok(encoding) => encoding,
            Err(_) => {
                tracing::debug!(model, "No tiktoken mapping for model; counting with cl100k_base");
                cl100k_base().map_err(|source| ChunkingError::Tokenizer {
                    model: model.to_string(),
                    source,
                })?
            }
        };

        Ok(Self {
            encoding: Arc::new(encoding),
            chunk_size,
            overlap: overlap.min(chunk_size / 2),
        })
    }

    fn count(&self, text: &str) -> usize {
        self.encoding.encode_ordinary(text).len()
    }

    /// Chunk `text`. Whitespace-only input yields no chunks.
    pub(crate) fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        // Leave room for the carried-over tail.
        let encoding = Arc::clone(&self.encoding);
        let splitter = Chunker::new(
            self.chunk_size - self.overlap,
            Box::new(move |segment: &str| encoding.encode_ordinary(segment).len()),
        );
        let pieces = splitter.chunk(text);

        let mut chunks = Vec::with_capacity(pieces.len());
        if let Some(first) = pieces.first() {
            chunks.push(first.clone());
        }
        for pair in pieces.windows(2) {
            chunks.push(self.with_overlap(&pair[0], &pair[1]));
        }
        chunks
    }

    fn with_overlap(&self, previous: &str, current: &str) -> String {
        let tail = self.overlap_tail(previous);
        if tail.is_empty() {
            return current.to_string();
        }
        let combined = format!("{tail} {current}");
        if self.count(&combined) <= self.chunk_size {
            combined
        } else {
            current.to_string()
        }
    }

    /// Longest run of whole trailing words of `text` within the overlap budget.
    fn overlap_tail<'a>(&self, text: &'a str) -> &'a str {
        if self.overlap == 0 {
            return "";
        }
        let trimmed = text.trim_end();
        let mut after_space = true;
        let word_starts: Vec<usize> = trimmed
            .char_indices()
            .filter_map(|(offset, ch)| {
                let starts_word = after_space && !ch.is_whitespace();
                after_space = ch.is_whitespace();
                starts_word.then_some(offset)
            })
            .collect();

        let mut tail = "";
        for &start in word_starts.iter().rev() {
            let candidate = &trimmed[start..];
            if self.count(candidate) > self.overlap {
                break;
            }
            tail = candidate;
        }
        tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(text: &str) -> Vec<&str> {
        text.split_whitespace().collect()
    }

    fn report(sentences: usize) -> String {
        (1..=sentences)
            .map(|n| format!("Revenue in region {n} grew steadily over the quarter."))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn default_budget_is_512_tokens() {
        assert_eq!(DEFAULT_CHUNK_SIZE, 512);
        assert_eq!(determine_chunk_size(None), 512);
        assert_eq!(determine_chunk_size(Some(300)), 300);
        assert_eq!(determine_chunk_size(Some(0)), 1);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let error = MarkdownChunker::new("nomic-embed-text", 0, 0)
            .err()
            .expect("zero budget");
        assert!(matches!(error, ChunkingError::InvalidChunkSize));
    }

    #[test]
    fn overlap_is_capped_at_half_the_budget() {
        let chunker = MarkdownChunker::new("nomic-embed-text", 10, 50).expect("chunker");
        assert_eq!(chunker.overlap, 5);
    }

    #[test]
    fn blank_input_yields_no_chunks() {
        let chunker = MarkdownChunker::new("nomic-embed-text", 64, 8).expect("chunker");
        assert!(chunker.chunk(" \n\n\t ").is_empty());
    }

    #[test]
    fn short_document_is_a_single_chunk() {
        let chunker = MarkdownChunker::new("nomic-embed-text", 512, 50).expect("chunker");
        let text = "Quarterly revenue grew strongly.\n\n> **Image Description:** A pie chart";
        let chunks = chunker.chunk(text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(words(&chunks[0]), words(text));
    }

    #[test]
    fn overlap_tail_takes_whole_trailing_words() {
        let chunker = MarkdownChunker::new("nomic-embed-text", 64, 3).expect("chunker");
        assert_eq!(chunker.overlap_tail("one two three four five  "), "three four five");
    }

    #[test]
    fn chunks_respect_budget_and_share_boundary_words() {
        let chunker = MarkdownChunker::new("nomic-embed-text", 40, 10).expect("chunker");
        let chunks = chunker.chunk(&report(30));

        assert!(chunks.len() > 2);
        for chunk in &chunks {
            assert!(chunker.count(chunk) <= 40, "chunk over budget: {chunk}");
        }
        let shares_boundary = chunks.windows(2).any(|pair| {
            let before = words(&pair[0]);
            let after = words(&pair[1]);
            (1..=before.len().min(after.len()))
                .any(|n| before[before.len() - n..] == after[..n])
        });
        assert!(shares_boundary, "no chunk repeats its predecessor's tail");
    }

    #[test]
    fn chunks_without_overlap_keep_every_word_in_order() {
        let chunker = MarkdownChunker::new("nomic-embed-text", 8, 0).expect("chunker");
        let text = "# Title\n\nFirst paragraph about revenue.\n\n> **Image Description:** A bar chart.\n\nClosing words here.";
        let chunks = chunker.chunk(text);

        assert!(chunks.len() > 1);
        let rebuilt: Vec<&str> = chunks.iter().flat_map(|chunk| words(chunk)).collect();
        assert_eq!(rebuilt, words(text));
    }

    #[test]
    fn openai_models_use_their_own_encoding() {
        let chunker = MarkdownChunker::new("text-embedding-3-small", 5, 0).expect("chunker");
        let chunks = chunker.chunk("The quick brown fox jumps over the lazy dog.");
        for chunk in &chunks {
            assert!(chunker.count(chunk) <= 5);
        }
    }
}
