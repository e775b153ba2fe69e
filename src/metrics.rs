use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing upload, pipeline, and chat activity.
#[derive(Default)]
pub struct PipelineMetrics {
    uploads_accepted: AtomicU64,
    pipelines_succeeded: AtomicU64,
    pipelines_failed: AtomicU64,
    chunks_indexed: AtomicU64,
    chat_answers: AtomicU64,
    chat_not_ready: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted upload.
    pub fn record_upload(&self) {
        self.uploads_accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a pipeline that reached the ready state with the given chunk count.
    pub fn record_success(&self, chunk_count: u64) {
        self.pipelines_succeeded.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a pipeline that halted on a failed stage.
    pub fn record_failure(&self) {
        self.pipelines_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a chat request, distinguishing generated answers from readiness short-circuits.
    pub fn record_chat(&self, answered: bool) {
        if answered {
            self.chat_answers.fetch_add(1, Ordering::Relaxed);
        } else {
            self.chat_not_ready.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uploads_accepted: self.uploads_accepted.load(Ordering::Relaxed),
            pipelines_succeeded: self.pipelines_succeeded.load(Ordering::Relaxed),
            pipelines_failed: self.pipelines_failed.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            chat_answers: self.chat_answers.load(Ordering::Relaxed),
            chat_not_ready: self.chat_not_ready.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Uploads accepted since startup.
    pub uploads_accepted: u64,
    /// Pipelines that produced a ready collection.
    pub pipelines_succeeded: u64,
    /// Pipelines that halted on a failed stage.
    pub pipelines_failed: u64,
    /// Total chunks written across all successful pipelines.
    pub chunks_indexed: u64,
    /// Chat requests answered by the generation model.
    pub chat_answers: u64,
    /// Chat requests short-circuited because the collection was not ready.
    pub chat_not_ready: u64,
}
