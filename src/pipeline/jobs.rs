//! In-memory registry of document jobs and collection identifier arbitration.

use crate::{
    pipeline::{
        naming::{disambiguate, sanitize_collection_name},
        types::{ArtifactChain, DocumentJob, JobId, JobState, file_stem},
    },
    qdrant::payload::current_timestamp_rfc3339,
};
use std::{
    collections::{HashMap, VecDeque},
    path::{Path, PathBuf},
};
use tokio::sync::RwLock;

/// Inputs needed to register a job for an uploaded file.
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Filename as uploaded.
    pub filename: String,
    /// Where the upload was stored.
    pub source: PathBuf,
    /// SHA-256 hex digest of the uploaded bytes.
    pub content_hash: String,
}

/// Result of claiming a collection identifier for an upload.
#[derive(Debug, Clone)]
pub enum Reservation {
    /// A new job owns the identifier and should be run.
    Scheduled(DocumentJob),
    /// The same content is already indexed (or being indexed) under this identifier.
    AlreadyIndexed {
        /// Identifier the caller should chat against.
        collection: String,
    },
}

/// Finished jobs kept for status polling before the oldest are dropped.
pub const DEFAULT_RETAINED_FINISHED_JOBS: usize = 256;

#[derive(Default)]
struct Jobs {
    by_id: HashMap<JobId, DocumentJob>,
    /// Ready or failed jobs, oldest first.
    finished: VecDeque<JobId>,
}

impl Jobs {
    fn finish(&mut self, id: JobId, retain: usize) {
        self.finished.push_back(id);
        while self.finished.len() > retain {
            if let Some(evicted) = self.finished.pop_front() {
                self.by_id.remove(&evicted);
                tracing::debug!(job_id = %evicted, "Finished job evicted");
            }
        }
    }
}

/// Tracks the jobs created by this process. Jobs are never persisted.
///
/// In-flight jobs are always kept; only the most recent finished jobs stay queryable.
pub struct JobRegistry {
    jobs: RwLock<Jobs>,
    retain_finished: usize,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETAINED_FINISHED_JOBS)
    }
}

impl JobRegistry {
    /// Create an empty registry with the default retention.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry keeping at most `retain_finished` ready or failed jobs.
    pub fn with_retention(retain_finished: usize) -> Self {
        Self {
            jobs: RwLock::new(Jobs::default()),
            retain_finished,
        }
    }

    /// Pick a collection identifier for `request` and register a pending job for it.
    ///
    /// `existing` is the vector store's current collection list. An identifier is taken when it
    /// is in that list or held by an in-flight job. A taken name gets the content-hash suffix;
    /// if the suffixed name is also taken the upload is reported as already indexed.
    pub async fn reserve(
        &self,
        request: NewJob,
        work_dir: &Path,
        existing: &[String],
    ) -> Reservation {
        let candidate = sanitize_collection_name(&file_stem(Path::new(&request.filename)));

        let mut jobs = self.jobs.write().await;
        let taken = |name: &str| {
            existing.iter().any(|collection| collection == name)
                || jobs
                    .by_id
                    .values()
                    .any(|job| job.is_in_flight() && job.collection == name)
        };

        let collection = if !taken(&candidate) {
            candidate
        } else {
            let suffixed = disambiguate(&candidate, &request.content_hash);
            if taken(&suffixed) {
                tracing::info!(
                    filename = %request.filename,
                    collection = %suffixed,
                    "Identical upload already indexed"
                );
                return Reservation::AlreadyIndexed {
                    collection: suffixed,
                };
            }
            tracing::debug!(
                candidate = %candidate,
                collection = %suffixed,
                "Identifier taken; using content suffix"
            );
            suffixed
        };

        let now = current_timestamp_rfc3339();
        let job = DocumentJob {
            id: JobId::new(),
            filename: request.filename,
            artifacts: ArtifactChain::new(work_dir, &collection, &request.source),
            collection,
            state: JobState::Pending,
            chunk_count: None,
            created_at: now.clone(),
            updated_at: now,
        };
        jobs.by_id.insert(job.id, job.clone());
        Reservation::Scheduled(job)
    }

    /// Move a job to `state`. Returns `false` for unknown or already finished jobs.
    pub async fn transition(&self, id: JobId, state: JobState) -> bool {
        self.update(id, state, None).await
    }

    /// Mark a job ready after its collection has been fully written.
    pub async fn mark_ready(&self, id: JobId, chunk_count: usize) -> bool {
        self.update(id, JobState::Ready, Some(chunk_count)).await
    }

    async fn update(&self, id: JobId, state: JobState, chunk_count: Option<usize>) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.by_id.get_mut(&id).filter(|job| !job.state.is_terminal()) else {
            return false;
        };
        tracing::debug!(
            job_id = %id,
            collection = %job.collection,
            state = ?state,
            "Job state changed"
        );
        let finished = state.is_terminal();
        job.state = state;
        if chunk_count.is_some() {
            job.chunk_count = chunk_count;
        }
        job.updated_at = current_timestamp_rfc3339();
        if finished {
            jobs.finish(id, self.retain_finished);
        }
        true
    }

    /// Snapshot of one job.
    pub async fn get(&self, id: JobId) -> Option<DocumentJob> {
        self.jobs.read().await.by_id.get(&id).cloned()
    }

    /// Snapshot of every retained job, oldest first.
    pub async fn list(&self) -> Vec<DocumentJob> {
        let mut jobs: Vec<DocumentJob> =
            self.jobs.read().await.by_id.values().cloned().collect();
        jobs.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.filename.cmp(&b.filename))
        });
        jobs
    }

    /// Whether a job that has not yet finished owns `collection`.
    pub async fn is_in_flight(&self, collection: &str) -> bool {
        self.jobs
            .read()
            .await
            .by_id
            .values()
            .any(|job| job.is_in_flight() && job.collection == collection)
    }
}
