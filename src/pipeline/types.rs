//! Job, state, and artifact types shared by the pipeline stages.

use crate::processing::ProcessingError;
use serde::Serialize;
use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use uuid::Uuid;

/// Identifier of a background ingestion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Allocate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// The three ordered processing stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// PDF to markdown conversion by the external converter.
    Extraction,
    /// Replacement of image references with generated descriptions.
    Annotation,
    /// Chunking, embedding, and writing the collection.
    Indexing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Extraction => "extraction",
            Stage::Annotation => "annotation",
            Stage::Indexing => "indexing",
        })
    }
}

/// Lifecycle of a document job.
///
/// `pending → extracting → annotating → indexing → ready`, or `failed` from any running stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobState {
    /// Registered, not yet started.
    Pending,
    /// Stage 1 running.
    Extracting,
    /// Stage 2 running.
    Annotating,
    /// Stage 3 running.
    Indexing,
    /// Collection fully written and queryable.
    Ready,
    /// A stage failed and the chain halted.
    Failed {
        /// Stage that failed.
        stage: Stage,
        /// Captured error output or error chain.
        diagnostic: String,
    },
}

impl JobState {
    /// Whether the job has stopped changing.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Ready | JobState::Failed { .. })
    }

    /// State entered when `stage` starts.
    pub fn running(stage: Stage) -> Self {
        match stage {
            Stage::Extraction => JobState::Extracting,
            Stage::Annotation => JobState::Annotating,
            Stage::Indexing => JobState::Indexing,
        }
    }
}

/// File locations produced and consumed by the stages of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactChain {
    /// Uploaded PDF.
    pub source: PathBuf,
    /// Per-job working directory, passed to the converter as its output root.
    pub job_dir: PathBuf,
    /// Directory the converter creates, named after the source stem.
    pub extract_dir: PathBuf,
    /// Markdown written by the converter.
    pub extracted_markdown: PathBuf,
    /// Directory holding extracted images.
    pub asset_dir: PathBuf,
    /// Markdown with image references replaced by descriptions.
    pub annotated_markdown: PathBuf,
}

impl ArtifactChain {
    /// Lay out the artifacts for `source` under `work_dir/<collection>`.
    pub fn new(work_dir: &Path, collection: &str, source: &Path) -> Self {
        let job_dir = work_dir.join(collection);
        Self::in_dir(job_dir, source)
    }

    /// Lay out the artifacts for `source` directly under `job_dir`.
    pub fn in_dir(job_dir: PathBuf, source: &Path) -> Self {
        let stem = file_stem(source);
        let extract_dir = job_dir.join(&stem);
        Self {
            source: source.to_path_buf(),
            extracted_markdown: extract_dir.join(format!("{stem}.md")),
            asset_dir: extract_dir.clone(),
            annotated_markdown: job_dir.join(format!("{stem}_described.md")),
            extract_dir,
            job_dir,
        }
    }

    /// Filename stem of the source document.
    pub fn stem(&self) -> String {
        file_stem(&self.source)
    }
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// One uploaded document moving through the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentJob {
    /// Job identifier.
    pub id: JobId,
    /// Filename as uploaded.
    pub filename: String,
    /// Collection the document is indexed into.
    pub collection: String,
    /// Artifact locations for each stage.
    pub artifacts: ArtifactChain,
    /// Current lifecycle state.
    #[serde(flatten)]
    pub state: JobState,
    /// Number of chunks written once ready.
    pub chunk_count: Option<usize>,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// RFC 3339 time of the last state change.
    pub updated_at: String,
}

impl DocumentJob {
    /// Whether the job still holds its collection identifier.
    pub fn is_in_flight(&self) -> bool {
        !self.state.is_terminal()
    }
}

/// Failure of a single pipeline stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// The extraction command template could not be turned into a command line.
    #[error("invalid extraction command: {0}")]
    InvalidCommand(String),
    /// The external converter could not be started.
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        /// Program named by the command template.
        program: String,
        /// Underlying spawn failure.
        #[source]
        source: std::io::Error,
    },
    /// The external converter exited unsuccessfully.
    #[error("converter exited with {status}\n{output}")]
    CommandFailed {
        /// Exit status description.
        status: String,
        /// Tail of captured stdout/stderr.
        output: String,
    },
    /// A stage finished without producing its declared artifact.
    #[error("expected output {} was not produced\n{output}", .path.display())]
    MissingArtifact {
        /// Declared artifact path.
        path: PathBuf,
        /// Tail of captured output, if any.
        output: String,
    },
    /// Reading or writing an artifact failed.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },
    /// Chunking, embedding, or writing the collection failed.
    #[error("indexing failed: {0}")]
    Indexing(#[from] ProcessingError),
}

impl StageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StageError::Io {
            path: path.into(),
            source,
        }
    }

    /// Render the error and its source chain as a single diagnostic string.
    pub fn diagnostic(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            let text = cause.to_string();
            if !message.contains(&text) {
                message.push_str(": ");
                message.push_str(&text);
            }
            source = cause.source();
        }
        message
    }
}
