//! Three-stage ingestion pipeline: extraction, image annotation, and indexing.
//!
//! Each uploaded document becomes a [`DocumentJob`] that moves through
//! `pending → extracting → annotating → indexing → ready` (or `failed`). Stages hand off through
//! files on disk laid out by [`ArtifactChain`]; a stage only starts once the previous stage's
//! declared artifact exists.

pub mod annotate;
pub mod coordinator;
pub mod extract;
pub mod index;
pub mod jobs;
pub mod naming;
pub mod runner;
pub mod types;

pub use annotate::{AnnotationSummary, Annotator, ImageAnnotator};
pub use coordinator::{PipelineCoordinator, StoredDocument, Submission};
pub use extract::{CommandExtractor, Extraction, Extractor};
pub use index::{Indexer, VectorIndexer};
pub use jobs::{JobRegistry, NewJob, Reservation};
pub use naming::{disambiguate, sanitize_collection_name};
pub use runner::{PipelineFailure, StageRunner};
pub use types::{ArtifactChain, DocumentJob, JobId, JobState, Stage, StageError};
