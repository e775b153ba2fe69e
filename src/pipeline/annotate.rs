//! Stage 2: replace image references with vision-model descriptions.

use crate::{llm::VisionClient, pipeline::types::StageError};
use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use regex::Regex;
use std::{
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
};

static IMAGE_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[.*?\]\((.*?)\)").expect("valid image pattern"));

/// Counts of how each image reference was resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnnotationSummary {
    /// Image references found in the markdown.
    pub images: usize,
    /// References replaced by a generated description.
    pub described: usize,
    /// References whose asset file was absent.
    pub missing: usize,
    /// References whose description request failed.
    pub failed: usize,
}

/// Rewrites extracted markdown so every image reference becomes text.
#[async_trait]
pub trait Annotator: Send + Sync {
    /// Read `markdown`, resolve image paths against `asset_dir`, and write `output`.
    async fn annotate(
        &self,
        markdown: &Path,
        asset_dir: &Path,
        output: &Path,
    ) -> Result<AnnotationSummary, StageError>;
}

/// Annotator backed by a vision-capable chat model.
pub struct ImageAnnotator {
    vision: Arc<dyn VisionClient>,
    concurrency: usize,
}

enum Resolution {
    Described(String),
    Missing(PathBuf),
    Failed(PathBuf),
}

impl Resolution {
    fn render(&self) -> String {
        match self {
            Resolution::Described(text) => format!("\n> **Image Description:** {text}\n"),
            Resolution::Missing(path) => format!("[[Image Missing: {}]]", path.display()),
            Resolution::Failed(path) => {
                format!("[[ERROR: Could not get description for {}]]", path.display())
            }
        }
    }
}

impl ImageAnnotator {
    /// Describe up to `concurrency` images of one document at a time.
    pub fn new(vision: Arc<dyn VisionClient>, concurrency: usize) -> Self {
        Self {
            vision,
            concurrency: concurrency.max(1),
        }
    }

    async fn resolve(&self, image_path: PathBuf) -> Resolution {
        if !image_path.is_file() {
            tracing::warn!(image = %image_path.display(), "Image referenced but not found");
            return Resolution::Missing(image_path);
        }
        match self.vision.describe_image(&image_path).await {
            Ok(description) => Resolution::Described(description),
            Err(error) => {
                tracing::warn!(
                    image = %image_path.display(),
                    error = %error,
                    "Image description failed"
                );
                Resolution::Failed(image_path)
            }
        }
    }

    /// Replace every image reference in `content`, preserving the surrounding text.
    pub async fn annotate_text(
        &self,
        content: &str,
        asset_dir: &Path,
    ) -> (String, AnnotationSummary) {
        let references: Vec<(usize, usize, PathBuf)> = IMAGE_REFERENCE
            .captures_iter(content)
            .filter_map(|captures| {
                let whole = captures.get(0)?;
                let target = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
                Some((whole.start(), whole.end(), asset_dir.join(target)))
            })
            .collect();

        let resolutions: Vec<Resolution> = stream::iter(
            references
                .iter()
                .map(|(_, _, path)| self.resolve(path.clone())),
        )
        .buffered(self.concurrency)
        .collect()
        .await;

        let mut summary = AnnotationSummary {
            images: references.len(),
            ..AnnotationSummary::default()
        };
        let mut rewritten = String::with_capacity(content.len());
        let mut cursor = 0;
        for ((start, end, _), resolution) in references.iter().zip(&resolutions) {
            rewritten.push_str(&content[cursor..*start]);
            rewritten.push_str(&resolution.render());
            cursor = *end;
            match resolution {
                Resolution::Described(_) => summary.described += 1,
                Resolution::Missing(_) => summary.missing += 1,
                Resolution::Failed(_) => summary.failed += 1,
            }
        }
        rewritten.push_str(&content[cursor..]);
        (rewritten, summary)
    }
}

#[async_trait]
impl Annotator for ImageAnnotator {
    async fn annotate(
        &self,
        markdown: &Path,
        asset_dir: &Path,
        output: &Path,
    ) -> Result<AnnotationSummary, StageError> {
        let content = tokio::fs::read_to_string(markdown)
            .await
            .map_err(|source| StageError::io(markdown, source))?;
        let (rewritten, summary) = self.annotate_text(&content, asset_dir).await;
        write_atomically(output, &rewritten).await?;
        tracing::debug!(
            output = %output.display(),
            images = summary.images,
            described = summary.described,
            missing = summary.missing,
            failed = summary.failed,
            "Annotation written"
        );
        Ok(summary)
    }
}

/// Write `content` beside `path` first, then rename over it.
pub(crate) async fn write_atomically(path: &Path, content: &str) -> Result<(), StageError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| StageError::io(parent, source))?;
    }
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);
    tokio::fs::write(&staging, content)
        .await
        .map_err(|source| StageError::io(&staging, source))?;
    tokio::fs::rename(&staging, path)
        .await
        .map_err(|source| StageError::io(path, source))
}
