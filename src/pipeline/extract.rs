//! Stage 1: PDF to markdown through an external converter.

use crate::pipeline::types::{ArtifactChain, StageError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use walkdir::WalkDir;

const OUTPUT_TAIL_CHARS: usize = 4000;
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];

/// Output of a successful extraction.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Markdown produced by the converter.
    pub markdown: PathBuf,
    /// Image files found next to the markdown.
    pub assets: Vec<PathBuf>,
}

/// Converts a source document into markdown plus image assets.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Produce `artifacts.extracted_markdown` from `artifacts.source`.
    async fn extract(&self, artifacts: &ArtifactChain) -> Result<Extraction, StageError>;
}

/// Runs a configurable converter command, by default `marker_single`.
///
/// The template is split on whitespace and `{input}`, `{output_dir}`, and `{stem}` are
/// substituted inside each argument, so paths containing spaces stay a single argument.
pub struct CommandExtractor {
    template: String,
}

impl CommandExtractor {
    /// Build an extractor from a command template.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    fn command_line(&self, artifacts: &ArtifactChain) -> Result<(String, Vec<String>), StageError> {
        let input = artifacts.source.to_string_lossy();
        let output_dir = artifacts.job_dir.to_string_lossy();
        let stem = artifacts.stem();

        let mut parts = self.template.split_whitespace().map(|part| {
            part.replace("{input}", &input)
                .replace("{output_dir}", &output_dir)
                .replace("{stem}", &stem)
        });
        let program = parts
            .next()
            .ok_or_else(|| StageError::InvalidCommand("command template is empty".into()))?;
        Ok((program, parts.collect()))
    }
}

#[async_trait]
impl Extractor for CommandExtractor {
    async fn extract(&self, artifacts: &ArtifactChain) -> Result<Extraction, StageError> {
        let (program, args) = self.command_line(artifacts)?;
        tokio::fs::create_dir_all(&artifacts.job_dir)
            .await
            .map_err(|source| StageError::io(&artifacts.job_dir, source))?;
        remove_stale(&artifacts.extracted_markdown).await?;

        tracing::debug!(%program, ?args, "Running converter");
        let output = Command::new(&program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| StageError::Spawn {
                program: program.clone(),
                source,
            })?;
        let captured = captured_output(&output.stdout, &output.stderr);

        if !output.status.success() {
            return Err(StageError::CommandFailed {
                status: output.status.to_string(),
                output: captured,
            });
        }
        if !artifacts.extracted_markdown.is_file() {
            return Err(StageError::MissingArtifact {
                path: artifacts.extracted_markdown.clone(),
                output: captured,
            });
        }

        let assets = list_assets(&artifacts.asset_dir);
        tracing::debug!(
            markdown = %artifacts.extracted_markdown.display(),
            assets = assets.len(),
            "Converter finished"
        );
        Ok(Extraction {
            markdown: artifacts.extracted_markdown.clone(),
            assets,
        })
    }
}

async fn remove_stale(path: &Path) -> Result<(), StageError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(StageError::io(path, error)),
    }
}

fn captured_output(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);
    let mut combined = String::new();
    if !stdout.trim().is_empty() {
        combined.push_str("stdout:\n");
        combined.push_str(tail(stdout.trim_end(), OUTPUT_TAIL_CHARS));
    }
    if !stderr.trim().is_empty() {
        if !combined.is_empty() {
            combined.push('\n');
        }
        combined.push_str("stderr:\n");
        combined.push_str(tail(stderr.trim_end(), OUTPUT_TAIL_CHARS));
    }
    combined
}

fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    let start = text
        .char_indices()
        .nth(skip)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len());
    &text[start..]
}

/// Image files under `dir`, sorted by path.
pub(crate) fn list_assets(dir: &Path) -> Vec<PathBuf> {
    let mut assets: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        })
        .collect();
    assets.sort();
    assets
}
