use std::{io::Write, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use pdfrag::{
    config::{self, Config},
    llm::OllamaChatClient,
    logging::{self, LogTarget},
    pipeline::{
        Annotator, ArtifactChain, CommandExtractor, Extractor, ImageAnnotator, JobState,
        StoredDocument, Submission, sanitize_collection_name,
    },
    qdrant::{ChunkProvenance, compute_content_hash},
    service::{RagApi, RagService},
};
use tokio::io::{AsyncBufReadExt, BufReader};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(
    name = "pdfrag-cli",
    about = "Run pdfrag pipeline stages and questions from the command line"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert a PDF to markdown with the configured converter.
    Extract {
        pdf: PathBuf,
        /// Directory handed to the converter (defaults to WORK_DIR/<collection>).
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Replace image references in a markdown file with generated descriptions.
    Annotate {
        markdown: PathBuf,
        asset_dir: PathBuf,
        output: PathBuf,
    },
    /// Chunk, embed, and write a markdown file into a new collection.
    Index { markdown: PathBuf, collection: String },
    /// Run all three stages for a PDF and wait for the collection to become ready.
    Ingest { pdf: PathBuf },
    /// Ask one question, or start an interactive session when none is given.
    Ask {
        collection: String,
        question: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init_config().context("Failed to load configuration")?;
    logging::init_tracing(LogTarget::Cli);

    match cli.command {
        Command::Extract { pdf, output_dir } => extract(config, pdf, output_dir).await,
        Command::Annotate {
            markdown,
            asset_dir,
            output,
        } => annotate(config, markdown, asset_dir, output).await,
        Command::Index {
            markdown,
            collection,
        } => index(config, markdown, collection).await,
        Command::Ingest { pdf } => ingest(config, pdf).await,
        Command::Ask {
            collection,
            question,
        } => ask(config, collection, question).await,
    }
}

async fn extract(config: &Config, pdf: PathBuf, output_dir: Option<PathBuf>) -> Result<()> {
    let job_dir = output_dir.unwrap_or_else(|| {
        let stem = pdf
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        config.work_dir.join(sanitize_collection_name(&stem))
    });
    let artifacts = ArtifactChain::in_dir(job_dir, &pdf);
    let extraction = CommandExtractor::new(config.extract_command.clone())
        .extract(&artifacts)
        .await
        .map_err(|error| anyhow::anyhow!(error.diagnostic()))
        .context("Extraction failed")?;

    eprintln!("extracted {} image(s)", extraction.assets.len());
    println!("{}", extraction.markdown.display());
    Ok(())
}

async fn annotate(
    config: &Config,
    markdown: PathBuf,
    asset_dir: PathBuf,
    output: PathBuf,
) -> Result<()> {
    let vision = OllamaChatClient::for_vision(config).context("Failed to build vision client")?;
    let annotator = ImageAnnotator::new(Arc::new(vision), config.vision_concurrency);
    let summary = annotator
        .annotate(&markdown, &asset_dir, &output)
        .await
        .map_err(|error| anyhow::anyhow!(error.diagnostic()))
        .context("Annotation failed")?;

    eprintln!(
        "images: {}, described: {}, missing: {}, failed: {}",
        summary.images, summary.described, summary.missing, summary.failed
    );
    println!("{}", output.display());
    Ok(())
}

async fn index(config: &Config, markdown: PathBuf, collection: String) -> Result<()> {
    let service = RagService::from_config(config).context("Failed to initialize services")?;
    let text = tokio::fs::read_to_string(&markdown)
        .await
        .with_context(|| format!("Failed to read {}", markdown.display()))?;
    let provenance = ChunkProvenance {
        source_file: markdown
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
        job_id: None,
    };
    let outcome = service
        .indexing()
        .index_document(&collection, &text, &provenance)
        .await
        .context("Indexing failed")?;

    eprintln!(
        "indexed {} chunk(s) at {} tokens, {} duplicate(s) skipped",
        outcome.chunk_count, outcome.chunk_size, outcome.skipped_duplicates
    );
    println!("{collection}");
    Ok(())
}

async fn ingest(config: &Config, pdf: PathBuf) -> Result<()> {
    let service = RagService::from_config(config).context("Failed to initialize services")?;
    let bytes = tokio::fs::read(&pdf)
        .await
        .with_context(|| format!("Failed to read {}", pdf.display()))?;
    let filename = pdf
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .context("PDF path has no file name")?;

    let submission = service
        .schedule_ingestion(StoredDocument {
            filename,
            path: pdf.clone(),
            content_hash: compute_content_hash(&bytes),
        })
        .await
        .context("Failed to schedule ingestion")?;

    let job_id = match submission {
        Submission::AlreadyIndexed { collection } => {
            eprintln!("already indexed");
            println!("{collection}");
            return Ok(());
        }
        Submission::Scheduled { job_id, .. } => job_id,
    };

    let mut last_state = None;
    loop {
        let job = service
            .job(job_id)
            .await
            .context("Job disappeared from the registry")?;
        if last_state.as_ref() != Some(&job.state) {
            eprintln!("{}: {}", job.collection, describe(&job.state));
            last_state = Some(job.state.clone());
        }
        match job.state {
            JobState::Ready => {
                println!("{}", job.collection);
                return Ok(());
            }
            JobState::Failed { stage, diagnostic } => {
                bail!("{stage} stage failed: {diagnostic}");
            }
            _ => tokio::time::sleep(POLL_INTERVAL).await,
        }
    }
}

fn describe(state: &JobState) -> &'static str {
    match state {
        JobState::Pending => "pending",
        JobState::Extracting => "extracting",
        JobState::Annotating => "annotating",
        JobState::Indexing => "indexing",
        JobState::Ready => "ready",
        JobState::Failed { .. } => "failed",
    }
}

async fn ask(config: &Config, collection: String, question: Option<String>) -> Result<()> {
    let service = RagService::from_config(config).context("Failed to initialize services")?;

    if let Some(question) = question {
        println!("{}", service.answer(&question, &collection).await);
        return Ok(());
    }

    println!("Chatting with '{collection}'. Type 'exit' to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("You: ");
        std::io::stdout().flush().context("Failed to flush stdout")?;
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question.to_ascii_lowercase().as_str(), "exit" | "quit") {
            break;
        }
        let answer = service.answer(question, &collection).await;
        println!("Assistant: {answer}\n");
    }
    Ok(())
}
