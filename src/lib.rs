#![deny(missing_docs)]

//! Core library for the pdfrag document ingestion and question-answering server.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Chat-model clients for answers and image descriptions.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Upload, pipeline, and chat counters.
pub mod metrics;
/// Extraction, annotation, and indexing pipeline.
pub mod pipeline;
/// Chunking, embedding, and vector store orchestration.
pub mod processing;
/// Prompt text for the vision and generation models.
pub mod prompts;
/// Qdrant vector store integration.
pub mod qdrant;
/// Collection readiness and retrieval-augmented answers.
pub mod retrieval;
/// Application context shared by the server and CLI.
pub mod service;
