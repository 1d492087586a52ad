#![deny(missing_docs)]

//! Core library for the docpipe document ingestion pipeline.

/// HTTP routing and REST handlers.
pub mod api;
/// Structured completion client abstraction and adapters.
pub mod completion;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// OCR client abstraction and adapters.
pub mod ocr;
/// Extraction, classification, indexing and linking stages plus their orchestrator.
pub mod pipeline;
/// Document store and file storage integration.
pub mod store;
