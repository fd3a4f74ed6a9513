#![deny(missing_docs)]

//! Core library for the EHR document summarizer: upload intake, text extraction from PDFs and
//! scanned images, and AI-generated summaries.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Text extraction from PDFs and images.
pub mod extraction;
/// Upload validation and transient storage.
pub mod intake;
/// Structured logging and tracing setup.
pub mod logging;
/// End-to-end document pipeline and its error taxonomy.
pub mod pipeline;
/// Prompt selection and completion providers.
pub mod summarization;
