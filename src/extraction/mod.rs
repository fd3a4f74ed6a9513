//! Text extraction: format routing plus the PDF and OCR adapters.

mod dispatcher;
pub mod ocr;
pub mod pdf;

use crate::intake::UploadedDocument;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use dispatcher::{DispatchError, ExtractionDispatcher};
pub use ocr::{OcrExtractor, OcrProgress};
pub use pdf::PdfExtractor;

/// Source format of a document, decided from its declared extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// Digital PDF, extracted exactly.
    Pdf,
    /// Raster image, extracted through OCR.
    Image,
}

impl DocumentFormat {
    /// Map a lowercase extension to a format, or `None` when no extractor handles it.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "pdf" => Some(Self::Pdf),
            "jpg" | "jpeg" | "png" => Some(Self::Image),
            _ => None,
        }
    }
}

/// Text recovered from a document by exactly one extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Extracted plain text.
    pub text: String,
    /// OCR self-reported quality in `[0, 100]`; always `None` for PDFs.
    pub confidence: Option<f64>,
    /// Number of pages, when the format has pages.
    pub page_count: Option<usize>,
    /// Which adapter produced the text.
    pub format: DocumentFormat,
}

/// Errors produced by the extraction adapters.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// PDF structure could not be parsed.
    #[error("Failed to parse PDF: {0}")]
    CorruptedPdf(String),
    /// PDF is encrypted or password protected.
    #[error("PDF is encrypted or password-protected")]
    EncryptedPdf,
    /// PDF parsed but holds no text layer.
    #[error("PDF contains no extractable text")]
    NoExtractableText,
    /// The OCR engine could not be started.
    #[error("OCR engine unavailable: {0}")]
    EngineUnavailable(String),
    /// The OCR engine ran but failed to read the image.
    #[error("OCR failed: {0}")]
    OcrFailed(String),
    /// Extraction did not finish within the configured bound.
    #[error("Extraction timed out after {0} seconds")]
    TimedOut(u64),
    /// The transient copy could not be read.
    #[error("Failed to read document: {0}")]
    Io(#[from] std::io::Error),
}

/// Interface implemented by extraction adapters.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract text from a stored upload.
    async fn extract(&self, document: &UploadedDocument) -> Result<Extraction, ExtractionError>;
}
