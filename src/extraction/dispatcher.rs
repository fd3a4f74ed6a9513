use super::{DocumentFormat, Extraction, ExtractionError, TextExtractor};
use crate::intake::UploadedDocument;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors returned by [`ExtractionDispatcher::dispatch`].
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No extractor handles the declared extension; nothing was invoked.
    #[error("Unsupported file type")]
    UnsupportedFileType(String),
    /// The selected extractor failed.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// Routes a stored upload to the PDF or OCR adapter by declared extension.
///
/// This is the only place an extractor is invoked.
pub struct ExtractionDispatcher {
    pdf: Arc<dyn TextExtractor>,
    ocr: Arc<dyn TextExtractor>,
    timeout: Duration,
}

impl ExtractionDispatcher {
    /// Create a dispatcher over the two adapters with an upper bound per extraction.
    pub fn new(pdf: Arc<dyn TextExtractor>, ocr: Arc<dyn TextExtractor>, timeout: Duration) -> Self {
        Self { pdf, ocr, timeout }
    }

    fn select(&self, format: DocumentFormat) -> &dyn TextExtractor {
        match format {
            DocumentFormat::Pdf => self.pdf.as_ref(),
            DocumentFormat::Image => self.ocr.as_ref(),
        }
    }

    /// Extract text with the adapter matching the document's extension.
    pub async fn dispatch(&self, document: &UploadedDocument) -> Result<Extraction, DispatchError> {
        let format = DocumentFormat::from_extension(document.extension()).ok_or_else(|| {
            DispatchError::UnsupportedFileType(document.extension().to_string())
        })?;

        tracing::info!(
            file = document.original_name(),
            extension = document.extension(),
            format = ?format,
            "Extracting text"
        );
        let started = Instant::now();
        let extraction = tokio::time::timeout(self.timeout, self.select(format).extract(document))
            .await
            .map_err(|_| ExtractionError::TimedOut(self.timeout.as_secs()))??;

        tracing::info!(
            file = document.original_name(),
            chars = extraction.text.chars().count(),
            pages = ?extraction.page_count,
            confidence = ?extraction.confidence,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Text extracted"
        );
        Ok(extraction)
    }
}
