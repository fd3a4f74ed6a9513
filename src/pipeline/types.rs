//! Response shapes and the error taxonomy of the document pipeline.

use crate::extraction::{DispatchError, ExtractionError};
use crate::intake::IntakeError;
use crate::summarization::{SummarizationError, SummaryType};
use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Failure of a pipeline run, as surfaced to clients.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No file, empty file, or a size policy violation.
    #[error("{0}")]
    Validation(String),
    /// Extension or MIME type outside the allowed set.
    #[error("Unsupported file type")]
    UnsupportedFileType,
    /// The extractor failed; its message is surfaced.
    #[error("{0}")]
    Extraction(#[from] ExtractionError),
    /// The completion provider failed; its message is surfaced.
    #[error("{0}")]
    Summarization(#[from] SummarizationError),
    /// Anything unexpected. The detail is logged, never returned.
    #[error("Internal server error")]
    Internal(String),
}

impl PipelineError {
    /// HTTP status for this failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::UnsupportedFileType => StatusCode::BAD_REQUEST,
            Self::Extraction(_) | Self::Summarization(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// JSON body for this failure.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            success: false,
            error: self.to_string(),
        }
    }
}

impl From<IntakeError> for PipelineError {
    fn from(error: IntakeError) -> Self {
        match error {
            IntakeError::UnsupportedFileType { .. } => Self::UnsupportedFileType,
            IntakeError::MissingFile
            | IntakeError::EmptyFile
            | IntakeError::TooLarge { .. }
            | IntakeError::RequestTooLarge { .. } => Self::Validation(error.to_string()),
            IntakeError::Storage(err) => Self::Internal(format!("transient storage: {err}")),
        }
    }
}

impl From<DispatchError> for PipelineError {
    fn from(error: DispatchError) -> Self {
        match error {
            DispatchError::UnsupportedFileType(_) => Self::UnsupportedFileType,
            DispatchError::Extraction(err) => Self::Extraction(err),
        }
    }
}

/// Error payload returned with a non-2xx status.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorBody {
    /// Always `false`.
    pub success: bool,
    /// Human-readable failure message.
    pub error: String,
}

/// Successful pipeline result.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResponse {
    /// Always `true`.
    pub success: bool,
    /// Full extracted text.
    pub extracted_text: String,
    /// Summary text as produced by the completion provider.
    pub summary: String,
    /// Category the summary was requested under.
    pub summary_type: SummaryType,
    /// OCR confidence for images; `null` for PDFs.
    pub confidence: Option<f64>,
    /// Page count for PDFs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    /// Present when OCR confidence falls below the configured threshold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_quality_warning: Option<String>,
}

/// Warning text attached to low-confidence OCR results.
pub fn ocr_quality_warning(threshold: f64) -> String {
    format!(
        "The OCR confidence is below {threshold}%. Some text may be inaccurate. \
         Consider re-uploading with higher image quality if possible."
    )
}
