//! Pipeline orchestration: intake, extraction dispatch, summarization, and cleanup.

use crate::{
    config::Config,
    extraction::{ExtractionDispatcher, OcrExtractor, OcrProgress, PdfExtractor},
    intake::{IntakeGate, RawUpload},
    pipeline::types::{PipelineError, PipelineResponse, ocr_quality_warning},
    summarization::{CompletionError, GeminiClient, SummarizationEngine, SummaryType},
};
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;

/// Errors raised while building the production pipeline.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The completion client could not be constructed.
    #[error(transparent)]
    Completion(#[from] CompletionError),
    /// The upload directory could not be created.
    #[error("Failed to create upload directory: {0}")]
    UploadDir(#[from] io::Error),
}

/// Abstraction over the pipeline used by external surfaces (HTTP, CLI).
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Run one upload through intake, extraction, and summarization.
    async fn process_document(
        &self,
        upload: RawUpload,
        summary_type: SummaryType,
    ) -> Result<PipelineResponse, PipelineError>;

    /// Largest upload the intake gate accepts, in bytes.
    fn upload_limit(&self) -> usize;
}

/// Sequences the pipeline stages for one document per call.
///
/// The stages live behind an `Arc` so each run can execute on its own task; a panic inside a
/// run is reported as [`PipelineError::Internal`] and the transient upload is still removed
/// while the task unwinds. Construct the pipeline once near process start and share it.
#[derive(Clone)]
pub struct DocumentPipeline {
    stages: Arc<Stages>,
}

struct Stages {
    intake: IntakeGate,
    dispatcher: ExtractionDispatcher,
    summarizer: SummarizationEngine,
    ocr_confidence_threshold: f64,
}

impl DocumentPipeline {
    /// Assemble a pipeline from its stages.
    pub fn new(
        intake: IntakeGate,
        dispatcher: ExtractionDispatcher,
        summarizer: SummarizationEngine,
        ocr_confidence_threshold: f64,
    ) -> Self {
        Self {
            stages: Arc::new(Stages {
                intake,
                dispatcher,
                summarizer,
                ocr_confidence_threshold,
            }),
        }
    }

    /// Build the production pipeline: lopdf for PDFs, Tesseract for images, Gemini for
    /// summaries.
    ///
    /// Creates the upload directory up front. Must be called inside a Tokio runtime; OCR
    /// progress is logged by a background task.
    pub fn from_config(config: &Config) -> Result<Self, SetupError> {
        tracing::info!(model = %config.gemini_model, "Initializing completion client");
        let client = GeminiClient::new(
            config.gemini_base_url.clone(),
            config.gemini_model.clone(),
            config.gemini_api_key.clone(),
        )?;

        let ocr = OcrExtractor::new(config.tesseract_bin.clone());
        spawn_progress_logger(ocr.subscribe());

        let dispatcher = ExtractionDispatcher::new(
            Arc::new(PdfExtractor::new()),
            Arc::new(ocr),
            config.extraction_timeout(),
        );
        let summarizer = SummarizationEngine::new(
            Arc::new(client),
            config.max_prompt_chars,
            config.summarization_timeout(),
        );

        let intake = IntakeGate::new(config.upload_dir.clone(), config.max_upload_bytes);
        intake.ensure_upload_dir()?;

        Ok(Self::new(
            intake,
            dispatcher,
            summarizer,
            config.ocr_confidence_threshold,
        ))
    }
}

impl Stages {
    async fn run(
        &self,
        upload: RawUpload,
        summary_type: SummaryType,
    ) -> Result<PipelineResponse, PipelineError> {
        let document = self.intake.admit(upload).await?;
        tracing::info!(
            file = document.original_name(),
            extension = document.extension(),
            size = document.size_bytes(),
            summary_type = %summary_type,
            "Document admitted"
        );

        let extraction = self.dispatcher.dispatch(&document).await?;
        let summary = self
            .summarizer
            .summarize(&extraction.text, summary_type)
            .await?;
        drop(document);

        let ocr_quality_warning = extraction
            .confidence
            .filter(|confidence| *confidence < self.ocr_confidence_threshold)
            .map(|_| ocr_quality_warning(self.ocr_confidence_threshold));
        if ocr_quality_warning.is_some() {
            tracing::warn!(
                confidence = ?extraction.confidence,
                threshold = self.ocr_confidence_threshold,
                "Low OCR confidence"
            );
        }

        Ok(PipelineResponse {
            success: true,
            extracted_text: extraction.text,
            summary: summary.text,
            summary_type: summary.summary_type,
            confidence: extraction.confidence,
            page_count: extraction.page_count,
            ocr_quality_warning,
        })
    }
}

#[async_trait]
impl PipelineApi for DocumentPipeline {
    async fn process_document(
        &self,
        upload: RawUpload,
        summary_type: SummaryType,
    ) -> Result<PipelineResponse, PipelineError> {
        let started = Instant::now();
        let stages = Arc::clone(&self.stages);
        let task = tokio::spawn(async move { stages.run(upload, summary_type).await });
        // Dropping this future (client gone) cancels the run, which also removes the upload.
        let _abort = AbortOnDrop(task.abort_handle());
        let outcome = task
            .await
            .unwrap_or_else(|join_error| Err(PipelineError::Internal(join_error.to_string())));

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(_) => tracing::info!(elapsed_ms, "Document processed"),
            Err(PipelineError::Internal(detail)) => {
                tracing::error!(elapsed_ms, detail = %detail, "Document processing aborted")
            }
            Err(error) => tracing::warn!(elapsed_ms, error = %error, "Document processing failed"),
        }
        outcome
    }

    fn upload_limit(&self) -> usize {
        self.stages.intake.max_upload_bytes()
    }
}

struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn spawn_progress_logger(mut progress: broadcast::Receiver<OcrProgress>) {
    tokio::spawn(async move {
        loop {
            match progress.recv().await {
                Ok(event) => tracing::debug!(?event, "OCR progress"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "OCR progress lagged")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
