//! Summary generation through a generative completion service.
//!
//! The engine picks a prompt template from the requested [`SummaryType`], embeds the extracted
//! text, and returns whatever the completion client produced. A single client is built at
//! startup and shared through an `Arc`.

pub mod gemini;
pub mod prompts;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

pub use gemini::GeminiClient;
pub use prompts::{NON_MEDICAL_RESPONSE, PromptTemplate, SummaryType};

/// Errors surfaced by completion providers.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Provider could not be reached.
    #[error("Completion provider unavailable: {0}")]
    Unavailable(String),
    /// Provider answered with an error status, including quota and rate-limit rejections.
    #[error("{message}")]
    Upstream {
        /// HTTP status returned by the provider.
        status: u16,
        /// Provider message, prefixed with the status.
        message: String,
    },
    /// Provider response could not be interpreted.
    #[error("Malformed completion response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by generative completion providers.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Produce a completion for `prompt`.
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

/// Errors raised by [`SummarizationEngine::summarize`].
#[derive(Debug, Error)]
pub enum SummarizationError {
    /// The completion provider failed; its message is preserved.
    #[error(transparent)]
    Completion(#[from] CompletionError),
    /// The provider did not answer within the configured bound.
    #[error("Summarization timed out after {0} seconds")]
    TimedOut(u64),
}

/// A generated summary and the category it was requested under.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    /// Provider output, unmodified.
    pub text: String,
    /// Category echoed from the request.
    pub summary_type: SummaryType,
}

/// Maps summary categories to prompts and invokes the completion client.
pub struct SummarizationEngine {
    client: Arc<dyn CompletionClient>,
    max_prompt_chars: usize,
    timeout: Duration,
}

impl SummarizationEngine {
    /// Create an engine around a shared completion client.
    pub fn new(client: Arc<dyn CompletionClient>, max_prompt_chars: usize, timeout: Duration) -> Self {
        Self {
            client,
            max_prompt_chars,
            timeout,
        }
    }

    /// Summarize extracted text under the requested category. No retries are attempted.
    pub async fn summarize(
        &self,
        extracted_text: &str,
        summary_type: SummaryType,
    ) -> Result<Summary, SummarizationError> {
        let (document_text, truncated) = truncate_chars(extracted_text, self.max_prompt_chars);
        if truncated {
            tracing::warn!(
                limit = self.max_prompt_chars,
                "Extracted text exceeds prompt limit; truncating"
            );
        }

        let template = summary_type.template();
        let prompt = template.render(document_text);
        tracing::info!(
            summary_type = %summary_type,
            template = ?template,
            prompt_chars = prompt.chars().count(),
            "Requesting summary"
        );

        let started = Instant::now();
        let text = tokio::time::timeout(self.timeout, self.client.complete(&prompt))
            .await
            .map_err(|_| SummarizationError::TimedOut(self.timeout.as_secs()))??;

        tracing::info!(
            summary_type = %summary_type,
            summary_chars = text.chars().count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Summary generated"
        );
        Ok(Summary { text, summary_type })
    }
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
///
/// Returns the possibly shortened slice and whether anything was removed.
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => (&text[..index], true),
        None => (text, false),
    }
}
