//! Gemini `generateContent` adapter.

use super::{CompletionClient, CompletionError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Completion client for the Google Generative Language REST API.
///
/// Build one at startup and share it; the underlying `reqwest::Client` pools connections.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl GeminiClient {
    /// Create a client for `model` at `base_url` authenticated with `api_key`.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, CompletionError> {
        let http = Client::builder()
            .user_agent(concat!("ehr-summarizer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| CompletionError::Unavailable(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl CompletionClient for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let payload = GenerateRequest {
            contents: [RequestContent {
                parts: [RequestPart { text: prompt }],
            }],
        };

        let response = self
            .http
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                CompletionError::Unavailable(format!("failed to reach Gemini: {error}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Prefer the API's own message; fall back to the raw body.
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or(body);
            return Err(CompletionError::Upstream {
                status: status.as_u16(),
                message: format!("Gemini returned {status}: {message}"),
            });
        }

        let body: GenerateResponse = response.json().await.map_err(|error| {
            CompletionError::InvalidResponse(format!("failed to decode Gemini response: {error}"))
        })?;

        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.is_empty() {
            let reason = body
                .prompt_feedback
                .and_then(|feedback| feedback.block_reason)
                .map(|reason| format!("prompt blocked: {reason}"))
                .unwrap_or_else(|| "response contained no text".to_string());
            return Err(CompletionError::InvalidResponse(reason));
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    const ENDPOINT: &str = "/v1beta/models/gemini-test:generateContent";

    fn client(server: &MockServer) -> GeminiClient {
        GeminiClient::new(server.base_url(), "gemini-test", "test-key").expect("client")
    }

    #[tokio::test]
    async fn returns_candidate_text_unmodified() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(ENDPOINT)
                    .header(API_KEY_HEADER, "test-key")
                    .json_body_partial(
                        json!({ "contents": [{ "parts": [{ "text": "Summarize" }] }] })
                            .to_string(),
                    );
                then.status(200).json_body(json!({
                    "candidates": [{
                        "content": {
                            "parts": [
                                { "text": "**Diagnosis**\nHypertension" },
                                { "text": "\n" }
                            ],
                            "role": "model"
                        }
                    }]
                }));
            })
            .await;

        let text = client(&server).complete("Summarize").await.expect("summary");

        mock.assert_async().await;
        assert_eq!(text, "**Diagnosis**\nHypertension\n");
    }

    #[tokio::test]
    async fn surfaces_quota_message() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(ENDPOINT);
                then.status(429).json_body(json!({
                    "error": {
                        "code": 429,
                        "message": "Resource has been exhausted (e.g. check quota).",
                        "status": "RESOURCE_EXHAUSTED"
                    }
                }));
            })
            .await;

        let error = client(&server).complete("Summarize").await.expect_err("quota");

        assert!(matches!(error, CompletionError::Upstream { status: 429, .. }));
        assert!(
            error
                .to_string()
                .contains("Resource has been exhausted (e.g. check quota).")
        );
    }

    #[tokio::test]
    async fn non_json_error_body_is_kept() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(ENDPOINT);
                then.status(503).body("upstream connect error");
            })
            .await;

        let error = client(&server).complete("Summarize").await.expect_err("503");
        assert!(error.to_string().contains("upstream connect error"));
    }

    #[tokio::test]
    async fn blocked_prompt_is_invalid_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(ENDPOINT);
                then.status(200).json_body(json!({
                    "promptFeedback": { "blockReason": "SAFETY" }
                }));
            })
            .await;

        let error = client(&server).complete("Summarize").await.expect_err("blocked");
        assert!(matches!(error, CompletionError::InvalidResponse(ref m) if m.contains("SAFETY")));
    }

    #[tokio::test]
    async fn unreachable_host_is_unavailable() {
        let client = GeminiClient::new("http://127.0.0.1:9", "gemini-test", "k").expect("client");
        let error = client.complete("Summarize").await.expect_err("unreachable");
        assert!(matches!(error, CompletionError::Unavailable(_)));
    }
}
