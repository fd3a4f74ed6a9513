//! HTTP surface for the EHR summarizer.
//!
//! - `POST /api/upload/process-document` – multipart upload (`file`, optional `summaryType`);
//!   extracts text from the PDF or image and returns the AI summary.
//! - `GET /health` – liveness check.
//! - `GET /commands` – machine-readable endpoint catalog for tools and front-ends.
//!
//! Every failure leaves as `{ "success": false, "error": "..." }` with the status chosen by
//! [`PipelineError::status_code`].

use crate::intake::{IntakeError, RawUpload};
use crate::pipeline::{PipelineApi, PipelineError, PipelineResponse};
use crate::summarization::SummaryType;
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Route accepting document uploads.
pub const PROCESS_DOCUMENT_PATH: &str = "/api/upload/process-document";

/// Room left for multipart boundaries and the `summaryType` field on top of the file limit.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// Build the HTTP router around a pipeline implementation.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: PipelineApi + 'static,
{
    let body_limit = service.upload_limit().saturating_add(MULTIPART_OVERHEAD_BYTES);
    Router::new()
        .route(PROCESS_DOCUMENT_PATH, post(process_document::<S>))
        .route("/health", get(health))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// Accept a multipart upload and run it through the pipeline.
async fn process_document<S>(
    State(service): State<Arc<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PipelineResponse>, AppError>
where
    S: PipelineApi,
{
    let mut multipart = multipart
        .map_err(|rejection| PipelineError::Validation(rejection.body_text()))?;

    let limit = service.upload_limit();
    let read_failed = |error: MultipartError| read_error(error, limit);
    let mut upload: Option<RawUpload> = None;
    let mut summary_type: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(read_failed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let mime_type = field
                    .content_type()
                    .unwrap_or(FALLBACK_MIME_TYPE)
                    .to_string();
                let bytes = field.bytes().await.map_err(read_failed)?;
                upload = Some(RawUpload::new(file_name, mime_type, bytes.to_vec()));
            }
            "summaryType" => {
                summary_type = Some(field.text().await.map_err(read_failed)?);
            }
            _ => {}
        }
    }

    let upload = upload.ok_or(PipelineError::from(IntakeError::MissingFile))?;
    let summary_type = SummaryType::parse_or_default(summary_type.as_deref());
    tracing::info!(
        file = %upload.file_name,
        mime = %upload.mime_type,
        size = upload.bytes.len(),
        summary_type = %summary_type,
        "Incoming document"
    );

    let response = service.process_document(upload, summary_type).await?;
    Ok(Json(response))
}

fn read_error(error: MultipartError, limit: usize) -> PipelineError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return IntakeError::RequestTooLarge { limit }.into();
    }
    PipelineError::Validation(format!("Failed to read upload: {}", error.body_text()))
}

/// Liveness check.
async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "process_document",
                method: "POST",
                path: PROCESS_DOCUMENT_PATH,
                description: "Upload a PDF, JPG, JPEG or PNG (max 10 MB by default) as multipart field `file`, optionally with `summaryType` (general | clinical | discharge). Returns { success, extractedText, summary, summaryType, confidence }.",
                request_example: Some(json!({
                    "file": "<binary>",
                    "summaryType": "general"
                })),
            },
            CommandDescriptor {
                name: "health",
                method: "GET",
                path: "/health",
                description: "Liveness check.",
                request_example: None,
            },
        ],
    })
}

struct AppError(PipelineError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.0.status_code(), Json(self.0.to_body())).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(inner: PipelineError) -> Self {
        Self(inner)
    }
}
