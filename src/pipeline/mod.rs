//! Document pipeline: intake → extraction → summarization, with guaranteed cleanup.

mod service;
pub mod types;

pub use service::{DocumentPipeline, PipelineApi, SetupError};
pub use types::{ErrorBody, PipelineError, PipelineResponse};
