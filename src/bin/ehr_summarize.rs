use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use ehr_summarizer::{
    config::Config,
    intake::RawUpload,
    logging,
    pipeline::{DocumentPipeline, PipelineApi},
    summarization::SummaryType,
};

#[derive(Parser)]
#[command(
    name = "ehr-summarize",
    about = "Extract text from a medical document and print its AI summary as JSON"
)]
struct Cli {
    /// PDF, JPG, JPEG or PNG file to summarize.
    path: PathBuf,
    /// Summary category: general, clinical or discharge.
    #[arg(long, default_value = "general")]
    summary_type: String,
    /// MIME type to declare for the file; guessed from the extension when omitted.
    #[arg(long)]
    mime: Option<String>,
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}

/// Returns whether the document was summarized; pipeline failures are printed as JSON.
async fn run() -> Result<bool> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    logging::init_cli_tracing();

    let config = Config::from_env().context("failed to load config from environment")?;
    let pipeline =
        DocumentPipeline::from_config(&config).context("failed to initialize document pipeline")?;

    let bytes = fs::read(&cli.path)
        .with_context(|| format!("failed to read {}", cli.path.display()))?;
    let file_name = cli
        .path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mime_type = cli.mime.unwrap_or_else(|| {
        mime_guess::from_path(&cli.path)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    });
    let summary_type = SummaryType::parse_or_default(Some(cli.summary_type.as_str()));

    match pipeline
        .process_document(RawUpload::new(file_name, mime_type, bytes), summary_type)
        .await
    {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(true)
        }
        Err(error) => {
            println!("{}", serde_json::to_string_pretty(&error.to_body())?);
            Ok(false)
        }
    }
}
