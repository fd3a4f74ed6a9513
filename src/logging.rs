//! Tracing setup for the server and the CLI.
//!
//! The server writes compact lines to stdout and mirrors them into a log file, either the path in
//! `EHR_SUMMARIZER_LOG_FILE` or `logs/ehr-summarizer.log`. The CLI prints its JSON result on
//! stdout, so its diagnostics go to stderr only.
//!
//! `RUST_LOG` overrides the default filters. Uploaded document text is never logged; stages log
//! names, sizes, counts and timings.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_FILE_ENV: &str = "EHR_SUMMARIZER_LOG_FILE";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_FILE: &str = "ehr-summarizer.log";

/// PDF parsing is chatty at `info`; keep it quiet unless asked for.
const SERVER_FILTER: &str = "info,lopdf=warn";
const CLI_FILTER: &str = "warn";

/// Where the server's file layer writes.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LogFile {
    /// Append to an explicit path.
    Explicit(PathBuf),
    /// Non-rolling file under the default directory.
    Default,
}

/// Resolve the file target from the raw `EHR_SUMMARIZER_LOG_FILE` value; blank means unset.
fn log_file(raw: Option<String>) -> LogFile {
    match raw.map(|value| value.trim().to_string()) {
        Some(path) if !path.is_empty() => LogFile::Explicit(PathBuf::from(path)),
        _ => LogFile::Default,
    }
}

fn filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install stdout and file logging for the HTTP server.
pub fn init_tracing() {
    let stdout_layer = fmt::layer().with_target(false).compact();
    let registry = tracing_subscriber::registry()
        .with(filter(SERVER_FILTER))
        .with(stdout_layer);

    match file_writer(log_file(std::env::var(LOG_FILE_ENV).ok())) {
        Some(writer) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact();
            registry.with(file_layer).init();
        }
        None => registry.init(),
    }
}

/// Install stderr-only logging for the `ehr-summarize` CLI.
pub fn init_cli_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(filter(CLI_FILTER))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Open the file target; `None` (after a note on stderr) when it cannot be opened.
fn file_writer(target: LogFile) -> Option<NonBlocking> {
    let file = match &target {
        LogFile::Explicit(path) => open_append(path),
        LogFile::Default => std::fs::create_dir_all(DEFAULT_LOG_DIR)
            .and_then(|()| open_append(&Path::new(DEFAULT_LOG_DIR).join(DEFAULT_LOG_FILE))),
    };
    match file {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let _ = LOG_GUARD.set(guard);
            Some(non_blocking)
        }
        Err(err) => {
            eprintln!("File logging disabled ({target:?}): {err}");
            None
        }
    }
}

fn open_append(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_log_file_falls_back_to_default() {
        assert_eq!(log_file(None), LogFile::Default);
        assert_eq!(log_file(Some("   ".into())), LogFile::Default);
        assert_eq!(
            log_file(Some(" /var/log/ehr.log ".into())),
            LogFile::Explicit(PathBuf::from("/var/log/ehr.log"))
        );
    }

    #[test]
    fn unwritable_log_file_disables_file_layer() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let target = LogFile::Explicit(temp.path().join("missing-dir").join("ehr.log"));
        assert!(file_writer(target).is_none());
    }

    #[test]
    fn explicit_log_file_is_created() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let path = temp.path().join("ehr.log");
        assert!(file_writer(LogFile::Explicit(path.clone())).is_some());
        assert!(path.exists());
    }
}
