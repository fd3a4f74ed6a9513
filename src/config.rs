use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_TESSERACT_BIN: &str = "tesseract";
const DEFAULT_EXTRACTION_TIMEOUT_SECS: u64 = 300;
const DEFAULT_SUMMARIZATION_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_PROMPT_CHARS: usize = 200_000;
const DEFAULT_OCR_CONFIDENCE_THRESHOLD: f64 = 85.0;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the EHR summarizer.
#[derive(Clone)]
pub struct Config {
    /// Credential for the Gemini completion API.
    pub gemini_api_key: String,
    /// Gemini model identifier used for summaries.
    pub gemini_model: String,
    /// Root URL of the Gemini REST API.
    pub gemini_base_url: String,
    /// Directory holding uploads for the lifetime of a single request.
    pub upload_dir: PathBuf,
    /// Largest accepted upload, in bytes.
    pub max_upload_bytes: usize,
    /// Name or path of the Tesseract executable.
    pub tesseract_bin: String,
    /// Upper bound for a single extraction, in seconds.
    pub extraction_timeout_secs: u64,
    /// Upper bound for a single completion call, in seconds.
    pub summarization_timeout_secs: u64,
    /// Extracted text beyond this many characters is cut before prompting.
    pub max_prompt_chars: usize,
    /// OCR results below this confidence carry a quality warning.
    pub ocr_confidence_threshold: f64,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("gemini_api_key", &"<redacted>")
            .field("gemini_model", &self.gemini_model)
            .field("gemini_base_url", &self.gemini_base_url)
            .field("upload_dir", &self.upload_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("tesseract_bin", &self.tesseract_bin)
            .field("extraction_timeout_secs", &self.extraction_timeout_secs)
            .field("summarization_timeout_secs", &self.summarization_timeout_secs)
            .field("max_prompt_chars", &self.max_prompt_chars)
            .field("ocr_confidence_threshold", &self.ocr_confidence_threshold)
            .field("server_port", &self.server_port)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Blank values are treated as unset so that an empty line in `.env` falls back to the
    /// default instead of failing to parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let config = Self {
            gemini_api_key: get("GEMINI_API_KEY")
                .ok_or_else(|| ConfigError::MissingVariable("GEMINI_API_KEY".into()))?,
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.into()),
            gemini_base_url: get("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.into()),
            upload_dir: get("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            max_upload_bytes: parse_optional("MAX_UPLOAD_BYTES", get("MAX_UPLOAD_BYTES"))?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            tesseract_bin: get("TESSERACT_BIN").unwrap_or_else(|| DEFAULT_TESSERACT_BIN.into()),
            extraction_timeout_secs: parse_optional(
                "EXTRACTION_TIMEOUT_SECS",
                get("EXTRACTION_TIMEOUT_SECS"),
            )?
            .unwrap_or(DEFAULT_EXTRACTION_TIMEOUT_SECS),
            summarization_timeout_secs: parse_optional(
                "SUMMARIZATION_TIMEOUT_SECS",
                get("SUMMARIZATION_TIMEOUT_SECS"),
            )?
            .unwrap_or(DEFAULT_SUMMARIZATION_TIMEOUT_SECS),
            max_prompt_chars: parse_optional("MAX_PROMPT_CHARS", get("MAX_PROMPT_CHARS"))?
                .unwrap_or(DEFAULT_MAX_PROMPT_CHARS),
            ocr_confidence_threshold: parse_optional(
                "OCR_CONFIDENCE_THRESHOLD",
                get("OCR_CONFIDENCE_THRESHOLD"),
            )?
            .unwrap_or(DEFAULT_OCR_CONFIDENCE_THRESHOLD),
            server_port: parse_optional("SERVER_PORT", get("SERVER_PORT"))?,
        };

        if config.max_upload_bytes == 0 {
            return Err(ConfigError::InvalidValue("MAX_UPLOAD_BYTES".into()));
        }
        if config.max_prompt_chars == 0 {
            return Err(ConfigError::InvalidValue("MAX_PROMPT_CHARS".into()));
        }
        if config.extraction_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("EXTRACTION_TIMEOUT_SECS".into()));
        }
        if config.summarization_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "SUMMARIZATION_TIMEOUT_SECS".into(),
            ));
        }
        if !(0.0..=100.0).contains(&config.ocr_confidence_threshold) {
            return Err(ConfigError::InvalidValue("OCR_CONFIDENCE_THRESHOLD".into()));
        }

        Ok(config)
    }

    /// Extraction bound as a [`Duration`].
    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }

    /// Completion bound as a [`Duration`].
    pub fn summarization_timeout(&self) -> Duration {
        Duration::from_secs(self.summarization_timeout_secs)
    }
}

fn parse_optional<T: FromStr>(key: &str, value: Option<String>) -> Result<Option<T>, ConfigError> {
    value
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        model = %config.gemini_model,
        upload_dir = %config.upload_dir.display(),
        max_upload_bytes = config.max_upload_bytes,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
