//! Upload validation and transient storage.
//!
//! The gate is the only component that writes request data to disk. Every admitted upload is
//! returned as an [`UploadedDocument`], which owns its file and deletes it when dropped, so a
//! pipeline run cannot leak a transient file no matter how it ends.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// File extensions accepted by the gate (lowercase, without the leading dot).
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["pdf", "jpg", "jpeg", "png"];

/// MIME types accepted by the gate.
pub const ALLOWED_MIME_TYPES: [&str; 4] =
    ["application/pdf", "image/jpeg", "image/jpg", "image/png"];

/// Errors raised while validating or storing an upload.
#[derive(Debug, Error)]
pub enum IntakeError {
    /// The request carried no file part.
    #[error("No file uploaded")]
    MissingFile,
    /// The file part was present but contained no bytes.
    #[error("Uploaded file is empty")]
    EmptyFile,
    /// Extension or MIME type fell outside the allowed set.
    #[error("Unsupported file type")]
    UnsupportedFileType {
        /// Declared extension, lowercased.
        extension: String,
        /// Declared MIME type, normalized.
        mime_type: String,
    },
    /// The upload exceeded the configured size limit.
    #[error("File exceeds the maximum upload size of {limit} bytes")]
    TooLarge {
        /// Size of the rejected upload.
        size: usize,
        /// Configured limit.
        limit: usize,
    },
    /// The request body was cut off by the transport's size limit before the file was read.
    #[error("File exceeds the maximum upload size of {limit} bytes")]
    RequestTooLarge {
        /// Configured limit.
        limit: usize,
    },
    /// Writing to transient storage failed.
    #[error("Failed to store upload: {0}")]
    Storage(#[from] io::Error),
}

/// An upload as received from the transport layer, before validation.
#[derive(Debug, Clone)]
pub struct RawUpload {
    /// File name declared by the client.
    pub file_name: String,
    /// MIME type declared by the client.
    pub mime_type: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

impl RawUpload {
    /// Bundle the pieces of an upload.
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }
}

/// A validated upload held in transient storage for one pipeline run.
///
/// Dropping the value deletes the backing file. Deletion failures are logged and otherwise
/// ignored.
#[derive(Debug)]
pub struct UploadedDocument {
    path: PathBuf,
    original_name: String,
    extension: String,
    size_bytes: usize,
}

impl UploadedDocument {
    pub(crate) fn new(
        path: PathBuf,
        original_name: impl Into<String>,
        extension: impl Into<String>,
        size_bytes: usize,
    ) -> Self {
        Self {
            path,
            original_name: original_name.into(),
            extension: extension.into(),
            size_bytes,
        }
    }

    /// Location of the transient copy.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name as declared by the client.
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// Declared extension, lowercased and without the leading dot.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Size of the upload in bytes.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }
}

impl Drop for UploadedDocument {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Deleted transient upload"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "Failed to delete transient upload"
            ),
        }
    }
}

/// Validates uploads against the type and size policy and stores accepted files.
#[derive(Debug, Clone)]
pub struct IntakeGate {
    upload_dir: PathBuf,
    max_upload_bytes: usize,
}

impl IntakeGate {
    /// Create a gate that stores uploads under `upload_dir`.
    pub fn new(upload_dir: impl Into<PathBuf>, max_upload_bytes: usize) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            max_upload_bytes,
        }
    }

    /// Largest accepted upload, in bytes.
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Check an upload against the policy without touching storage.
    ///
    /// Returns the normalized extension on success. Both the extension and the MIME type must be
    /// in the allowed set; the type is checked before the size, so an empty `.txt` is still an
    /// unsupported type.
    pub fn validate(&self, upload: &RawUpload) -> Result<String, IntakeError> {
        let extension = declared_extension(&upload.file_name);
        let mime_type = normalize_mime(&upload.mime_type);
        if !ALLOWED_EXTENSIONS.contains(&extension.as_str())
            || !ALLOWED_MIME_TYPES.contains(&mime_type.as_str())
        {
            return Err(IntakeError::UnsupportedFileType {
                extension,
                mime_type,
            });
        }

        if upload.bytes.is_empty() {
            return Err(IntakeError::EmptyFile);
        }
        if upload.bytes.len() > self.max_upload_bytes {
            return Err(IntakeError::TooLarge {
                size: upload.bytes.len(),
                limit: self.max_upload_bytes,
            });
        }

        Ok(extension)
    }

    /// Create the upload directory. Called once at startup; [`IntakeGate::admit`] recreates it
    /// if it disappears later.
    pub fn ensure_upload_dir(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.upload_dir)?;
        tracing::debug!(path = %self.upload_dir.display(), "Upload directory ready");
        Ok(())
    }

    /// Validate an upload and, if it passes, write it to transient storage.
    pub async fn admit(&self, upload: RawUpload) -> Result<UploadedDocument, IntakeError> {
        let extension = self.validate(&upload)?;

        tokio::fs::create_dir_all(&self.upload_dir).await?;
        let path = self
            .upload_dir
            .join(transient_file_name(&upload.file_name, &extension));

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        // From here on the guard owns the file, so a failed write still removes it.
        let document =
            UploadedDocument::new(path, upload.file_name, extension, upload.bytes.len());
        file.write_all(&upload.bytes).await?;
        file.flush().await?;

        tracing::debug!(
            path = %document.path().display(),
            size = document.size_bytes(),
            "Stored upload"
        );
        Ok(document)
    }
}

/// Lowercased extension of `file_name` without the dot, or an empty string.
pub fn declared_extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

fn normalize_mime(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn transient_file_name(original: &str, extension: &str) -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let stem = Path::new(original)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(sanitize_stem)
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "upload".to_string());
    format!("{millis}-{}-{stem}.{extension}", Uuid::new_v4().simple())
}

fn sanitize_stem(stem: &str) -> String {
    stem.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect()
}
