//! Tesseract OCR adapter.
//!
//! Runs the `tesseract` binary as an async child process with TSV output so that per-word
//! confidences come back alongside the text. The language is fixed to English.

use super::{DocumentFormat, Extraction, ExtractionError, TextExtractor};
use crate::intake::UploadedDocument;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::broadcast;

/// Recognition language passed to the engine.
pub const OCR_LANGUAGE: &str = "eng";

const PROGRESS_CAPACITY: usize = 64;
const WORD_LEVEL: u32 = 5;

/// Observational progress events emitted while recognizing an image.
///
/// Events never influence the extraction result and are dropped when nobody subscribes.
#[derive(Debug, Clone, PartialEq)]
pub enum OcrProgress {
    /// The engine was launched for a document.
    Started {
        /// Client-declared name of the document.
        document: String,
    },
    /// The engine finished and its output is being assembled.
    Recognized {
        /// Client-declared name of the document.
        document: String,
        /// Number of words the engine reported.
        words: usize,
    },
    /// Text and confidence are ready.
    Completed {
        /// Client-declared name of the document.
        document: String,
        /// Mean word confidence in `[0, 100]`.
        confidence: f64,
    },
}

/// Text and quality estimate assembled from the engine's TSV output.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutput {
    /// Recognized text with line and paragraph breaks restored.
    pub text: String,
    /// Mean word confidence in `[0, 100]`; `0` when no words were found.
    pub confidence: f64,
    /// Number of recognized words.
    pub words: usize,
}

/// Image extractor backed by the Tesseract command-line engine.
pub struct OcrExtractor {
    binary: String,
    progress: broadcast::Sender<OcrProgress>,
}

impl OcrExtractor {
    /// Create an extractor that launches `binary` (a name on `PATH` or an absolute path).
    pub fn new(binary: impl Into<String>) -> Self {
        let (progress, _) = broadcast::channel(PROGRESS_CAPACITY);
        Self {
            binary: binary.into(),
            progress,
        }
    }

    /// Subscribe to progress events for all subsequent recognitions.
    pub fn subscribe(&self) -> broadcast::Receiver<OcrProgress> {
        self.progress.subscribe()
    }

    fn emit(&self, event: OcrProgress) {
        // No receivers is fine; progress is optional.
        let _ = self.progress.send(event);
    }

    async fn run_engine(&self, image_path: &Path) -> Result<String, ExtractionError> {
        let output = Command::new(&self.binary)
            .arg(image_path)
            .arg("stdout")
            .args(["-l", OCR_LANGUAGE, "tsv"])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(ExtractionError::OcrFailed(format!(
                    "tesseract exited with {}: {}",
                    output.status,
                    stderr.trim()
                )))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(ExtractionError::EngineUnavailable(format!(
                    "{} not found (install tesseract-ocr)",
                    self.binary
                )))
            }
            Err(err) => Err(ExtractionError::Io(err)),
        }
    }
}

#[async_trait]
impl TextExtractor for OcrExtractor {
    async fn extract(&self, document: &UploadedDocument) -> Result<Extraction, ExtractionError> {
        let name = document.original_name().to_string();
        self.emit(OcrProgress::Started {
            document: name.clone(),
        });

        let tsv = self.run_engine(document.path()).await?;
        let output = parse_tsv(&tsv)?;
        self.emit(OcrProgress::Recognized {
            document: name.clone(),
            words: output.words,
        });
        self.emit(OcrProgress::Completed {
            document: name,
            confidence: output.confidence,
        });

        Ok(Extraction {
            text: output.text,
            confidence: Some(output.confidence),
            page_count: None,
            format: DocumentFormat::Image,
        })
    }
}

struct Columns {
    level: usize,
    page: usize,
    block: usize,
    paragraph: usize,
    line: usize,
    confidence: usize,
    text: usize,
}

impl Columns {
    fn from_header(header: &str) -> Option<Self> {
        let names: Vec<&str> = header.trim_end_matches('\r').split('\t').collect();
        let find = |name: &str| names.iter().position(|column| *column == name);
        Some(Self {
            level: find("level")?,
            page: find("page_num")?,
            block: find("block_num")?,
            paragraph: find("par_num")?,
            line: find("line_num")?,
            confidence: find("conf")?,
            text: find("text")?,
        })
    }
}

/// Rebuild text and mean word confidence from Tesseract TSV output.
///
/// Words on the same line are joined with spaces, lines with a newline, and a blank line
/// separates paragraphs. Rows with a negative or non-finite confidence are skipped.
pub fn parse_tsv(tsv: &str) -> Result<OcrOutput, ExtractionError> {
    let mut lines = tsv.lines();
    let columns = lines
        .next()
        .and_then(Columns::from_header)
        .ok_or_else(|| ExtractionError::OcrFailed("unexpected tesseract output".into()))?;

    let mut text = String::new();
    let mut previous: Option<(u32, u32, u32, u32)> = None;
    let mut confidence_sum = 0.0;
    let mut words = 0usize;

    for row in lines {
        let fields: Vec<&str> = row.trim_end_matches('\r').split('\t').collect();
        let field = |index: usize| fields.get(index).copied().unwrap_or_default();
        let number = |index: usize| field(index).trim().parse::<u32>().ok();

        if number(columns.level) != Some(WORD_LEVEL) {
            continue;
        }
        let word = field(columns.text).trim();
        let Ok(confidence) = field(columns.confidence).trim().parse::<f64>() else {
            continue;
        };
        if word.is_empty() || !confidence.is_finite() || confidence < 0.0 {
            continue;
        }

        let position = (
            number(columns.page).unwrap_or_default(),
            number(columns.block).unwrap_or_default(),
            number(columns.paragraph).unwrap_or_default(),
            number(columns.line).unwrap_or_default(),
        );
        if let Some((page, block, paragraph, line)) = previous {
            if (page, block, paragraph) != (position.0, position.1, position.2) {
                text.push_str("\n\n");
            } else if line != position.3 {
                text.push('\n');
            } else {
                text.push(' ');
            }
        }
        text.push_str(word);
        previous = Some(position);

        confidence_sum += confidence;
        words += 1;
    }

    let confidence = if words == 0 {
        0.0
    } else {
        (confidence_sum / words as f64).clamp(0.0, 100.0)
    };

    Ok(OcrOutput {
        text,
        confidence,
        words,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn word(block: u32, par: u32, line: u32, conf: &str, text: &str) -> String {
        format!("5\t1\t{block}\t{par}\t{line}\t1\t0\t0\t10\t10\t{conf}\t{text}")
    }

    fn tsv(rows: &[String]) -> String {
        let mut out = String::from(HEADER);
        out.push('\n');
        out.push_str("1\t1\t0\t0\t0\t0\t0\t0\t100\t100\t-1\t\n");
        for row in rows {
            out.push_str(row);
            out.push('\n');
        }
        out
    }

    #[test]
    fn rebuilds_lines_and_paragraphs() {
        let output = parse_tsv(&tsv(&[
            word(1, 1, 1, "91.5", "Diagnosis:"),
            word(1, 1, 1, "90.0", "Asthma"),
            word(1, 1, 2, "88.0", "Inhaler"),
            word(2, 1, 1, "95.0", "Precautions"),
        ]))
        .expect("parsed");

        assert_eq!(output.text, "Diagnosis: Asthma\nInhaler\n\nPrecautions");
        assert_eq!(output.words, 4);
        assert!((output.confidence - 91.125).abs() < 1e-9);
    }

    #[test]
    fn low_quality_scan_reports_mean_confidence() {
        let output = parse_tsv(&tsv(&[
            word(1, 1, 1, "60.0", "Hypertenslon"),
            word(1, 1, 1, "64.8", "noted"),
        ]))
        .expect("parsed");
        assert!((output.confidence - 62.4).abs() < 1e-9);
    }

    #[test]
    fn ignores_negative_confidence_and_blank_words() {
        let output = parse_tsv(&tsv(&[
            word(1, 1, 1, "-1", "ghost"),
            word(1, 1, 1, "70", " "),
            word(1, 1, 1, "80", "Aspirin"),
        ]))
        .expect("parsed");
        assert_eq!(output.text, "Aspirin");
        assert_eq!(output.words, 1);
        assert!((output.confidence - 80.0).abs() < 1e-9);
    }

    #[test]
    fn non_finite_confidence_is_skipped() {
        let output = parse_tsv(&tsv(&[
            word(1, 1, 1, "NaN", "smudge"),
            word(1, 1, 1, "inf", "blot"),
            word(1, 1, 1, "75", "Metformin"),
        ]))
        .expect("parsed");
        assert_eq!(output.text, "Metformin");
        assert_eq!(output.words, 1);
        assert!((output.confidence - 75.0).abs() < 1e-9);
    }

    #[test]
    fn only_non_finite_rows_yield_zero_confidence() {
        let output = parse_tsv(&tsv(&[word(1, 1, 1, "NaN", "smudge")])).expect("parsed");
        assert_eq!(output.text, "");
        assert_eq!(output.confidence, 0.0);
    }

    #[test]
    fn empty_recognition_has_zero_confidence() {
        let output = parse_tsv(&tsv(&[])).expect("parsed");
        assert_eq!(output.text, "");
        assert_eq!(output.confidence, 0.0);
    }

    #[test]
    fn rejects_output_without_header() {
        let error = parse_tsv("Read error\n").expect_err("not tsv");
        assert!(matches!(error, ExtractionError::OcrFailed(_)));
    }

    #[tokio::test]
    async fn missing_engine_is_reported_and_progress_is_observational() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let path = temp.path().join("scan.png");
        std::fs::write(&path, b"not really a png").expect("write");
        let document = UploadedDocument::new(path, "scan.png", "png", 16);

        let extractor = OcrExtractor::new("ehr-summarizer-missing-tesseract-binary");
        let mut progress = extractor.subscribe();

        let error = extractor.extract(&document).await.expect_err("no engine");
        assert!(matches!(error, ExtractionError::EngineUnavailable(_)));
        assert_eq!(
            progress.try_recv().expect("started event"),
            OcrProgress::Started {
                document: "scan.png".into()
            }
        );
    }

    /// Write an executable shell script standing in for the engine.
    #[cfg(unix)]
    fn fake_engine(dir: &Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-tesseract");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod script");
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    fn stored_image(dir: &Path) -> UploadedDocument {
        let path = dir.join("scan.png");
        std::fs::write(&path, b"png bytes").expect("write image");
        UploadedDocument::new(path, "scan.png", "png", 9)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn engine_tsv_becomes_text_and_confidence() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        // Only answer when invoked as `<image> stdout -l eng tsv`.
        let engine = fake_engine(
            temp.path(),
            &format!(
                "[ -f \"$1\" ] && [ \"$2\" = stdout ] && [ \"$3\" = -l ] && [ \"$4\" = eng ] && [ \"$5\" = tsv ] || exit 2\n\
                 printf '%s\\n' '{HEADER}'\n\
                 printf '5\\t1\\t1\\t1\\t1\\t1\\t0\\t0\\t10\\t10\\t62.4\\tHi\\n'"
            ),
        );
        let document = stored_image(temp.path());
        let extractor = OcrExtractor::new(engine);
        let mut progress = extractor.subscribe();

        let extraction = extractor.extract(&document).await.expect("recognized");

        assert_eq!(extraction.text, "Hi");
        assert_eq!(extraction.confidence, Some(62.4));
        assert_eq!(extraction.format, DocumentFormat::Image);
        assert_eq!(extraction.page_count, None);

        let mut events = Vec::new();
        while let Ok(event) = progress.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events.last(),
            Some(&OcrProgress::Completed {
                document: "scan.png".into(),
                confidence: 62.4
            })
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn engine_failure_carries_stderr() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let engine = fake_engine(
            temp.path(),
            "echo 'Error in pixReadStream: Unknown format' >&2\nexit 1",
        );
        let document = stored_image(temp.path());

        let error = OcrExtractor::new(engine)
            .extract(&document)
            .await
            .expect_err("engine failed");

        match error {
            ExtractionError::OcrFailed(message) => {
                assert!(message.contains("Error in pixReadStream: Unknown format"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    #[ignore = "Requires a local tesseract installation"]
    async fn live_tesseract_rejects_corrupt_image() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let path = temp.path().join("broken.png");
        std::fs::write(&path, b"definitely not an image").expect("write");
        let document = UploadedDocument::new(path, "broken.png", "png", 23);

        let error = OcrExtractor::new("tesseract")
            .extract(&document)
            .await
            .expect_err("corrupt image");
        assert!(matches!(error, ExtractionError::OcrFailed(_)));
    }
}
