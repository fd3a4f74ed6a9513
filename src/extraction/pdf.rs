//! Digital PDF text extraction.
//!
//! Parsing is CPU-bound, so the trait implementation moves it onto the blocking pool.

use super::{DocumentFormat, Extraction, ExtractionError, TextExtractor};
use crate::intake::UploadedDocument;
use async_trait::async_trait;
use lopdf::Document;

/// Extracts the text layer of a PDF. Confidence is never reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractor;

impl PdfExtractor {
    /// Construct the extractor.
    pub const fn new() -> Self {
        Self
    }

    /// Extract text and page count from PDF bytes.
    ///
    /// Pages are concatenated in page order. Fails for unparseable or encrypted files and for
    /// files whose text layer is empty.
    pub fn extract_bytes(bytes: &[u8]) -> Result<Extraction, ExtractionError> {
        let document = Document::load_mem(bytes).map_err(|err| {
            let message = err.to_string();
            let lowered = message.to_lowercase();
            if lowered.contains("encrypt") || lowered.contains("password") {
                ExtractionError::EncryptedPdf
            } else {
                ExtractionError::CorruptedPdf(message)
            }
        })?;
        ensure_not_encrypted(&document)?;

        let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
        let page_count = page_numbers.len();
        if page_count == 0 {
            return Err(ExtractionError::NoExtractableText);
        }

        let text = document
            .extract_text(&page_numbers)
            .map_err(|err| ExtractionError::CorruptedPdf(err.to_string()))?;
        if text.trim().is_empty() {
            return Err(ExtractionError::NoExtractableText);
        }

        Ok(Extraction {
            text,
            confidence: None,
            page_count: Some(page_count),
            format: DocumentFormat::Pdf,
        })
    }
}

fn ensure_not_encrypted(document: &Document) -> Result<(), ExtractionError> {
    if document.trailer.get(b"Encrypt").is_ok() {
        return Err(ExtractionError::EncryptedPdf);
    }
    Ok(())
}

#[async_trait]
impl TextExtractor for PdfExtractor {
    async fn extract(&self, document: &UploadedDocument) -> Result<Extraction, ExtractionError> {
        let bytes = tokio::fs::read(document.path()).await?;
        tokio::task::spawn_blocking(move || Self::extract_bytes(&bytes))
            .await
            .map_err(|err| ExtractionError::CorruptedPdf(format!("PDF parser aborted: {err}")))?
    }
}

/// Fixture builder shared by unit and pipeline tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use lopdf::content::{Content, Operation};
    use lopdf::{Document, Object, Stream, dictionary};

    /// Build a PDF with one page per entry; an empty entry yields a page without text.
    pub(crate) fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
        let mut document = build(pages);
        let mut buffer = Vec::new();
        document.save_to(&mut buffer).expect("serialize pdf");
        buffer
    }

    pub(crate) fn build(pages: &[&str]) -> Document {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        let font_id = document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = document.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let operations = if text.is_empty() {
                Vec::new()
            } else {
                vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ]
            };
            let content = Content { operations };
            let content_id = document.add_object(Stream::new(
                dictionary! {},
                content.encode().expect("encode content"),
            ));
            let page_id = document.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        let pages_dict = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        document
            .objects
            .insert(pages_id, Object::Dictionary(pages_dict));
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        document.trailer.set("Root", catalog_id);
        document
    }
}
