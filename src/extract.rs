//! Text extraction for uploaded contracts.
//!
//! The format is sniffed from the leading bytes rather than trusted from a
//! filename or content-type: `%PDF-` is a PDF, a ZIP local header is treated
//! as DOCX, and anything else must be valid UTF-8 plain text. Parsing runs on
//! the blocking pool.

use anyhow::Result;
use async_trait::async_trait;
use std::io::Read;

use contract_rag_core::extract::TextExtractor;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const PDF_MAGIC: &[u8] = b"%PDF-";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    Text,
}

impl DocumentKind {
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(PDF_MAGIC) {
            DocumentKind::Pdf
        } else if bytes.starts_with(ZIP_MAGIC) {
            DocumentKind::Docx
        } else {
            DocumentKind::Text
        }
    }

    /// File extension used when storing the raw upload.
    pub fn extension(self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Docx => "docx",
            DocumentKind::Text => "txt",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
    #[error("unsupported document: not a PDF, DOCX or UTF-8 text file")]
    Unsupported,
}

/// Extract plain text from `bytes`. Empty input yields empty text.
pub fn extract_text(bytes: &[u8]) -> Result<String, ExtractError> {
    if bytes.is_empty() {
        return Ok(String::new());
    }
    match DocumentKind::sniff(bytes) {
        DocumentKind::Pdf => extract_pdf(bytes),
        DocumentKind::Docx => extract_docx(bytes),
        DocumentKind::Text => String::from_utf8(bytes.to_vec()).map_err(|_| ExtractError::Unsupported),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    extract_paragraphs(&doc_xml)
}

/// Concatenate `w:t` runs, ending each `w:p` paragraph with a newline.
fn extract_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => {
                if let Ok(Event::Text(te)) = reader.read_event_into(&mut buf) {
                    out.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"p" => out.push('\n'),
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"tab" => out.push(' '),
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// [`TextExtractor`] over PDF, DOCX and plain text.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentExtractor;

#[async_trait]
impl TextExtractor for DocumentExtractor {
    async fn extract(&self, bytes: &[u8]) -> Result<String> {
        let owned = bytes.to_vec();
        let text = tokio::task::spawn_blocking(move || extract_text(&owned))
            .await
            .map_err(|e| anyhow::anyhow!("extractor task failed: {}", e))??;
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx(document_xml: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        writer
            .start_file(
                "word/document.xml",
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
        writer.write_all(document_xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn sniffs_by_magic_bytes() {
        assert_eq!(DocumentKind::sniff(b"%PDF-1.7\n..."), DocumentKind::Pdf);
        assert_eq!(DocumentKind::sniff(b"PK\x03\x04rest"), DocumentKind::Docx);
        assert_eq!(DocumentKind::sniff(b"plain contract"), DocumentKind::Text);
        assert_eq!(DocumentKind::Pdf.extension(), "pdf");
    }

    #[test]
    fn empty_input_is_empty_text() {
        assert_eq!(extract_text(b"").unwrap(), "");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(
            extract_text("Payment within 30 days.\n".as_bytes()).unwrap(),
            "Payment within 30 days.\n"
        );
    }

    #[test]
    fn invalid_utf8_is_unsupported() {
        let err = extract_text(&[0xff, 0xfe, 0x00, 0x81]).unwrap_err();
        assert!(matches!(err, ExtractError::Unsupported));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"%PDF-1.4 truncated").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_docx_error() {
        let err = extract_text(b"PK\x03\x04 not really a zip").unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let bytes = docx(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>1. Payment</w:t></w:r></w:p><w:p><w:r><w:t xml:space="preserve">Due within </w:t></w:r><w:r><w:t>30 days.</w:t></w:r></w:p></w:body></w:document>"#,
        );
        assert_eq!(
            extract_text(&bytes).unwrap(),
            "1. Payment\nDue within 30 days.\n"
        );
    }

    #[test]
    fn zip_without_document_xml_is_error() {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        writer
            .start_file("other.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"x").unwrap();
        let bytes = writer.finish().unwrap().into_inner();
        let err = extract_text(&bytes).unwrap_err();
        assert!(err.to_string().contains("word/document.xml"));
    }

    #[tokio::test]
    async fn extractor_trait_surfaces_errors() {
        let extractor = DocumentExtractor;
        assert_eq!(extractor.extract(b"hello").await.unwrap(), "hello");
        assert!(extractor.extract(b"%PDF-broken").await.is_err());
    }
}
