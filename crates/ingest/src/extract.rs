//! Format detection and text extraction.
//!
//! The client's declared content type and filename are hints; magic
//! bytes win. A document that sniffs as PDF is extracted as PDF no
//! matter what the upload claimed.

use studykit_core::IngestError;

/// The formats the ingestor accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    PlainText,
    /// Markdown is kept verbatim; its markup reads fine as study text.
    Markdown,
    Html,
    Pdf,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::PlainText => "text",
            DocumentFormat::Markdown => "markdown",
            DocumentFormat::Html => "html",
            DocumentFormat::Pdf => "pdf",
        }
    }
}

/// Decide the format of an upload.
///
/// Order: PDF magic bytes, then the declared content type, then the
/// filename extension, then content sniffing. Anything that ends up
/// neither a known format nor valid UTF-8 text is rejected.
pub fn detect_format(
    content_type: Option<&str>,
    filename: &str,
    bytes: &[u8],
) -> Result<DocumentFormat, IngestError> {
    if bytes.starts_with(b"%PDF-") {
        return Ok(DocumentFormat::Pdf);
    }

    // Declared type, parameters stripped ("text/html; charset=utf-8")
    let declared = content_type
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty() && ct != "application/octet-stream");

    if let Some(declared) = declared {
        match declared.as_str() {
            "application/pdf" => {
                // Declared PDF without the header cannot be parsed as one.
                return Err(IngestError::UnsupportedFormat(
                    "declared application/pdf but content is not a PDF".into(),
                ));
            }
            "text/html" | "application/xhtml+xml" => return Ok(DocumentFormat::Html),
            "text/markdown" => return Ok(DocumentFormat::Markdown),
            "text/plain" => return Ok(DocumentFormat::PlainText),
            other if !other.starts_with("text/") => {
                return Err(IngestError::UnsupportedFormat(other.to_string()));
            }
            // Other text/* subtypes fall through to sniffing.
            _ => {}
        }
    }

    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("md") | Some("markdown") => return Ok(DocumentFormat::Markdown),
        Some("html") | Some("htm") => return Ok(DocumentFormat::Html),
        Some("pdf") => {
            return Err(IngestError::UnsupportedFormat(
                "file named .pdf but content is not a PDF".into(),
            ));
        }
        _ => {}
    }

    let Ok(text) = std::str::from_utf8(bytes) else {
        return Err(IngestError::UnsupportedFormat(
            "binary content is not a supported document format".into(),
        ));
    };

    let head = text.trim_start().get(..64).unwrap_or(text.trim_start());
    let head_lower = head.to_ascii_lowercase();
    if head_lower.starts_with("<!doctype html") || head_lower.starts_with("<html") {
        return Ok(DocumentFormat::Html);
    }

    Ok(DocumentFormat::PlainText)
}

/// Extract plain text from `bytes` according to `format`.
pub fn extract_text(format: DocumentFormat, bytes: &[u8]) -> Result<String, IngestError> {
    match format {
        DocumentFormat::PlainText | DocumentFormat::Markdown => {
            let text = std::str::from_utf8(bytes).map_err(|_| {
                IngestError::UnsupportedFormat("text upload is not valid UTF-8".into())
            })?;
            Ok(text.to_string())
        }
        DocumentFormat::Html => html_to_text(bytes),
        DocumentFormat::Pdf => pdf_to_text(bytes),
    }
}

/// Normalize extracted text: unify line endings, collapse blank runs,
/// trim. Paragraph boundaries (single blank lines) survive.
pub fn normalize(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut out = String::with_capacity(unified.len());
    let mut blank_run = 0usize;
    for line in unified.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}

fn html_to_text(bytes: &[u8]) -> Result<String, IngestError> {
    html2text::from_read(bytes, 80)
        .map_err(|e| IngestError::ExtractionFailed(format!("HTML conversion: {e}")))
}

fn pdf_to_text(bytes: &[u8]) -> Result<String, IngestError> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| IngestError::ExtractionFailed(format!("PDF parse: {e}")))?;

    if doc.is_encrypted() {
        return Err(IngestError::ExtractionFailed(
            "encrypted PDFs are not supported".into(),
        ));
    }

    let pages = doc.get_pages();
    let mut out = String::new();
    for (page_num, _) in pages {
        match doc.extract_text(&[page_num]) {
            Ok(text) => {
                for line in text.split('\n') {
                    let line = line.trim_end();
                    if !line.is_empty() {
                        out.push_str(line);
                        out.push('\n');
                    }
                }
                out.push('\n');
            }
            Err(e) => {
                // Image-only or damaged pages yield nothing; the empty-content
                // check downstream rejects the document if every page fails.
                tracing::warn!(page = page_num, error = %e, "PDF page extraction failed");
            }
        }
    }
    Ok(out)
}
