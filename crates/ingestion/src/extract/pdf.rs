use super::{PlainTextExtractor, TextExtractor};
use crate::errors::IngestionError;
use crate::sanitize::sanitize_text;
use tracing::{debug, warn};

const PDF_MAGIC: &[u8] = b"%PDF-";

/// The header may be preceded by junk; readers accept it within the first KiB.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// PDF text via `lopdf`, page by page.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, IngestionError> {
        if !has_pdf_header(bytes) {
            debug!("Payload has no PDF header, treating as plain text");
            return PlainTextExtractor.extract(bytes);
        }

        let doc = lopdf::Document::load_mem(bytes)
            .map_err(|e| IngestionError::PdfParse(format!("failed to load PDF: {}", e)))?;

        let pages = doc.get_pages();
        debug!(page_count = pages.len(), "Extracting text from PDF");

        let mut text = String::new();
        for page_num in pages.keys() {
            match doc.extract_text(&[*page_num]) {
                Ok(page_text) => {
                    text.push_str(&page_text);
                    text.push('\n');
                }
                Err(e) => {
                    warn!(page = page_num, error = %e, "Failed to extract text from page, skipping");
                }
            }
        }

        let cleaned = super::normalize_whitespace(&sanitize_text(&text.replace('\u{FEFF}', "")));
        if cleaned.is_empty() {
            return Err(IngestionError::PdfParse(
                "no text content extracted from PDF".to_string(),
            ));
        }

        debug!(
            original_len = text.len(),
            cleaned_len = cleaned.len(),
            "Text extraction complete"
        );

        Ok(cleaned)
    }
}

fn has_pdf_header(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW)];
    window.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC)
}

/// Single-page PDF showing `text`, for tests that need a real file.
#[cfg(test)]
pub(crate) fn one_page_pdf(text: &str) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_page_text() {
        let text = PdfExtractor.extract(&one_page_pdf("Budget review memo")).unwrap();
        assert_eq!(text, "Budget review memo");
    }

    #[test]
    fn test_header_detection() {
        assert!(has_pdf_header(b"%PDF-1.7\n..."));
        assert!(has_pdf_header(b"\xef\xbb\xbf%PDF-1.4"));
        assert!(!has_pdf_header(b"plain text"));
        assert!(!has_pdf_header(b""));
    }

    #[test]
    fn test_non_pdf_falls_back_to_text() {
        let text = PdfExtractor.extract(b"Quarterly   report").unwrap();
        assert_eq!(text, "Quarterly report");
    }

    #[test]
    fn test_corrupt_pdf_is_an_error() {
        let err = PdfExtractor.extract(b"%PDF-1.4\nthis is not a pdf body").unwrap_err();
        assert!(matches!(err, IngestionError::PdfParse(_)));
    }
}
