use super::{PlainTextExtractor, TextExtractor};
use crate::errors::IngestionError;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// `doc` and `docx`. Only textual payloads are accepted; binary Word
/// containers are rejected because no Word parser is bundled.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordExtractor;

impl TextExtractor for WordExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, IngestionError> {
        if bytes.starts_with(ZIP_MAGIC) {
            return Err(IngestionError::BinaryContainer {
                format: "docx".to_string(),
            });
        }
        if bytes.starts_with(OLE_MAGIC) {
            return Err(IngestionError::BinaryContainer {
                format: "doc".to_string(),
            });
        }

        PlainTextExtractor.extract(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_binary_containers() {
        let mut zip = ZIP_MAGIC.to_vec();
        zip.extend_from_slice(b"word/document.xml");
        assert!(matches!(
            WordExtractor.extract(&zip),
            Err(IngestionError::BinaryContainer { format }) if format == "docx"
        ));

        let mut ole = OLE_MAGIC.to_vec();
        ole.extend_from_slice(&[0; 16]);
        assert!(matches!(
            WordExtractor.extract(&ole),
            Err(IngestionError::BinaryContainer { format }) if format == "doc"
        ));
    }

    #[test]
    fn test_textual_payload_passes_through() {
        assert_eq!(WordExtractor.extract(b"Meeting  notes").unwrap(), "Meeting notes");
    }
}
