use super::TextExtractor;
use crate::errors::IngestionError;
use crate::sanitize::sanitize;

/// Plain text: sanitized, with whitespace tidied but line breaks kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, IngestionError> {
        Ok(normalize_whitespace(&sanitize(bytes)))
    }
}

/// Collapse horizontal whitespace runs to one space, trim every line and
/// fold runs of blank lines into a single empty line.
pub fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_blank = false;

    for line in text.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            pending_blank = !out.is_empty();
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
            if pending_blank {
                out.push('\n');
            }
        }
        out.push_str(&line);
        pending_blank = false;
    }

    out
}
