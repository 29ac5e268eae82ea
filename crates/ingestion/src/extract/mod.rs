//! Format-specific text extraction
//!
//! Each supported format maps to a [`TextExtractor`]. Extractors are pure
//! and CPU-bound; callers run them on the blocking pool.

mod pdf;
mod text;
mod word;

#[cfg(test)]
pub(crate) use pdf::one_page_pdf;
pub use pdf::PdfExtractor;
pub use text::{normalize_whitespace, PlainTextExtractor};
pub use word::WordExtractor;

use crate::errors::IngestionError;
use std::collections::HashMap;
use std::sync::Arc;

/// Turns an uploaded payload into plain text.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<String, IngestionError>;
}

/// Extractors keyed by lowercase file extension.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: HashMap<String, Arc<dyn TextExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// txt, pdf, doc and docx.
    pub fn with_defaults() -> Self {
        let word: Arc<dyn TextExtractor> = Arc::new(WordExtractor);

        let mut registry = Self::new();
        registry.register("txt", Arc::new(PlainTextExtractor));
        registry.register("pdf", Arc::new(PdfExtractor));
        registry.register("doc", word.clone());
        registry.register("docx", word);
        registry
    }

    pub fn register(&mut self, format: &str, extractor: Arc<dyn TextExtractor>) {
        self.extractors.insert(format.to_ascii_lowercase(), extractor);
    }

    pub fn supports(&self, format: &str) -> bool {
        self.extractors.contains_key(&format.to_ascii_lowercase())
    }

    pub fn extract(&self, format: &str, bytes: &[u8]) -> Result<String, IngestionError> {
        let extractor = self
            .extractors
            .get(&format.to_ascii_lowercase())
            .ok_or_else(|| IngestionError::UnsupportedFormat(format.to_string()))?;

        extractor.extract(bytes)
    }
}
