//! Pattern-based entity extraction
//!
//! Emails, phone numbers, money amounts and dates are found with
//! `regex-lite`, so matching is linear in the input length. Every match of
//! a kind carries that kind's fixed confidence.

use crate::errors::IngestionError;
use dossier_common::domain::{Entity, EntityKind};
use regex_lite::Regex;

const EMAIL_PATTERN: &str = r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}";

/// `555-123-4567`, `555.123.4567`, `5551234567`, `(555) 123-4567`
const PHONE_PATTERN: &str = r"(?:\(\d{3}\)\s?|\b\d{3}[-.]?)\d{3}[-.]?\d{4}\b";

/// Currency symbol or ISO code, then an amount with optional thousands
/// separators and cents.
const MONEY_PATTERN: &str =
    r"(?:[$€£¥]\s?|\b(?:USD|EUR|GBP)\s?)(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d{2})?";

/// `M/D/YYYY`, `M-D-YYYY` and ISO `YYYY-MM-DD`
const DATE_PATTERN: &str = r"\b\d{1,2}[/-]\d{1,2}[/-]\d{4}\b|\b\d{4}-\d{2}-\d{2}\b";

/// Compiled entity patterns.
#[derive(Debug, Clone)]
pub struct EntityExtractor {
    patterns: Vec<(EntityKind, Regex)>,
}

impl EntityExtractor {
    pub fn new() -> Result<Self, IngestionError> {
        let patterns = vec![
            (EntityKind::Email, Regex::new(EMAIL_PATTERN)?),
            (EntityKind::Phone, Regex::new(PHONE_PATTERN)?),
            (EntityKind::Money, Regex::new(MONEY_PATTERN)?),
            (EntityKind::Date, Regex::new(DATE_PATTERN)?),
        ];

        Ok(Self { patterns })
    }

    /// All matches in document order. Overlapping matches of different
    /// kinds are all kept.
    pub fn extract(&self, text: &str) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self
            .patterns
            .iter()
            .flat_map(|(kind, regex)| {
                regex
                    .find_iter(text)
                    .map(move |m| Entity::new(*kind, m.as_str(), m.start(), m.end()))
            })
            .collect();

        entities.sort_by_key(|e| (e.start, e.end));
        entities
    }
}
