//! Search filters, result pages and statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::document::{Category, ClassificationLevel, Document, ProcessingStatus};

/// Page size used by `search` and `get_by_user` when none is given.
pub const DEFAULT_PAGE_LIMIT: u64 = 20;

/// Batch size used by `get_by_status` when none is given.
pub const DEFAULT_STATUS_LIMIT: u64 = 50;

/// Bucket for documents without a category in statistics.
pub const UNCATEGORIZED: &str = "uncategorized";

/// Resolve a caller-supplied limit; unset or non-positive means `default`.
pub fn resolve_limit(limit: Option<i64>, default: u64) -> u64 {
    match limit {
        Some(limit) if limit > 0 => limit as u64,
        _ => default,
    }
}

/// Document search criteria. All supplied fields must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    /// Free text; documents matching any term qualify.
    pub query: Option<String>,
    pub category: Option<Category>,
    /// Matches when the document carries at least one of these tags.
    pub tags: Vec<String>,
    pub uploaded_by: Option<Uuid>,
    pub classification: Option<ClassificationLevel>,
    pub status: Option<ProcessingStatus>,
    /// Inclusive lower bound on `uploaded_at`.
    pub date_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `uploaded_at`.
    pub date_to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub skip: u64,
}

impl SearchFilter {
    pub fn effective_limit(&self) -> u64 {
        resolve_limit(self.limit, DEFAULT_PAGE_LIMIT)
    }

    /// The trimmed query, if it has any content.
    pub fn text_query(&self) -> Option<&str> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }

    /// Evaluate every structured criterion. The text query is not checked here.
    pub fn matches(&self, doc: &Document) -> bool {
        if let Some(category) = self.category {
            if doc.metadata.category != Some(category) {
                return false;
            }
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| doc.metadata.tags.contains(t)) {
            return false;
        }
        if let Some(user) = self.uploaded_by {
            if doc.uploaded_by != user {
                return false;
            }
        }
        if let Some(classification) = self.classification {
            if doc.classification != classification {
                return false;
            }
        }
        if let Some(status) = self.status {
            if doc.processing_status != status {
                return false;
            }
        }
        if let Some(from) = self.date_from {
            if doc.uploaded_at < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if doc.uploaded_at > to {
                return false;
            }
        }
        true
    }
}

/// One page of results plus the number of matches before pagination.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchPage {
    pub data: Vec<Document>,
    pub total: u64,
}

/// Live counts over the whole collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentStatistics {
    pub total: u64,
    pub by_status: BTreeMap<String, u64>,
    pub by_category: BTreeMap<String, u64>,
}

impl DocumentStatistics {
    /// Empty statistics with every status present at zero.
    pub fn empty() -> Self {
        Self {
            total: 0,
            by_status: ProcessingStatus::ALL
                .iter()
                .map(|s| (s.as_str().to_string(), 0))
                .collect(),
            by_category: BTreeMap::new(),
        }
    }

    /// Count one document.
    pub fn record(&mut self, doc: &Document) {
        self.total += 1;
        *self
            .by_status
            .entry(doc.processing_status.as_str().to_string())
            .or_insert(0) += 1;
        let category = doc
            .metadata
            .category
            .map(|c| c.as_str())
            .unwrap_or(UNCATEGORIZED);
        *self.by_category.entry(category.to_string()).or_insert(0) += 1;
    }
}
