//! Core document domain types
//!
//! Storage-agnostic: both store backends and the processing pipeline work
//! in terms of these types.

mod document;
mod metadata;
mod search;

pub use document::{
    file_extension, Category, ClassificationLevel, Document, DocumentPatch, Entity, EntityKind,
    ProcessingStatus, StatusChange,
};
pub use metadata::{validate_field_key, CustomFields, DocumentMetadata, MetadataValue};
pub use search::{
    resolve_limit, DocumentStatistics, SearchFilter, SearchPage, DEFAULT_PAGE_LIMIT,
    DEFAULT_STATUS_LIMIT, UNCATEGORIZED,
};
