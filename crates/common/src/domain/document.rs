//! Document record and its processing state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::metadata::DocumentMetadata;
use crate::errors::{AppError, Result};

/// Processing lifecycle of a document.
///
/// `pending -> processing -> {completed | failed}`. A failed document can be
/// reset to `pending` by an explicit reprocess request; nothing leaves
/// `completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub const ALL: [ProcessingStatus; 4] = [
        ProcessingStatus::Pending,
        ProcessingStatus::Processing,
        ProcessingStatus::Completed,
        ProcessingStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }

    /// Whether `self -> next` is a legal move.
    pub fn can_transition_to(&self, next: ProcessingStatus) -> bool {
        use ProcessingStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Processing, Completed) | (Processing, Failed) | (Failed, Pending)
        )
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ProcessingStatus::Pending),
            "processing" => Ok(ProcessingStatus::Processing),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed),
            other => Err(AppError::InvalidFormat {
                message: format!("unknown processing status: {other}"),
            }),
        }
    }
}

/// Security classification level. Stored, not enforced.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationLevel {
    Public,
    #[default]
    Internal,
    Confidential,
    Secret,
    TopSecret,
}

impl ClassificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationLevel::Public => "public",
            ClassificationLevel::Internal => "internal",
            ClassificationLevel::Confidential => "confidential",
            ClassificationLevel::Secret => "secret",
            ClassificationLevel::TopSecret => "top_secret",
        }
    }
}

impl fmt::Display for ClassificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassificationLevel {
    type Err = AppError;

    /// Accepts any case and `top secret`, `top-secret`, `top_secret`.
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "public" => Ok(ClassificationLevel::Public),
            "internal" => Ok(ClassificationLevel::Internal),
            "confidential" => Ok(ClassificationLevel::Confidential),
            "secret" => Ok(ClassificationLevel::Secret),
            "top_secret" => Ok(ClassificationLevel::TopSecret),
            _ => Err(AppError::validation(
                "classification",
                format!("unknown classification level: {}", s.trim()),
            )),
        }
    }
}

/// Document category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Policy,
    Strategy,
    Operations,
    Technology,
    General,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Policy => "policy",
            Category::Strategy => "strategy",
            Category::Operations => "operations",
            Category::Technology => "technology",
            Category::General => "general",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "policy" => Ok(Category::Policy),
            "strategy" => Ok(Category::Strategy),
            "operations" => Ok(Category::Operations),
            "technology" => Ok(Category::Technology),
            "general" => Ok(Category::General),
            other => Err(AppError::validation(
                "category",
                format!("unknown category: {other}"),
            )),
        }
    }
}

/// Kind of fact pulled out of document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Email,
    Phone,
    Money,
    Date,
}

impl EntityKind {
    /// Fixed confidence assigned to every match of this kind.
    pub fn confidence(&self) -> f64 {
        match self {
            EntityKind::Email => 0.95,
            EntityKind::Phone => 0.85,
            EntityKind::Money => 0.90,
            EntityKind::Date => 0.80,
        }
    }
}

/// An extracted entity. `start` and `end` are byte offsets into the
/// processed content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub value: String,
    pub confidence: f64,
    pub start: usize,
    pub end: usize,
}

impl Entity {
    pub fn new(kind: EntityKind, value: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            kind,
            value: value.into(),
            confidence: kind.confidence(),
            start,
            end,
        }
    }
}

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub name: String,
    pub content_type: String,
    pub size: u64,
    /// SHA-256 of the uploaded payload, hex encoded.
    pub checksum: String,
    pub content: String,
    /// Upload bytes as received. Kept out of API responses; processing
    /// reads them so deferred and retried runs see the original file.
    #[serde(skip)]
    pub raw: Vec<u8>,
    pub uploaded_by: Uuid,
    pub uploaded_at: DateTime<Utc>,
    pub classification: ClassificationLevel,
    pub metadata: DocumentMetadata,
    pub processing_status: ProcessingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub extracted_entities: Vec<Entity>,
}

impl Document {
    /// A fresh `pending` document with a new id.
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        size: u64,
        uploaded_by: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            content_type: content_type.into(),
            size,
            checksum: String::new(),
            content: String::new(),
            raw: Vec::new(),
            uploaded_by,
            uploaded_at: Utc::now(),
            classification: ClassificationLevel::default(),
            metadata: DocumentMetadata::default(),
            processing_status: ProcessingStatus::Pending,
            processing_error: None,
            processing_timestamp: None,
            extracted_entities: Vec::new(),
        }
    }

    /// Lowercased file extension, if the name has one.
    pub fn format(&self) -> Option<String> {
        file_extension(&self.name)
    }

    /// Check the record-level invariants. Every problem is reported.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("document name is required");
        }
        if self.content_type.trim().is_empty() {
            problems.push("content type is required");
        }
        if self.size == 0 {
            problems.push("document size must be greater than 0");
        }
        if self.uploaded_by.is_nil() {
            problems.push("uploaded_by is required");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation {
                message: problems.join("; "),
                field: None,
            })
        }
    }

    /// Apply a partial change in place.
    ///
    /// A guarded status change is checked against the current status before
    /// anything is written, so a rejected patch leaves the document untouched.
    pub fn apply(&mut self, patch: &DocumentPatch) -> Result<()> {
        if let Some(change) = &patch.status {
            change.check(self.id, self.processing_status)?;
        }
        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err(AppError::validation("name", "document name is required"));
            }
        }

        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(content) = &patch.content {
            self.content = content.clone();
        }
        if let Some(classification) = patch.classification {
            self.classification = classification;
        }
        if let Some(metadata) = &patch.metadata {
            self.metadata = metadata.clone();
        }
        if let Some(entities) = &patch.entities {
            self.extracted_entities = entities.clone();
        }
        if let Some(change) = &patch.status {
            self.processing_status = change.next;
            self.processing_error = change.error.clone();
            self.processing_timestamp = change.timestamp;
        }

        Ok(())
    }
}

/// Lowercased extension of a file name, without the dot.
pub fn file_extension(name: &str) -> Option<String> {
    let trimmed = name.trim();
    let (stem, ext) = trimmed.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Guarded status transition carried by a [`DocumentPatch`].
///
/// `error` and `timestamp` replace the stored values outright so the
/// error/timestamp pair always matches the new status.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub expected: ProcessingStatus,
    pub next: ProcessingStatus,
    pub error: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl StatusChange {
    /// Verify the stored status matches and the move is legal.
    pub fn check(&self, id: Uuid, current: ProcessingStatus) -> Result<()> {
        if current != self.expected {
            return Err(AppError::StatusConflict {
                id,
                expected: self.expected,
                actual: current,
            });
        }
        if !self.expected.can_transition_to(self.next) {
            return Err(AppError::InvalidTransition {
                from: self.expected,
                to: self.next,
            });
        }
        Ok(())
    }
}

/// Partial update of a document. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentPatch {
    pub name: Option<String>,
    pub content: Option<String>,
    pub classification: Option<ClassificationLevel>,
    pub metadata: Option<DocumentMetadata>,
    pub entities: Option<Vec<Entity>>,
    pub status: Option<StatusChange>,
}

impl DocumentPatch {
    /// `pending -> processing`; fails with a conflict if someone else got there first.
    pub fn claim() -> Self {
        Self {
            status: Some(StatusChange {
                expected: ProcessingStatus::Pending,
                next: ProcessingStatus::Processing,
                error: None,
                timestamp: None,
            }),
            ..Default::default()
        }
    }

    /// `failed -> pending`, clearing the stored error.
    pub fn reset_failed() -> Self {
        Self {
            status: Some(StatusChange {
                expected: ProcessingStatus::Failed,
                next: ProcessingStatus::Pending,
                error: None,
                timestamp: None,
            }),
            ..Default::default()
        }
    }

    /// `processing -> completed` together with the pipeline output.
    pub fn complete(
        content: String,
        metadata: DocumentMetadata,
        entities: Vec<Entity>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            content: Some(content),
            metadata: Some(metadata),
            entities: Some(entities),
            status: Some(StatusChange {
                expected: ProcessingStatus::Processing,
                next: ProcessingStatus::Completed,
                error: None,
                timestamp: Some(at),
            }),
            ..Default::default()
        }
    }

    /// `processing -> failed` with the failure message.
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            status: Some(StatusChange {
                expected: ProcessingStatus::Processing,
                next: ProcessingStatus::Failed,
                error: Some(message.into()),
                timestamp: None,
            }),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.content.is_none()
            && self.classification.is_none()
            && self.metadata.is_none()
            && self.entities.is_none()
            && self.status.is_none()
    }
}
