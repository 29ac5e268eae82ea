//! Document lifecycle handlers

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::auth::Uploader;
use crate::AppState;
use dossier_common::{
    domain::{
        Category, ClassificationLevel, CustomFields, Document, DocumentMetadata, DocumentPatch,
        ProcessingStatus, SearchPage,
    },
    errors::{AppError, Result},
};
use dossier_ingestion::sanitize::{sanitize_metadata, sanitize_text};
use dossier_ingestion::{FileUpload, IngestStatus, ProcessingResult};

/// Language recorded when the uploader does not give one.
const DEFAULT_LANGUAGE: &str = "en";

/// Form fields accompanying an upload
#[derive(Debug, Default)]
struct UploadForm {
    file: Option<UploadedFile>,
    title: Option<String>,
    author: Option<String>,
    department: Option<String>,
    category: Option<String>,
    tags: Option<String>,
    language: Option<String>,
    classification: Option<String>,
}

#[derive(Debug)]
struct UploadedFile {
    name: String,
    content_type: Option<String>,
    bytes: axum::body::Bytes,
}

impl UploadForm {
    fn metadata(&self) -> Result<DocumentMetadata> {
        let mut metadata = DocumentMetadata {
            title: self.title.clone(),
            author: self.author.clone(),
            department: self.department.clone(),
            category: self.category.as_deref().map(str::parse::<Category>).transpose()?,
            language: Some(
                self.language
                    .clone()
                    .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            ),
            ..Default::default()
        };
        if let Some(tags) = &self.tags {
            metadata.add_tags(tags.split(','));
        }
        Ok(metadata)
    }

    fn classification(&self) -> Result<ClassificationLevel> {
        self.classification
            .as_deref()
            .map(str::parse)
            .transpose()
            .map(Option::unwrap_or_default)
    }
}

/// Upload a document (multipart `file` plus optional metadata fields).
///
/// Responds 202 once stored; processing continues in the background.
pub async fn upload_document(
    State(state): State<AppState>,
    Uploader(user_id): Uploader,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ProcessingResult>)> {
    let max_size = state.service.validator().max_size();
    let mut form = UploadForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return multipart_failure(e, max_size),
        };

        let field_name = field.name().unwrap_or_default().to_string();
        if field_name == "file" {
            let name = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().map(str::to_string);
            let bytes = match field.bytes().await {
                Ok(bytes) => bytes,
                Err(e) => return multipart_failure(e, max_size),
            };
            form.file = Some(UploadedFile {
                name,
                content_type,
                bytes,
            });
            continue;
        }

        let value = match field.text().await {
            Ok(value) => value.trim().to_string(),
            Err(e) => return multipart_failure(e, max_size),
        };
        if value.is_empty() {
            continue;
        }

        match field_name.as_str() {
            "title" => form.title = Some(value),
            "author" => form.author = Some(value),
            "department" => form.department = Some(value),
            "category" => form.category = Some(value),
            "tags" => form.tags = Some(value),
            "language" => form.language = Some(value),
            "classification" => form.classification = Some(value),
            other => tracing::debug!(field = other, "Ignoring unknown upload field"),
        }
    }

    let metadata = form.metadata()?;
    let classification = form.classification()?;
    let file = form.file.ok_or_else(|| AppError::MissingField {
        field: "file".to_string(),
    })?;

    let upload = FileUpload {
        name: file.name,
        content_type: file.content_type,
        declared_size: file.bytes.len() as u64,
        body: &file.bytes[..],
    };
    let result = state
        .service
        .ingest(upload, metadata, classification, user_id)
        .await?;

    let status = match result.status {
        IngestStatus::Uploaded => StatusCode::ACCEPTED,
        IngestStatus::Failed => StatusCode::BAD_REQUEST,
    };
    Ok((status, Json(result)))
}

/// Oversized bodies are reported like any other rejected upload.
fn multipart_failure(
    e: MultipartError,
    max_size: u64,
) -> Result<(StatusCode, Json<ProcessingResult>)> {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        let result = ProcessingResult::rejected(vec![format!(
            "file size exceeds maximum allowed size of {} bytes",
            max_size
        )]);
        return Ok((StatusCode::PAYLOAD_TOO_LARGE, Json(result)));
    }

    Err(AppError::InvalidFormat {
        message: e.body_text(),
    })
}

/// Get a document by ID
pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Document>> {
    Ok(Json(state.store.get_by_id(id).await?))
}

/// Metadata and classification edits. Omitted fields are left unchanged.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateDocumentRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,

    #[validate(length(min = 1, max = 500))]
    pub title: Option<String>,

    #[validate(length(max = 200))]
    pub author: Option<String>,

    #[validate(length(max = 200))]
    pub department: Option<String>,

    pub category: Option<Category>,

    #[validate(length(max = 50))]
    pub tags: Option<Vec<String>>,

    #[validate(length(min = 2, max = 16))]
    pub language: Option<String>,

    #[validate(length(max = 50))]
    pub version: Option<String>,

    pub classification: Option<ClassificationLevel>,

    pub custom_fields: Option<CustomFields>,
}

impl UpdateDocumentRequest {
    fn touches_metadata(&self) -> bool {
        self.title.is_some()
            || self.author.is_some()
            || self.department.is_some()
            || self.category.is_some()
            || self.tags.is_some()
            || self.language.is_some()
            || self.version.is_some()
            || self.custom_fields.is_some()
    }

    fn into_patch(self, current: &DocumentMetadata) -> DocumentPatch {
        let metadata = self.touches_metadata().then(|| {
            let mut metadata = current.clone();
            if let Some(title) = self.title {
                metadata.title = Some(title);
            }
            if let Some(author) = self.author {
                metadata.author = Some(author);
            }
            if let Some(department) = self.department {
                metadata.department = Some(department);
            }
            if let Some(category) = self.category {
                metadata.category = Some(category);
            }
            if let Some(tags) = self.tags {
                metadata.tags.clear();
                metadata.add_tags(tags);
            }
            if let Some(language) = self.language {
                metadata.language = Some(language);
            }
            if let Some(version) = self.version {
                metadata.version = Some(version);
            }
            if let Some(fields) = self.custom_fields {
                metadata.custom_fields = fields;
            }
            metadata.last_modified = Some(Utc::now());
            sanitize_metadata(metadata)
        });

        DocumentPatch {
            name: self.name.map(|name| sanitize_text(name.trim())),
            classification: self.classification,
            metadata,
            ..Default::default()
        }
    }
}

/// Edit a document's name, metadata or classification
pub async fn update_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateDocumentRequest>,
) -> Result<Json<Document>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let current = state.store.get_by_id(id).await?;
    let patch = request.into_patch(&current.metadata);
    if patch.is_empty() {
        return Err(AppError::Validation {
            message: "request contains no changes".to_string(),
            field: None,
        });
    }

    let updated = state.store.update(id, patch).await?;
    tracing::info!(document_id = %id, "Document updated");

    Ok(Json(updated))
}

/// Delete a document
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.store.delete(id).await?;
    tracing::info!(document_id = %id, "Document deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Processing state of a document
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(rename = "documentID")]
    pub document_id: Uuid,
    pub processing_status: ProcessingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_timestamp: Option<DateTime<Utc>>,
}

impl From<Document> for StatusResponse {
    fn from(doc: Document) -> Self {
        Self {
            document_id: doc.id,
            processing_status: doc.processing_status,
            processing_error: doc.processing_error,
            processing_timestamp: doc.processing_timestamp,
        }
    }
}

/// Get processing status without triggering processing
pub async fn get_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusResponse>> {
    Ok(Json(state.service.get_status(id).await?.into()))
}

/// Process (or reprocess a failed) document synchronously
pub async fn process_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Document>> {
    Ok(Json(state.service.process_document(id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    #[serde(default)]
    pub skip: u64,
}

/// Documents uploaded by a user, newest first
pub async fn list_user_documents(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(page): Query<Pagination>,
) -> Result<Json<SearchPage>> {
    Ok(Json(
        state
            .store
            .get_by_user(user_id, page.limit, page.skip)
            .await?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_form_defaults() {
        let form = UploadForm::default();
        let metadata = form.metadata().unwrap();
        assert_eq!(metadata.language.as_deref(), Some("en"));
        assert_eq!(form.classification().unwrap(), ClassificationLevel::Internal);
    }

    #[test]
    fn test_upload_form_fields() {
        let form = UploadForm {
            title: Some("Plan".into()),
            category: Some("strategy".into()),
            tags: Some("Budget, ,Risk".into()),
            classification: Some("secret".into()),
            ..Default::default()
        };
        let metadata = form.metadata().unwrap();
        assert_eq!(metadata.category, Some(Category::Strategy));
        assert_eq!(
            metadata.tags.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["budget", "risk"]
        );
        assert_eq!(form.classification().unwrap(), ClassificationLevel::Secret);
    }

    #[test]
    fn test_upload_form_rejects_unknown_category() {
        let form = UploadForm {
            category: Some("poetry".into()),
            ..Default::default()
        };
        assert!(form.metadata().is_err());
    }

    #[test]
    fn test_update_patch_keeps_untouched_metadata() {
        let mut current = DocumentMetadata {
            title: Some("Old".into()),
            author: Some("Dana".into()),
            ..Default::default()
        };
        current.add_tags(["finance"]);

        let request = UpdateDocumentRequest {
            title: Some("New".into()),
            tags: Some(vec!["Audit".into()]),
            ..Default::default()
        };
        let patch = request.into_patch(&current);
        let metadata = patch.metadata.unwrap();
        assert_eq!(metadata.title.as_deref(), Some("New"));
        assert_eq!(metadata.author.as_deref(), Some("Dana"));
        assert!(metadata.tags.contains("audit"));
        assert!(!metadata.tags.contains("finance"));
        assert!(patch.status.is_none());
    }

    #[test]
    fn test_classification_only_patch_leaves_metadata() {
        let request = UpdateDocumentRequest {
            classification: Some(ClassificationLevel::Public),
            ..Default::default()
        };
        let patch = request.into_patch(&DocumentMetadata::default());
        assert!(patch.metadata.is_none());
        assert_eq!(patch.classification, Some(ClassificationLevel::Public));
    }

    #[test]
    fn test_update_validation() {
        let request = UpdateDocumentRequest {
            name: Some(String::new()),
            ..Default::default()
        };
        assert!(request.validate().is_err());
    }
}
