//! Document entity

use chrono::Utc;
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

use crate::domain::{self, DocumentMetadata, Entity as ExtractedEntity};
use crate::errors::AppError;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub name: String,

    #[sea_orm(column_type = "Text")]
    pub content_type: String,

    pub size: i64,

    /// SHA-256 of the uploaded payload
    #[sea_orm(column_type = "Text")]
    pub checksum: String,

    #[sea_orm(column_type = "Text")]
    pub content: String,

    /// Original upload bytes
    pub raw: Vec<u8>,

    pub uploaded_by: Uuid,

    pub uploaded_at: DateTimeWithTimeZone,

    #[sea_orm(column_type = "Text")]
    pub classification: String,

    /// Title, author, category, tags, custom fields
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: Json,

    #[sea_orm(column_type = "Text")]
    pub processing_status: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub processing_error: Option<String>,

    pub processing_timestamp: Option<DateTimeWithTimeZone>,

    #[sea_orm(column_type = "JsonBinary")]
    pub extracted_entities: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for domain::Document {
    type Error = AppError;

    fn try_from(row: Model) -> Result<Self, Self::Error> {
        let size = u64::try_from(row.size).map_err(|_| AppError::Internal {
            message: format!("document {} has negative size {}", row.id, row.size),
        })?;
        let metadata: DocumentMetadata = serde_json::from_value(row.metadata)?;
        let extracted_entities: Vec<ExtractedEntity> =
            serde_json::from_value(row.extracted_entities)?;

        Ok(domain::Document {
            id: row.id,
            name: row.name,
            content_type: row.content_type,
            size,
            checksum: row.checksum,
            content: row.content,
            raw: row.raw,
            uploaded_by: row.uploaded_by,
            uploaded_at: row.uploaded_at.with_timezone(&Utc),
            classification: row.classification.parse()?,
            metadata,
            processing_status: row.processing_status.parse()?,
            processing_error: row.processing_error,
            processing_timestamp: row.processing_timestamp.map(|t| t.with_timezone(&Utc)),
            extracted_entities,
        })
    }
}

impl TryFrom<&domain::Document> for ActiveModel {
    type Error = AppError;

    fn try_from(doc: &domain::Document) -> Result<Self, Self::Error> {
        let size = i64::try_from(doc.size).map_err(|_| AppError::PayloadTooLarge {
            size: doc.size,
            limit: i64::MAX as u64,
        })?;

        Ok(ActiveModel {
            id: Set(doc.id),
            name: Set(doc.name.clone()),
            content_type: Set(doc.content_type.clone()),
            size: Set(size),
            checksum: Set(doc.checksum.clone()),
            content: Set(doc.content.clone()),
            raw: Set(doc.raw.clone()),
            uploaded_by: Set(doc.uploaded_by),
            uploaded_at: Set(doc.uploaded_at.into()),
            classification: Set(doc.classification.as_str().to_string()),
            metadata: Set(serde_json::to_value(&doc.metadata)?),
            processing_status: Set(doc.processing_status.as_str().to_string()),
            processing_error: Set(doc.processing_error.clone()),
            processing_timestamp: Set(doc.processing_timestamp.map(Into::into)),
            extracted_entities: Set(serde_json::to_value(&doc.extracted_entities)?),
        })
    }
}
