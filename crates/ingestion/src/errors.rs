//! Ingestion error types

use dossier_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("PDF parse error: {0}")]
    PdfParse(String),

    #[error("No extractor registered for format: {0}")]
    UnsupportedFormat(String),

    #[error("Binary {format} container cannot be converted to text")]
    BinaryContainer { format: String },

    #[error("Entity pattern failed to compile: {0}")]
    Pattern(#[from] regex_lite::Error),

    #[error("Processing task failed: {0}")]
    Task(String),
}

impl From<IngestionError> for AppError {
    fn from(e: IngestionError) -> Self {
        match e {
            IngestionError::Pattern(inner) => AppError::Internal {
                message: inner.to_string(),
            },
            other => AppError::Processing {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_common::errors::ErrorCode;

    #[test]
    fn test_pattern_errors_are_internal() {
        let pattern = regex_lite::Regex::new("(").unwrap_err();
        let err: AppError = IngestionError::Pattern(pattern).into();
        assert_eq!(err.code(), ErrorCode::InternalError);
    }

    #[test]
    fn test_task_errors_become_processing_errors() {
        let err: AppError = IngestionError::Task("worker panicked".into()).into();
        assert_eq!(err.code(), ErrorCode::ProcessingError);
    }

    #[test]
    fn test_extraction_errors_become_processing_errors() {
        let err: AppError = IngestionError::PdfParse("bad xref".into()).into();
        assert_eq!(err.code(), ErrorCode::ProcessingError);
        assert!(err.to_string().contains("bad xref"));
    }
}
