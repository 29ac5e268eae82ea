//! Upload validation
//!
//! Checks the file name and declared size before any bytes are read.
//! Every rule is evaluated so the caller sees all problems at once.

use dossier_common::config::IngestionConfig;
use dossier_common::domain::file_extension;
use serde::Serialize;
use std::collections::BTreeSet;

/// Outcome of validating an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    /// Lowercased extension, when the name has one.
    pub format: Option<String>,
    pub size: u64,
}

/// Upload rules: accepted extensions and the size ceiling.
#[derive(Debug, Clone)]
pub struct UploadValidator {
    max_size: u64,
    supported_formats: BTreeSet<String>,
}

impl UploadValidator {
    pub fn new<I, S>(max_size: u64, supported_formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let supported_formats = supported_formats
            .into_iter()
            .map(|f| f.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|f| !f.is_empty())
            .collect();

        Self {
            max_size,
            supported_formats,
        }
    }

    pub fn from_config(config: &IngestionConfig) -> Self {
        Self::new(config.max_upload_bytes, &config.supported_formats)
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    pub fn supports(&self, format: &str) -> bool {
        self.supported_formats.contains(&format.to_ascii_lowercase())
    }

    pub fn validate(&self, name: &str, size: u64) -> ValidationResult {
        let mut errors = Vec::new();
        let format = file_extension(name);

        if name.trim().is_empty() {
            errors.push("filename is required".to_string());
        }

        match &format {
            Some(ext) if self.supports(ext) => {}
            Some(ext) => errors.push(format!("unsupported file format: .{}", ext)),
            None if name.trim().is_empty() => {}
            None => errors.push("unsupported file format: missing extension".to_string()),
        }

        if size == 0 {
            errors.push("file is empty".to_string());
        } else if size > self.max_size {
            errors.push(format!(
                "file size exceeds maximum allowed size of {} bytes",
                self.max_size
            ));
        }

        ValidationResult {
            valid: errors.is_empty(),
            errors,
            format,
            size,
        }
    }
}

impl Default for UploadValidator {
    fn default() -> Self {
        Self::from_config(&IngestionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_supported_formats() {
        let validator = UploadValidator::default();
        for name in ["policy.txt", "Report.PDF", "memo.doc", "plan.docx"] {
            let result = validator.validate(name, 10);
            assert!(result.valid, "{} should be accepted: {:?}", name, result.errors);
        }
        assert_eq!(validator.validate("Report.PDF", 10).format.as_deref(), Some("pdf"));
    }

    #[test]
    fn test_rejects_unsupported_extension() {
        let result = UploadValidator::default().validate("installer.exe", 1024);
        assert!(!result.valid);
        assert_eq!(result.errors, vec!["unsupported file format: .exe"]);
    }

    #[test]
    fn test_reports_every_problem() {
        let validator = UploadValidator::new(100, ["txt"]);
        let result = validator.validate("notes.exe", 0);
        assert_eq!(
            result.errors,
            vec!["unsupported file format: .exe", "file is empty"]
        );

        let result = validator.validate("  ", 101);
        assert_eq!(
            result.errors,
            vec![
                "filename is required",
                "file size exceeds maximum allowed size of 100 bytes"
            ]
        );
    }

    #[test]
    fn test_size_limit_is_inclusive() {
        let validator = UploadValidator::new(100, ["txt"]);
        assert!(validator.validate("a.txt", 100).valid);
        assert!(!validator.validate("a.txt", 101).valid);
    }

    #[test]
    fn test_missing_extension() {
        let result = UploadValidator::default().validate("README", 5);
        assert_eq!(result.errors, vec!["unsupported file format: missing extension"]);
        assert_eq!(result.format, None);
    }

    #[test]
    fn test_configured_formats_are_normalized() {
        let validator = UploadValidator::new(10, [".TXT", " md "]);
        assert!(validator.supports("txt"));
        assert!(validator.supports("MD"));
        assert!(!validator.supports("pdf"));
    }
}
