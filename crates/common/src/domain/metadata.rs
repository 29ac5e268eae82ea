//! Document metadata and the typed custom-field bag

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::document::Category;
use crate::errors::{AppError, Result};

/// Longest accepted custom field key.
pub const MAX_FIELD_KEY_LEN: usize = 64;

/// Descriptive metadata attached to a document.
///
/// Every field is optional; empty fields are filled by the processing
/// pipeline from values derived out of the content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "CustomFields::is_empty")]
    pub custom_fields: CustomFields,
}

impl DocumentMetadata {
    /// Add tags after trimming and lowercasing; blanks are dropped.
    pub fn add_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for tag in tags {
            let tag = tag.as_ref().trim().to_lowercase();
            if !tag.is_empty() {
                self.tags.insert(tag);
            }
        }
    }
}

/// Value stored in a custom field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MetadataValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Number(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Number(value as f64)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for MetadataValue {
    fn from(value: DateTime<Utc>) -> Self {
        MetadataValue::Timestamp(value)
    }
}

/// Custom fields keyed by `[a-z0-9_]{1,64}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, MetadataValue>",
    into = "BTreeMap<String, MetadataValue>"
)]
pub struct CustomFields(BTreeMap<String, MetadataValue>);

impl CustomFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, replacing any previous value.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Result<Option<MetadataValue>> {
        let key = key.into();
        validate_field_key(&key)?;
        Ok(self.0.insert(key, value.into()))
    }

    /// Insert only when the key is absent. Returns whether it was inserted.
    pub fn insert_if_absent(&mut self, key: &str, value: &MetadataValue) -> bool {
        if self.0.contains_key(key) {
            return false;
        }
        self.0.insert(key.to_string(), value.clone());
        true
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<BTreeMap<String, MetadataValue>> for CustomFields {
    type Error = AppError;

    fn try_from(map: BTreeMap<String, MetadataValue>) -> Result<Self> {
        for key in map.keys() {
            validate_field_key(key)?;
        }
        Ok(Self(map))
    }
}

impl From<CustomFields> for BTreeMap<String, MetadataValue> {
    fn from(fields: CustomFields) -> Self {
        fields.0
    }
}

/// Keys are 1 to 64 characters of lowercase ASCII letters, digits and `_`.
pub fn validate_field_key(key: &str) -> Result<()> {
    let well_formed = !key.is_empty()
        && key.len() <= MAX_FIELD_KEY_LEN
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');

    if well_formed {
        Ok(())
    } else {
        Err(AppError::validation(
            "custom_fields",
            format!("invalid custom field key: {key:?}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_field_keys() {
        let mut fields = CustomFields::new();
        assert!(fields.insert("fiscal_year", 2024_i64).is_ok());
        assert!(fields.insert("Fiscal Year", "x").is_err());
        assert!(fields.insert("", true).is_err());
        assert!(fields.insert("a".repeat(65), true).is_err());
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn test_insert_if_absent_keeps_existing() {
        let mut fields = CustomFields::new();
        fields.insert("owner", "ops").unwrap();

        assert!(!fields.insert_if_absent("owner", &MetadataValue::from("finance")));
        assert!(fields.insert_if_absent("reviewed", &MetadataValue::Bool(true)));
        assert_eq!(fields.get("owner"), Some(&MetadataValue::from("ops")));
    }

    #[test]
    fn test_custom_fields_reject_bad_keys_on_deserialize() {
        let ok = r#"{"budget":{"type":"number","value":12.5}}"#;
        let fields: CustomFields = serde_json::from_str(ok).unwrap();
        assert_eq!(fields.get("budget"), Some(&MetadataValue::Number(12.5)));

        let bad = r#"{"Bad Key":{"type":"bool","value":true}}"#;
        assert!(serde_json::from_str::<CustomFields>(bad).is_err());
    }

    #[test]
    fn test_add_tags_normalizes() {
        let mut metadata = DocumentMetadata::default();
        metadata.add_tags([" Budget ", "budget", "", "RISK"]);
        assert_eq!(
            metadata.tags.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["budget", "risk"]
        );
    }
}
