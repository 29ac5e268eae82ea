//! Content sanitization
//!
//! Bytes become valid UTF-8 (each invalid sequence turns into U+FFFD) and
//! control characters other than tab, newline and carriage return are
//! dropped. Never fails.

use dossier_common::domain::{CustomFields, DocumentMetadata, MetadataValue};

/// Decode raw upload bytes and strip disallowed control characters.
pub fn sanitize(bytes: &[u8]) -> String {
    sanitize_text(&String::from_utf8_lossy(bytes))
}

/// Strip disallowed control characters from already decoded text.
pub fn sanitize_text(text: &str) -> String {
    text.chars().filter(|&c| is_allowed(c)).collect()
}

/// Apply [`sanitize_text`] to every caller-supplied text field. Fields left
/// blank are cleared so processing can fill them.
pub fn sanitize_metadata(mut metadata: DocumentMetadata) -> DocumentMetadata {
    for field in [
        &mut metadata.title,
        &mut metadata.author,
        &mut metadata.department,
        &mut metadata.language,
        &mut metadata.version,
    ] {
        *field = field
            .take()
            .map(|value| sanitize_text(&value))
            .filter(|value| !value.trim().is_empty());
    }

    let tags = std::mem::take(&mut metadata.tags);
    metadata.add_tags(tags.iter().map(|tag| sanitize_text(tag)));

    let mut fields = CustomFields::new();
    for (key, value) in metadata.custom_fields.iter() {
        let value = match value {
            MetadataValue::Text(text) => MetadataValue::Text(sanitize_text(text)),
            other => other.clone(),
        };
        fields.insert_if_absent(key, &value);
    }
    metadata.custom_fields = fields;

    metadata
}

fn is_allowed(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r') || !c.is_control()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_strips_nul_and_controls() {
        assert_eq!(sanitize(b"a\0b\x07c\x1bd\x7f"), "abcd");
    }

    #[test]
    fn test_keeps_layout_whitespace() {
        assert_eq!(sanitize(b"a\tb\r\nc"), "a\tb\r\nc");
    }

    #[test]
    fn test_invalid_utf8_becomes_replacement() {
        assert_eq!(sanitize(&[b'o', b'k', 0xff, b'!']), "ok\u{FFFD}!");
    }

    #[test]
    fn test_text_variant_drops_c1_controls() {
        assert_eq!(sanitize_text("x\u{0085}y\u{009b}z"), "xyz");
    }

    #[test]
    fn test_metadata_text_fields_are_cleaned() {
        let mut metadata = DocumentMetadata {
            title: Some("Q3\0 plan".into()),
            author: Some("\u{7}".into()),
            ..Default::default()
        };
        metadata.add_tags(["bud\0get"]);
        metadata.custom_fields.insert("case_ref", "A\0-12").unwrap();
        metadata.custom_fields.insert("pages", 3i64).unwrap();

        let clean = sanitize_metadata(metadata);
        assert_eq!(clean.title.as_deref(), Some("Q3 plan"));
        assert_eq!(clean.author, None);
        assert!(clean.tags.contains("budget"));
        assert_eq!(
            clean.custom_fields.get("case_ref"),
            Some(&MetadataValue::Text("A-12".into()))
        );
        assert_eq!(clean.custom_fields.get("pages"), Some(&MetadataValue::Number(3.0)));
    }

    proptest! {
        #[test]
        fn prop_output_has_no_disallowed_controls(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let out = sanitize(&bytes);
            prop_assert!(!out.contains('\0'));
            prop_assert!(out.chars().all(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r')));
        }

        #[test]
        fn prop_clean_text_is_unchanged(text in "[a-zA-Z0-9 .,\n\t]{0,200}") {
            prop_assert_eq!(sanitize(text.as_bytes()), text);
        }

        #[test]
        fn prop_idempotent(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let once = sanitize(&bytes);
            prop_assert_eq!(sanitize_text(&once), once.clone());
        }
    }
}
