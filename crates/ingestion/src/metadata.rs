//! Metadata derivation and merging
//!
//! Derivation infers a title, category, tags and language from extracted
//! text. Merging lays the derived values under whatever the uploader
//! supplied: caller fields always win.

use chrono::{DateTime, Utc};
use dossier_common::domain::{Category, DocumentMetadata};
use dossier_common::text::tokenize;
use std::collections::HashSet;
use std::path::Path;

/// First lines at least this long are not used as titles.
const MAX_TITLE_CHARS: usize = 200;

/// Keyword families checked in order; the first family with a whole-word
/// hit decides the category.
const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Policy,
        &["policy", "policies", "regulation", "regulations", "compliance", "procedure", "procedures", "guideline", "guidelines"],
    ),
    (
        Category::Strategy,
        &["strategy", "strategic", "plan", "planning", "roadmap", "vision", "objective", "objectives", "goal", "goals"],
    ),
    (
        Category::Operations,
        &["operation", "operations", "operational", "process", "workflow", "logistics", "deployment", "maintenance"],
    ),
    (
        Category::Technology,
        &["technology", "technical", "software", "hardware", "system", "systems", "network", "infrastructure", "cyber"],
    ),
];

const TAG_KEYWORDS: &[&str] = &[
    "budget",
    "finance",
    "security",
    "privacy",
    "audit",
    "compliance",
    "risk",
    "management",
    "analysis",
    "report",
    "assessment",
    "evaluation",
    "review",
    "proposal",
    "recommendation",
    "implementation",
    "training",
    "personnel",
    "resource",
    "project",
];

const ENGLISH_STOPWORDS: &[&str] = &[
    "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
];

/// Share of stopwords above which text is considered English.
const ENGLISH_STOPWORD_RATIO: f64 = 0.05;

/// Infer metadata from processed text.
pub fn derive(text: &str, file_name: &str, now: DateTime<Utc>) -> DocumentMetadata {
    let words: Vec<String> = tokenize(text).collect();
    let vocabulary: HashSet<&str> = words.iter().map(String::as_str).collect();

    let mut metadata = DocumentMetadata {
        title: infer_title(text, file_name),
        category: categorize(&vocabulary),
        language: Some(detect_language(&words).to_string()),
        created_date: Some(now),
        last_modified: Some(now),
        ..Default::default()
    };
    metadata.add_tags(TAG_KEYWORDS.iter().filter(|tag| vocabulary.contains(*tag)));

    metadata
}

fn infer_title(text: &str, file_name: &str) -> Option<String> {
    let first_line = text.lines().map(str::trim).find(|line| !line.is_empty());

    match first_line {
        Some(line) if line.chars().count() < MAX_TITLE_CHARS => Some(line.to_string()),
        _ => Path::new(file_name.trim())
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .map(str::to_string),
    }
}

fn categorize(vocabulary: &HashSet<&str>) -> Option<Category> {
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| vocabulary.contains(k)))
        .map(|(category, _)| *category)
}

fn detect_language(words: &[String]) -> &'static str {
    if words.is_empty() {
        return "en";
    }

    let stopwords = words
        .iter()
        .filter(|w| ENGLISH_STOPWORDS.contains(&w.as_str()))
        .count();

    if stopwords as f64 / words.len() as f64 > ENGLISH_STOPWORD_RATIO {
        "en"
    } else {
        "unknown"
    }
}

/// Fill the caller's empty fields from `derived`.
///
/// Tags are unioned and custom fields are only added for keys the caller
/// did not set.
pub fn merge(existing: &DocumentMetadata, derived: &DocumentMetadata) -> DocumentMetadata {
    let mut merged = existing.clone();

    fill_text(&mut merged.title, &derived.title);
    fill_text(&mut merged.author, &derived.author);
    fill_text(&mut merged.department, &derived.department);
    fill_text(&mut merged.language, &derived.language);
    fill_text(&mut merged.version, &derived.version);

    merged.category = merged.category.or(derived.category);
    merged.created_date = merged.created_date.or(derived.created_date);
    merged.last_modified = merged.last_modified.or(derived.last_modified);

    merged.tags.extend(derived.tags.iter().cloned());
    for (key, value) in derived.custom_fields.iter() {
        merged.custom_fields.insert_if_absent(key, value);
    }

    merged
}

fn fill_text(target: &mut Option<String>, derived: &Option<String>) {
    let missing = target.as_deref().map_or(true, |v| v.trim().is_empty());
    if !missing {
        return;
    }
    if let Some(value) = derived.as_deref().filter(|v| !v.trim().is_empty()) {
        *target = Some(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_common::domain::MetadataValue;

    #[test]
    fn test_plain_greeting_has_no_category() {
        let metadata = derive("hello team", "policy.txt", Utc::now());
        assert_eq!(metadata.category, None);
        assert_eq!(metadata.title.as_deref(), Some("hello team"));
        assert!(metadata.tags.is_empty());
    }

    #[test]
    fn test_category_uses_first_matching_family() {
        let text = "Network strategy and security policy for the audit";
        let metadata = derive(text, "x.txt", Utc::now());
        assert_eq!(metadata.category, Some(Category::Policy));
        assert!(metadata.tags.contains("security"));
        assert!(metadata.tags.contains("audit"));
    }

    #[test]
    fn test_category_needs_whole_words() {
        let metadata = derive("Systematically repolicying", "x.txt", Utc::now());
        assert_eq!(metadata.category, None);
    }

    #[test]
    fn test_long_first_line_falls_back_to_file_stem() {
        let text = "x".repeat(250);
        let metadata = derive(&text, "annual-report.pdf", Utc::now());
        assert_eq!(metadata.title.as_deref(), Some("annual-report"));
    }

    #[test]
    fn test_language_detection() {
        assert_eq!(detect_language(&[]), "en");

        let english: Vec<String> = tokenize("The budget for the year").collect();
        assert_eq!(detect_language(&english), "en");

        let other: Vec<String> = tokenize("Der Haushalt wurde genehmigt").collect();
        assert_eq!(detect_language(&other), "unknown");
    }

    #[test]
    fn test_merge_caller_wins() {
        let mut existing = DocumentMetadata {
            title: Some("Caller Title".into()),
            author: Some("   ".into()),
            category: Some(Category::Strategy),
            ..Default::default()
        };
        existing.add_tags(["finance"]);
        existing
            .custom_fields
            .insert("owner", MetadataValue::Text("ops".into()))
            .unwrap();

        let mut derived = DocumentMetadata {
            title: Some("Derived Title".into()),
            author: Some("Derived Author".into()),
            category: Some(Category::Policy),
            language: Some("en".into()),
            ..Default::default()
        };
        derived.add_tags(["audit"]);
        derived
            .custom_fields
            .insert("owner", MetadataValue::Text("derived".into()))
            .unwrap();
        derived
            .custom_fields
            .insert("pages", MetadataValue::Number(3.0))
            .unwrap();

        let merged = merge(&existing, &derived);
        assert_eq!(merged.title.as_deref(), Some("Caller Title"));
        assert_eq!(merged.author.as_deref(), Some("Derived Author"));
        assert_eq!(merged.category, Some(Category::Strategy));
        assert_eq!(merged.language.as_deref(), Some("en"));
        assert_eq!(
            merged.tags.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["audit", "finance"]
        );
        assert_eq!(
            merged.custom_fields.get("owner"),
            Some(&MetadataValue::Text("ops".into()))
        );
        assert_eq!(
            merged.custom_fields.get("pages"),
            Some(&MetadataValue::Number(3.0))
        );
    }
}
