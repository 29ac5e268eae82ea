//! PostgreSQL schema for the documents table
//!
//! `search_vector` is maintained by a trigger so partial updates through
//! SeaORM keep the text index current.

/// Content beyond this many characters is not text-indexed (tsvector size limit).
pub const MAX_INDEXED_CONTENT_CHARS: usize = 500_000;

pub const CREATE_DOCUMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id                   UUID PRIMARY KEY,
    name                 TEXT NOT NULL CHECK (length(btrim(name)) > 0),
    content_type         TEXT NOT NULL,
    size                 BIGINT NOT NULL CHECK (size > 0),
    checksum             TEXT NOT NULL,
    content              TEXT NOT NULL DEFAULT '',
    raw                  BYTEA NOT NULL DEFAULT ''::bytea,
    uploaded_by          UUID NOT NULL,
    uploaded_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    classification       TEXT NOT NULL DEFAULT 'internal',
    metadata             JSONB NOT NULL DEFAULT '{}'::jsonb,
    processing_status    TEXT NOT NULL DEFAULT 'pending',
    processing_error     TEXT,
    processing_timestamp TIMESTAMPTZ,
    extracted_entities   JSONB NOT NULL DEFAULT '[]'::jsonb,
    search_vector        TSVECTOR,
    CONSTRAINT documents_error_xor_timestamp
        CHECK (processing_error IS NULL OR processing_timestamp IS NULL)
)
"#;

/// Refresh function; the content limit must match [`MAX_INDEXED_CONTENT_CHARS`].
pub const CREATE_SEARCH_VECTOR_FUNCTION: &str = r#"
CREATE OR REPLACE FUNCTION documents_search_vector_refresh() RETURNS trigger AS $$
BEGIN
    NEW.search_vector :=
        to_tsvector('english', coalesce(NEW.name, '')) ||
        to_tsvector('english', coalesce(NEW.metadata->>'title', '')) ||
        to_tsvector('english', coalesce(
            (SELECT string_agg(tag, ' ')
               FROM jsonb_array_elements_text(coalesce(NEW.metadata->'tags', '[]'::jsonb)) AS tag),
            '')) ||
        to_tsvector('english', left(coalesce(NEW.content, ''), 500000));
    RETURN NEW;
END
$$ LANGUAGE plpgsql
"#;

pub const DROP_SEARCH_VECTOR_TRIGGER: &str =
    "DROP TRIGGER IF EXISTS documents_search_vector_trigger ON documents";

pub const CREATE_SEARCH_VECTOR_TRIGGER: &str = r#"
CREATE TRIGGER documents_search_vector_trigger
    BEFORE INSERT OR UPDATE ON documents
    FOR EACH ROW EXECUTE FUNCTION documents_search_vector_refresh()
"#;

/// Text index plus one secondary index per filterable field.
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS text_search_index ON documents USING GIN (search_vector)",
    "CREATE INDEX IF NOT EXISTS uploaded_by_index ON documents (uploaded_by, uploaded_at DESC)",
    "CREATE INDEX IF NOT EXISTS uploaded_at_index ON documents (uploaded_at DESC)",
    "CREATE INDEX IF NOT EXISTS processing_status_index ON documents (processing_status, uploaded_at)",
    "CREATE INDEX IF NOT EXISTS category_index ON documents ((metadata->>'category'))",
    "CREATE INDEX IF NOT EXISTS tags_index ON documents USING GIN ((metadata->'tags'))",
    "CREATE INDEX IF NOT EXISTS classification_index ON documents (classification)",
];

/// Tables created before the raw payload was stored.
pub const ADD_RAW_COLUMN: &str =
    "ALTER TABLE documents ADD COLUMN IF NOT EXISTS raw BYTEA NOT NULL DEFAULT ''::bytea";

/// Every statement in execution order.
pub fn statements() -> Vec<&'static str> {
    let mut all = vec![
        CREATE_DOCUMENTS_TABLE,
        ADD_RAW_COLUMN,
        CREATE_SEARCH_VECTOR_FUNCTION,
        DROP_SEARCH_VECTOR_TRIGGER,
        CREATE_SEARCH_VECTOR_TRIGGER,
    ];
    all.extend_from_slice(CREATE_INDEXES);
    all
}
