//! PostgreSQL document store
//!
//! SeaORM entities for plain CRUD, raw statements for ranked text search
//! and aggregates. Every call is bounded by the configured query timeout.

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Statement,
    TransactionTrait, Value,
};
use std::collections::BTreeSet;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::models::{DocumentActiveModel, DocumentColumn, DocumentEntity};
use super::schema;
use super::store::DocumentStore;
use super::DbPool;
use crate::domain::{
    resolve_limit, Document, DocumentPatch, DocumentStatistics, ProcessingStatus, SearchFilter,
    SearchPage, DEFAULT_PAGE_LIMIT, DEFAULT_STATUS_LIMIT, UNCATEGORIZED,
};
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::text::tokenize;

/// Search results never carry the raw upload.
const DOCUMENT_COLUMNS: &str = "id, name, content_type, size, checksum, content, \
     ''::bytea AS raw, uploaded_by, uploaded_at, classification, metadata, processing_status, \
     processing_error, processing_timestamp, extracted_entities";

/// Parameterized WHERE clause built from a [`SearchFilter`].
#[derive(Debug, Default)]
struct SearchSql {
    conditions: Vec<String>,
    values: Vec<Value>,
    rank: Option<String>,
}

impl SearchSql {
    /// `None` when the text query has no searchable terms, so nothing can match.
    fn build(filter: &SearchFilter) -> Option<Self> {
        let mut sql = SearchSql::default();

        if let Some(query) = filter.text_query() {
            let terms: BTreeSet<String> = tokenize(query).collect();
            if terms.is_empty() {
                return None;
            }
            // Any term may match; tokens are alphanumeric so they are safe tsquery operands.
            let ts_query = terms.into_iter().collect::<Vec<_>>().join(" | ");
            let p = sql.bind(ts_query);
            sql.conditions
                .push(format!("search_vector @@ to_tsquery('english', {p})"));
            sql.rank = Some(format!("ts_rank(search_vector, to_tsquery('english', {p}))"));
        }

        if let Some(category) = filter.category {
            let p = sql.bind(category.as_str());
            sql.conditions.push(format!("metadata->>'category' = {p}"));
        }

        if !filter.tags.is_empty() {
            let placeholders: Vec<String> = filter
                .tags
                .iter()
                .map(|tag| sql.bind(tag.as_str()))
                .collect();
            sql.conditions.push(format!(
                "metadata->'tags' ?| ARRAY[{}]::text[]",
                placeholders.join(", ")
            ));
        }

        if let Some(user) = filter.uploaded_by {
            let p = sql.bind(user);
            sql.conditions.push(format!("uploaded_by = {p}"));
        }

        if let Some(classification) = filter.classification {
            let p = sql.bind(classification.as_str());
            sql.conditions.push(format!("classification = {p}"));
        }

        if let Some(status) = filter.status {
            let p = sql.bind(status.as_str());
            sql.conditions.push(format!("processing_status = {p}"));
        }

        if let Some(from) = filter.date_from {
            let p = sql.bind(from);
            sql.conditions.push(format!("uploaded_at >= {p}"));
        }

        if let Some(to) = filter.date_to {
            let p = sql.bind(to);
            sql.conditions.push(format!("uploaded_at <= {p}"));
        }

        Some(sql)
    }

    fn bind(&mut self, value: impl Into<Value>) -> String {
        self.values.push(value.into());
        format!("${}", self.values.len())
    }

    fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.conditions.join(" AND "))
        }
    }

    fn count_statement(&self) -> Statement {
        Statement::from_sql_and_values(
            DbBackend::Postgres,
            format!("SELECT COUNT(*) AS total FROM documents {}", self.where_clause()),
            self.values.clone(),
        )
    }

    fn page_statement(&self, limit: u64, skip: u64) -> Statement {
        let mut values = self.values.clone();
        values.push(Value::from(i64::try_from(limit).unwrap_or(i64::MAX)));
        values.push(Value::from(i64::try_from(skip).unwrap_or(i64::MAX)));
        let limit_p = values.len() - 1;
        let skip_p = values.len();

        let order = match &self.rank {
            Some(rank) => format!("{rank} DESC, uploaded_at DESC, id DESC"),
            None => "uploaded_at DESC, id DESC".to_string(),
        };

        Statement::from_sql_and_values(
            DbBackend::Postgres,
            format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents {} ORDER BY {order} LIMIT ${limit_p} OFFSET ${skip_p}",
                self.where_clause()
            ),
            values,
        )
    }
}

/// Repository for document data access
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
    query_timeout: Duration,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.connection()
    }

    /// Run a storage call under the query timeout.
    async fn timed<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => {
                metrics::record_storage(operation, start.elapsed().as_secs_f64(), false);
                result
            }
            Err(_) => {
                metrics::record_storage(operation, start.elapsed().as_secs_f64(), true);
                warn!(operation, timeout_ms = self.query_timeout.as_millis() as u64, "Storage call timed out");
                Err(AppError::StorageTimeout {
                    operation: operation.to_string(),
                    timeout_ms: self.query_timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn grouped_counts(&self, sql: &str) -> Result<Vec<(String, u64)>> {
        let rows = self
            .conn()
            .query_all(Statement::from_string(DbBackend::Postgres, sql))
            .await?;

        rows.into_iter()
            .map(|row| -> Result<(String, u64)> {
                let bucket: String = row.try_get("", "bucket")?;
                let count: i64 = row.try_get("", "n")?;
                Ok((bucket, count.max(0) as u64))
            })
            .collect()
    }
}

#[async_trait]
impl DocumentStore for Repository {
    #[instrument(skip(self, doc), fields(document_id = %doc.id))]
    async fn create(&self, mut doc: Document) -> Result<Document> {
        doc.validate()?;
        if doc.id.is_nil() {
            doc.id = Uuid::new_v4();
        }
        let active = DocumentActiveModel::try_from(&doc)?;

        let row = self
            .timed("create", async {
                active.insert(self.conn()).await.map_err(AppError::from)
            })
            .await?;

        Document::try_from(row)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Document> {
        let row = self
            .timed("get_by_id", async {
                DocumentEntity::find_by_id(id)
                    .one(self.conn())
                    .await
                    .map_err(AppError::from)
            })
            .await?
            .ok_or(AppError::DocumentNotFound { id })?;

        Document::try_from(row)
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, id: Uuid, patch: DocumentPatch) -> Result<Document> {
        self.timed("update", async {
            let txn = self.conn().begin().await?;

            // Row lock serializes guarded status changes.
            let row = DocumentEntity::find_by_id(id)
                .lock_exclusive()
                .one(&txn)
                .await?
                .ok_or(AppError::DocumentNotFound { id })?;

            let mut doc = Document::try_from(row)?;
            doc.apply(&patch)?;

            // Patches never touch the upload bytes.
            let mut active = DocumentActiveModel::try_from(&doc)?;
            active.raw = ActiveValue::NotSet;
            let saved = active.update(&txn).await?;
            txn.commit().await?;

            Document::try_from(saved)
        })
        .await
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let result = self
            .timed("delete", async {
                DocumentEntity::delete_by_id(id)
                    .exec(self.conn())
                    .await
                    .map_err(AppError::from)
            })
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::DocumentNotFound { id });
        }
        Ok(())
    }

    #[instrument(skip(self, filter), fields(query = ?filter.query))]
    async fn search(&self, filter: &SearchFilter) -> Result<SearchPage> {
        let Some(sql) = SearchSql::build(filter) else {
            return Ok(SearchPage::default());
        };
        let limit = filter.effective_limit();

        self.timed("search", async {
            let total = self
                .conn()
                .query_one(sql.count_statement())
                .await?
                .map(|row| row.try_get::<i64>("", "total"))
                .transpose()?
                .unwrap_or(0);

            let rows = DocumentEntity::find()
                .from_raw_sql(sql.page_statement(limit, filter.skip))
                .all(self.conn())
                .await?;

            let data = rows
                .into_iter()
                .map(Document::try_from)
                .collect::<Result<Vec<_>>>()?;

            Ok::<_, AppError>(SearchPage {
                data,
                total: total.max(0) as u64,
            })
        })
        .await
    }

    async fn get_by_status(
        &self,
        status: ProcessingStatus,
        limit: Option<i64>,
    ) -> Result<Vec<Document>> {
        let limit = resolve_limit(limit, DEFAULT_STATUS_LIMIT);

        let rows = self
            .timed("get_by_status", async {
                DocumentEntity::find()
                    .filter(DocumentColumn::ProcessingStatus.eq(status.as_str()))
                    .order_by_asc(DocumentColumn::UploadedAt)
                    .order_by_asc(DocumentColumn::Id)
                    .limit(limit)
                    .all(self.conn())
                    .await
                    .map_err(AppError::from)
            })
            .await?;

        rows.into_iter().map(Document::try_from).collect()
    }

    async fn get_by_user(&self, user: Uuid, limit: Option<i64>, skip: u64) -> Result<SearchPage> {
        let limit = resolve_limit(limit, DEFAULT_PAGE_LIMIT);
        let query = DocumentEntity::find().filter(DocumentColumn::UploadedBy.eq(user));

        let (rows, total) = self
            .timed("get_by_user", async {
                let total = query.clone().count(self.conn()).await?;
                let rows = query
                    .order_by_desc(DocumentColumn::UploadedAt)
                    .order_by_desc(DocumentColumn::Id)
                    .offset(skip.min(i64::MAX as u64))
                    .limit(limit)
                    .all(self.conn())
                    .await?;
                Ok::<_, AppError>((rows, total))
            })
            .await?;

        Ok(SearchPage {
            data: rows
                .into_iter()
                .map(Document::try_from)
                .collect::<Result<Vec<_>>>()?,
            total,
        })
    }

    async fn statistics(&self) -> Result<DocumentStatistics> {
        let by_status_sql = "SELECT processing_status AS bucket, COUNT(*) AS n \
                             FROM documents GROUP BY processing_status";
        let by_category_sql = format!(
            "SELECT COALESCE(metadata->>'category', '{UNCATEGORIZED}') AS bucket, COUNT(*) AS n \
             FROM documents GROUP BY 1"
        );

        self.timed("statistics", async {
            let mut stats = DocumentStatistics::empty();

            for (status, count) in self.grouped_counts(by_status_sql).await? {
                stats.total += count;
                stats.by_status.insert(status, count);
            }
            for (category, count) in self.grouped_counts(&by_category_sql).await? {
                stats.by_category.insert(category, count);
            }

            Ok::<_, AppError>(stats)
        })
        .await
    }

    async fn ensure_indexes(&self) -> Result<()> {
        info!("Ensuring documents schema and indexes");
        for statement in schema::statements() {
            self.conn().execute_unprepared(statement).await?;
        }
        info!("Documents schema ready");
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.timed("ping", self.pool.ping()).await
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Category, ClassificationLevel};

    #[test]
    fn test_empty_filter_has_no_where_clause() {
        let sql = SearchSql::build(&SearchFilter::default()).unwrap();
        assert_eq!(sql.where_clause(), "");
        assert!(sql.rank.is_none());

        let page = sql.page_statement(20, 0);
        assert!(page.sql.contains("ORDER BY uploaded_at DESC, id DESC LIMIT $1 OFFSET $2"));
    }

    #[test]
    fn test_query_terms_are_or_combined_and_ranked() {
        let filter = SearchFilter {
            query: Some("Budget, review!".into()),
            ..Default::default()
        };
        let sql = SearchSql::build(&filter).unwrap();

        assert_eq!(sql.values.len(), 1);
        assert_eq!(sql.values[0], Value::from("budget | review"));
        assert!(sql.where_clause().contains("search_vector @@ to_tsquery('english', $1)"));

        let page = sql.page_statement(5, 10);
        assert!(page
            .sql
            .contains("ORDER BY ts_rank(search_vector, to_tsquery('english', $1)) DESC"));
        assert!(page.sql.ends_with("LIMIT $2 OFFSET $3"));
    }

    #[test]
    fn test_huge_skip_is_clamped() {
        let sql = SearchSql::build(&SearchFilter::default()).unwrap();
        let page = sql.page_statement(20, u64::MAX);
        let values = page.values.unwrap().0;
        assert_eq!(values[1], Value::from(i64::MAX));
    }

    #[test]
    fn test_search_rows_leave_out_raw_payload() {
        let page = SearchSql::build(&SearchFilter::default())
            .unwrap()
            .page_statement(20, 0);
        assert!(page.sql.contains("''::bytea AS raw"));
    }

    #[test]
    fn test_punctuation_only_query_matches_nothing() {
        let filter = SearchFilter {
            query: Some("?!".into()),
            ..Default::default()
        };
        assert!(SearchSql::build(&filter).is_none());
    }

    #[test]
    fn test_structured_filters_are_parameterized() {
        let filter = SearchFilter {
            category: Some(Category::Policy),
            tags: vec!["budget".into(), "risk".into()],
            uploaded_by: Some(Uuid::nil()),
            classification: Some(ClassificationLevel::Secret),
            status: Some(ProcessingStatus::Completed),
            date_from: Some(chrono::Utc::now()),
            date_to: Some(chrono::Utc::now()),
            ..Default::default()
        };
        let sql = SearchSql::build(&filter).unwrap();
        let clause = sql.where_clause();

        assert_eq!(sql.values.len(), 8);
        assert!(clause.contains("metadata->>'category' = $1"));
        assert!(clause.contains("metadata->'tags' ?| ARRAY[$2, $3]::text[]"));
        assert!(clause.contains("uploaded_by = $4"));
        assert!(clause.contains("classification = $5"));
        assert!(clause.contains("processing_status = $6"));
        assert!(clause.contains("uploaded_at >= $7"));
        assert!(clause.contains("uploaded_at <= $8"));
        assert_eq!(clause.matches(" AND ").count(), 6);
    }
}
