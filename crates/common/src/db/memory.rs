//! In-process document store
//!
//! Keeps documents in memory behind one `RwLock` together with an inverted
//! text index and the same secondary indexes the PostgreSQL schema creates
//! (uploader, upload time, status, category, tags, classification). Used by
//! tests and by deployments started with `memory://`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::Hash;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::store::DocumentStore;
use crate::domain::{
    resolve_limit, Category, ClassificationLevel, Document, DocumentPatch, DocumentStatistics,
    ProcessingStatus, SearchFilter, SearchPage, DEFAULT_PAGE_LIMIT, DEFAULT_STATUS_LIMIT,
};
use crate::errors::{AppError, Result};
use crate::text::tokenize;

/// Upload time first so ordered sets iterate chronologically.
type TimeKey = (DateTime<Utc>, Uuid);

#[derive(Default)]
struct Indexes {
    docs: HashMap<Uuid, Document>,
    /// term -> document -> occurrences
    postings: HashMap<String, HashMap<Uuid, u32>>,
    by_uploaded: BTreeSet<TimeKey>,
    by_status: HashMap<ProcessingStatus, BTreeSet<TimeKey>>,
    by_user: HashMap<Uuid, BTreeSet<TimeKey>>,
    by_category: HashMap<Category, HashSet<Uuid>>,
    by_tag: HashMap<String, HashSet<Uuid>>,
    by_classification: HashMap<ClassificationLevel, HashSet<Uuid>>,
}

/// Term counts over the text-indexed fields: name, title, tags, content.
fn term_frequencies(doc: &Document) -> HashMap<String, u32> {
    let mut freqs = HashMap::new();
    let title = doc.metadata.title.as_deref().unwrap_or_default();
    let fields = [doc.name.as_str(), title, doc.content.as_str()];

    for field in fields
        .into_iter()
        .chain(doc.metadata.tags.iter().map(String::as_str))
    {
        for term in tokenize(field) {
            *freqs.entry(term).or_insert(0) += 1;
        }
    }
    freqs
}

fn remove_timed<K: Hash + Eq>(map: &mut HashMap<K, BTreeSet<TimeKey>>, key: &K, entry: &TimeKey) {
    if let Some(set) = map.get_mut(key) {
        set.remove(entry);
        if set.is_empty() {
            map.remove(key);
        }
    }
}

fn remove_id<K: Hash + Eq>(map: &mut HashMap<K, HashSet<Uuid>>, key: &K, id: &Uuid) {
    if let Some(set) = map.get_mut(key) {
        set.remove(id);
        if set.is_empty() {
            map.remove(key);
        }
    }
}

impl Indexes {
    fn insert(&mut self, doc: Document) {
        let key = (doc.uploaded_at, doc.id);

        for (term, count) in term_frequencies(&doc) {
            self.postings.entry(term).or_default().insert(doc.id, count);
        }
        self.by_uploaded.insert(key);
        self.by_status
            .entry(doc.processing_status)
            .or_default()
            .insert(key);
        self.by_user.entry(doc.uploaded_by).or_default().insert(key);
        if let Some(category) = doc.metadata.category {
            self.by_category.entry(category).or_default().insert(doc.id);
        }
        for tag in &doc.metadata.tags {
            self.by_tag.entry(tag.clone()).or_default().insert(doc.id);
        }
        self.by_classification
            .entry(doc.classification)
            .or_default()
            .insert(doc.id);

        self.docs.insert(doc.id, doc);
    }

    fn remove(&mut self, id: &Uuid) -> Option<Document> {
        let doc = self.docs.remove(id)?;
        let key = (doc.uploaded_at, doc.id);

        for term in term_frequencies(&doc).into_keys() {
            if let Some(list) = self.postings.get_mut(&term) {
                list.remove(id);
                if list.is_empty() {
                    self.postings.remove(&term);
                }
            }
        }
        self.by_uploaded.remove(&key);
        remove_timed(&mut self.by_status, &doc.processing_status, &key);
        remove_timed(&mut self.by_user, &doc.uploaded_by, &key);
        if let Some(category) = doc.metadata.category {
            remove_id(&mut self.by_category, &category, id);
        }
        for tag in &doc.metadata.tags {
            remove_id(&mut self.by_tag, tag, id);
        }
        remove_id(&mut self.by_classification, &doc.classification, id);

        Some(doc)
    }

    /// Smallest id set implied by the structured criteria.
    fn candidates(&self, filter: &SearchFilter) -> Vec<Uuid> {
        let timed_ids = |set: Option<&BTreeSet<TimeKey>>| -> Vec<Uuid> {
            set.map(|s| s.iter().map(|(_, id)| *id).collect())
                .unwrap_or_default()
        };
        let ids = |set: Option<&HashSet<Uuid>>| -> Vec<Uuid> {
            set.map(|s| s.iter().copied().collect()).unwrap_or_default()
        };

        let mut lists: Vec<Vec<Uuid>> = Vec::new();
        if let Some(status) = filter.status {
            lists.push(timed_ids(self.by_status.get(&status)));
        }
        if let Some(user) = filter.uploaded_by {
            lists.push(timed_ids(self.by_user.get(&user)));
        }
        if let Some(category) = filter.category {
            lists.push(ids(self.by_category.get(&category)));
        }
        if let Some(classification) = filter.classification {
            lists.push(ids(self.by_classification.get(&classification)));
        }
        if !filter.tags.is_empty() {
            let tagged: HashSet<Uuid> = filter
                .tags
                .iter()
                .filter_map(|tag| self.by_tag.get(tag))
                .flat_map(|set| set.iter().copied())
                .collect();
            lists.push(tagged.into_iter().collect());
        }

        lists
            .into_iter()
            .min_by_key(Vec::len)
            .unwrap_or_else(|| self.by_uploaded.iter().map(|(_, id)| *id).collect())
    }

    /// Documents matching any query term, with summed term counts.
    fn score(&self, query: &str) -> HashMap<Uuid, f64> {
        let terms: BTreeSet<String> = tokenize(query).collect();
        let mut scores: HashMap<Uuid, f64> = HashMap::new();

        for term in &terms {
            if let Some(list) = self.postings.get(term) {
                for (id, count) in list {
                    *scores.entry(*id).or_insert(0.0) += f64::from(*count);
                }
            }
        }
        scores
    }

    fn search(&self, filter: &SearchFilter) -> SearchPage {
        let mut hits: Vec<(f64, &Document)> = match filter.text_query() {
            Some(query) => self
                .score(query)
                .into_iter()
                .filter_map(|(id, score)| self.docs.get(&id).map(|doc| (score, doc)))
                .filter(|(_, doc)| filter.matches(doc))
                .collect(),
            None => self
                .candidates(filter)
                .into_iter()
                .filter_map(|id| self.docs.get(&id))
                .filter(|doc| filter.matches(doc))
                .map(|doc| (0.0, doc))
                .collect(),
        };

        // Relevance first; all scores are equal without a query, leaving newest first.
        hits.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| b.1.uploaded_at.cmp(&a.1.uploaded_at))
                .then_with(|| b.1.id.cmp(&a.1.id))
        });

        let total = hits.len() as u64;
        let data = hits
            .into_iter()
            .skip(usize::try_from(filter.skip).unwrap_or(usize::MAX))
            .take(filter.effective_limit() as usize)
            .map(|(_, doc)| doc.clone())
            .collect();

        SearchPage { data, total }
    }
}

/// Document store held entirely in process memory.
#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: RwLock<Indexes>,
}

impl MemoryDocumentStore {
    /// Name reported by [`DocumentStore::backend`].
    pub const BACKEND: &'static str = "memory";

    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents
    pub async fn len(&self) -> usize {
        self.inner.read().await.docs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create(&self, mut doc: Document) -> Result<Document> {
        doc.validate()?;
        if doc.id.is_nil() {
            doc.id = Uuid::new_v4();
        }

        let mut inner = self.inner.write().await;
        if inner.docs.contains_key(&doc.id) {
            return Err(AppError::Conflict {
                message: format!("document {} already exists", doc.id),
            });
        }
        inner.insert(doc.clone());

        debug!(document_id = %doc.id, "Document stored");
        Ok(doc)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Document> {
        self.inner
            .read()
            .await
            .docs
            .get(&id)
            .cloned()
            .ok_or(AppError::DocumentNotFound { id })
    }

    async fn update(&self, id: Uuid, patch: DocumentPatch) -> Result<Document> {
        let mut inner = self.inner.write().await;

        let mut doc = inner
            .docs
            .get(&id)
            .cloned()
            .ok_or(AppError::DocumentNotFound { id })?;
        doc.apply(&patch)?;

        inner.remove(&id);
        inner.insert(doc.clone());
        Ok(doc)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.inner
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(AppError::DocumentNotFound { id })
    }

    async fn search(&self, filter: &SearchFilter) -> Result<SearchPage> {
        Ok(self.inner.read().await.search(filter))
    }

    async fn get_by_status(
        &self,
        status: ProcessingStatus,
        limit: Option<i64>,
    ) -> Result<Vec<Document>> {
        let limit = resolve_limit(limit, DEFAULT_STATUS_LIMIT) as usize;
        let inner = self.inner.read().await;

        Ok(inner
            .by_status
            .get(&status)
            .into_iter()
            .flat_map(|set| set.iter())
            .filter_map(|(_, id)| inner.docs.get(id).cloned())
            .take(limit)
            .collect())
    }

    async fn get_by_user(&self, user: Uuid, limit: Option<i64>, skip: u64) -> Result<SearchPage> {
        let limit = resolve_limit(limit, DEFAULT_PAGE_LIMIT) as usize;
        let inner = self.inner.read().await;

        let Some(set) = inner.by_user.get(&user) else {
            return Ok(SearchPage::default());
        };

        let data = set
            .iter()
            .rev()
            .skip(usize::try_from(skip).unwrap_or(usize::MAX))
            .take(limit)
            .filter_map(|(_, id)| inner.docs.get(id).cloned())
            .collect();

        Ok(SearchPage {
            data,
            total: set.len() as u64,
        })
    }

    async fn statistics(&self) -> Result<DocumentStatistics> {
        let inner = self.inner.read().await;
        let mut stats = DocumentStatistics::empty();
        for doc in inner.docs.values() {
            stats.record(doc);
        }
        Ok(stats)
    }

    async fn ensure_indexes(&self) -> Result<()> {
        // Indexes are maintained on every write.
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        Self::BACKEND
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn doc_at(name: &str, content: &str, user: Uuid, offset_secs: i64) -> Document {
        let mut doc = Document::new(name, "text/plain", content.len().max(1) as u64, user);
        doc.content = content.to_string();
        doc.uploaded_at = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + Duration::seconds(offset_secs);
        doc
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryDocumentStore::new();
        let mut doc = doc_at("a.txt", "hello", Uuid::new_v4(), 0);
        doc.id = Uuid::nil();

        let created = store.create(doc).await.unwrap();
        assert!(!created.id.is_nil());

        let fetched = store.get_by_id(created.id).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_missing_document_errors() {
        let store = MemoryDocumentStore::new();
        let id = Uuid::new_v4();

        assert!(matches!(store.get_by_id(id).await, Err(AppError::DocumentNotFound { .. })));
        assert!(matches!(store.delete(id).await, Err(AppError::DocumentNotFound { .. })));
        assert!(matches!(
            store.update(id, DocumentPatch::claim()).await,
            Err(AppError::DocumentNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_document() {
        let store = MemoryDocumentStore::new();
        let doc = Document::new("  ", "text/plain", 1, Uuid::new_v4());
        assert!(matches!(store.create(doc).await, Err(AppError::Validation { .. })));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_ranking_prefers_more_matches() {
        let store = MemoryDocumentStore::new();
        let user = Uuid::new_v4();
        let d1 = store
            .create(doc_at("d1.txt", "budget review of the budget", user, 0))
            .await
            .unwrap();
        let d2 = store
            .create(doc_at("d2.txt", "annual budget", user, 10))
            .await
            .unwrap();
        store
            .create(doc_at("d3.txt", "unrelated notes", user, 20))
            .await
            .unwrap();

        let page = store
            .search(&SearchFilter {
                query: Some("budget".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(page.total, 2);
        assert_eq!(page.data[0].id, d1.id);
        assert_eq!(page.data[1].id, d2.id);
    }

    #[tokio::test]
    async fn test_pagination_reports_total() {
        let store = MemoryDocumentStore::new();
        let user = Uuid::new_v4();
        let mut ids = Vec::new();
        for i in 0..3 {
            let doc = store
                .create(doc_at(&format!("{i}.txt"), "quarterly report", user, i))
                .await
                .unwrap();
            ids.push(doc.id);
        }

        let page = store
            .search(&SearchFilter {
                limit: Some(1),
                skip: 1,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(page.total, 3);
        assert_eq!(page.data.len(), 1);
        // Newest first without a query: ids[2], ids[1], ids[0]
        assert_eq!(page.data[0].id, ids[1]);
    }

    #[tokio::test]
    async fn test_non_positive_limit_uses_default() {
        let store = MemoryDocumentStore::new();
        let user = Uuid::new_v4();
        for i in 0..25 {
            store
                .create(doc_at(&format!("{i}.txt"), "x", user, i))
                .await
                .unwrap();
        }

        let page = store
            .search(&SearchFilter {
                limit: Some(0),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.data.len(), 20);
        assert_eq!(page.total, 25);
    }

    #[tokio::test]
    async fn test_filters_combine_with_and() {
        let store = MemoryDocumentStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let mut policy = doc_at("policy.txt", "travel policy", alice, 0);
        policy.metadata.category = Some(Category::Policy);
        policy.metadata.add_tags(["finance"]);
        let policy = store.create(policy).await.unwrap();

        let mut other = doc_at("other.txt", "travel policy", bob, 5);
        other.metadata.category = Some(Category::Policy);
        other.classification = ClassificationLevel::Secret;
        store.create(other).await.unwrap();

        let page = store
            .search(&SearchFilter {
                query: Some("travel".into()),
                category: Some(Category::Policy),
                uploaded_by: Some(alice),
                tags: vec!["finance".into(), "risk".into()],
                classification: Some(ClassificationLevel::Internal),
                status: Some(ProcessingStatus::Pending),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].id, policy.id);
    }

    #[tokio::test]
    async fn test_update_reindexes_text_and_status() {
        let store = MemoryDocumentStore::new();
        let doc = store
            .create(doc_at("a.txt", "draft", Uuid::new_v4(), 0))
            .await
            .unwrap();

        store.update(doc.id, DocumentPatch::claim()).await.unwrap();
        let patch = DocumentPatch::complete(
            "final procurement plan".into(),
            Default::default(),
            vec![],
            Utc::now(),
        );
        store.update(doc.id, patch).await.unwrap();

        let old = store
            .search(&SearchFilter {
                query: Some("draft".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(old.total, 0);

        let new = store
            .search(&SearchFilter {
                query: Some("procurement".into()),
                status: Some(ProcessingStatus::Completed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(new.total, 1);

        let pending = store
            .get_by_status(ProcessingStatus::Pending, None)
            .await
            .unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_get_by_status_is_oldest_first() {
        let store = MemoryDocumentStore::new();
        let user = Uuid::new_v4();
        let newer = store.create(doc_at("n.txt", "x", user, 100)).await.unwrap();
        let older = store.create(doc_at("o.txt", "x", user, 1)).await.unwrap();

        let docs = store
            .get_by_status(ProcessingStatus::Pending, Some(-1))
            .await
            .unwrap();
        assert_eq!(
            docs.iter().map(|d| d.id).collect::<Vec<_>>(),
            vec![older.id, newer.id]
        );

        let one = store
            .get_by_status(ProcessingStatus::Pending, Some(1))
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].id, older.id);
    }

    #[tokio::test]
    async fn test_get_by_user_is_newest_first() {
        let store = MemoryDocumentStore::new();
        let user = Uuid::new_v4();
        let first = store.create(doc_at("1.txt", "x", user, 1)).await.unwrap();
        let second = store.create(doc_at("2.txt", "x", user, 2)).await.unwrap();
        store
            .create(doc_at("3.txt", "x", Uuid::new_v4(), 3))
            .await
            .unwrap();

        let page = store.get_by_user(user, None, 0).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.data[0].id, second.id);
        assert_eq!(page.data[1].id, first.id);

        let page = store.get_by_user(user, Some(1), 1).await.unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].id, first.id);

        let empty = store.get_by_user(Uuid::new_v4(), None, 0).await.unwrap();
        assert_eq!(empty.total, 0);
    }

    #[tokio::test]
    async fn test_delete_removes_from_indexes() {
        let store = MemoryDocumentStore::new();
        let doc = store
            .create(doc_at("gone.txt", "ephemeral", Uuid::new_v4(), 0))
            .await
            .unwrap();

        store.delete(doc.id).await.unwrap();

        let page = store
            .search(&SearchFilter {
                query: Some("ephemeral".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 0);
        assert_eq!(store.statistics().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_statistics_counts() {
        let store = MemoryDocumentStore::new();
        let user = Uuid::new_v4();
        let mut tech = doc_at("t.txt", "x", user, 0);
        tech.metadata.category = Some(Category::Technology);
        let tech = store.create(tech).await.unwrap();
        store.create(doc_at("u.txt", "x", user, 1)).await.unwrap();
        store.update(tech.id, DocumentPatch::claim()).await.unwrap();

        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_status["pending"], 1);
        assert_eq!(stats.by_status["processing"], 1);
        assert_eq!(stats.by_category["technology"], 1);
        assert_eq!(stats.by_category["uncategorized"], 1);
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let store = Arc::new(MemoryDocumentStore::new());
        let doc = store
            .create(doc_at("a.txt", "x", Uuid::new_v4(), 0))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.update(doc.id, DocumentPatch::claim()).await.is_ok()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
