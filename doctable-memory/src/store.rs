//! In-memory storage implementation for tables.
//!
//! This module provides a simple in-memory backend that stores documents as BSON in ordered
//! maps behind an async-aware read-write lock.

use std::{collections::{BTreeMap, HashMap}, sync::Arc};
use async_trait::async_trait;
use futures::stream;
use mea::rwlock::RwLock;
use bson::{Bson, Document};
use tracing::debug;

use doctable_core::{
    backend::{BulkWriteSummary, TableBackend, TableBackendBuilder},
    document::{PRIMARY_KEY, Record, RecordId},
    error::{TableError, TableResult},
    query::{Expr, Query, SortDirection, UpdateOp},
    schema::IndexSpec,
    stream::RecordStream,
};

use crate::evaluator::{Comparable, DocumentEvaluator, compare_by, lookup};

/// One collection: documents keyed by their rendered `_id`, plus the indexes declared on it.
#[derive(Debug, Default, Clone)]
struct MemoryCollection {
    documents: BTreeMap<String, Document>,
    indexes: Vec<IndexSpec>,
    options: Document,
}

impl MemoryCollection {
    fn matching(&self, filter: Option<&Expr>) -> TableResult<Vec<&Document>> {
        let mut matched = Vec::new();
        for document in self.documents.values() {
            if DocumentEvaluator::matches(document, filter)? {
                matched.push(document);
            }
        }

        Ok(matched)
    }

    fn insert(&mut self, collection: &str, record: Record) -> TableResult<Record> {
        let record = match record.primary_id().cloned() {
            Some(id) => record.with_primary_id(&RecordId::new(id)?),
            None => record.with_primary_id(&RecordId::from(uuid::Uuid::new_v4().to_string())),
        };

        let key = key_of(record.primary_id().unwrap_or(&Bson::Null));
        if self.documents.contains_key(&key) {
            return Err(TableError::DocumentAlreadyExists(key, collection.to_string()));
        }

        self.documents.insert(key, record.as_document().clone());

        Ok(record)
    }
}

type StoreMap = HashMap<String, MemoryCollection>;

/// Renders an identifier as a map key. Numerically equal identifiers share a key.
fn key_of(id: &Bson) -> String {
    match id {
        Bson::Int32(value) => value.to_string(),
        Bson::Int64(value) => value.to_string(),
        other => other.to_string(),
    }
}

/// Keeps `_id` and the requested top-level fields.
fn project(document: &Document, fields: &[String]) -> Document {
    let mut projected = Document::new();
    if let Some(id) = document.get(PRIMARY_KEY) {
        projected.insert(PRIMARY_KEY, id.clone());
    }
    for field in fields {
        if let Some(value) = document.get(field) {
            projected.insert(field.clone(), value.clone());
        }
    }

    projected
}

fn array_field<'a>(document: &'a mut Document, field: &str) -> TableResult<Option<&'a mut Vec<Bson>>> {
    match document.get_mut(field) {
        None => Ok(None),
        Some(Bson::Array(items)) => Ok(Some(items)),
        Some(_) => Err(TableError::InvalidDocument(format!("field `{}` is not an array", field))),
    }
}

/// Value equality used by array updates: numerically equal values match across widths.
fn same_value(a: &Bson, b: &Bson) -> bool {
    Comparable::from(a) == Comparable::from(b)
}

fn apply_update(document: &mut Document, update: UpdateOp) -> TableResult<()> {
    match update {
        UpdateOp::Set(fields) => {
            for (key, value) in fields {
                if key != PRIMARY_KEY {
                    document.insert(key, value);
                }
            }
        }
        UpdateOp::AddToSet { field, values } => {
            if array_field(document, &field)?.is_none() {
                document.insert(field.clone(), Bson::Array(Vec::new()));
            }
            if let Some(items) = array_field(document, &field)? {
                for value in values {
                    if !items.iter().any(|item| same_value(item, &value)) {
                        items.push(value);
                    }
                }
            }
        }
        UpdateOp::PullAll { field, values } => {
            if let Some(items) = array_field(document, &field)? {
                items.retain(|item| !values.iter().any(|value| same_value(item, value)));
            }
        }
    }

    Ok(())
}

/// Thread-safe in-memory table backend.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, so every clone shares
/// the same collections. Queries scan the whole collection; declared indexes are recorded but
/// not used for lookups.
///
/// # Example
///
/// ```ignore
/// use doctable_memory::InMemoryStore;
/// use doctable::{Schema, Table};
///
/// let store = InMemoryStore::new();
/// let users = Table::provision(store.clone(), Schema::new("users")).await?;
/// assert_eq!(store.list_collections().await, vec!["users".to_string()]);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Returns the names of every collection, sorted.
    pub async fn list_collections(&self) -> Vec<String> {
        let mut names = self.store
            .read()
            .await
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Returns the indexes declared on `collection`, in creation order.
    pub async fn indexes(&self, collection: &str) -> Vec<IndexSpec> {
        self.store
            .read()
            .await
            .get(collection)
            .map(|col| col.indexes.clone())
            .unwrap_or_default()
    }

    /// Returns the options `collection` was created with.
    pub async fn collection_options(&self, collection: &str) -> Option<Document> {
        self.store
            .read()
            .await
            .get(collection)
            .map(|col| col.options.clone())
    }
}

/// Native handle to one collection of an [`InMemoryStore`].
#[derive(Debug, Clone)]
pub struct InMemoryCollection {
    name: String,
    store: InMemoryStore,
}

impl InMemoryCollection {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of documents currently stored.
    pub async fn len(&self) -> usize {
        self.store
            .store
            .read()
            .await
            .get(&self.name)
            .map(|col| col.documents.len())
            .unwrap_or(0)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn indexes(&self) -> Vec<IndexSpec> {
        self.store.indexes(&self.name).await
    }

    /// Returns every document matching `filter` without sorting or pagination.
    pub async fn scan(&self, filter: Option<&Expr>) -> TableResult<Vec<Document>> {
        let store = self.store.store.read().await;

        Ok(match store.get(&self.name) {
            Some(col) => col
                .matching(filter)?
                .into_iter()
                .cloned()
                .collect(),
            None => Vec::new(),
        })
    }
}

#[async_trait]
impl TableBackend for InMemoryStore {
    type CollectionHandle = InMemoryCollection;

    fn collection_handle(&self, collection: &str) -> Self::CollectionHandle {
        InMemoryCollection { name: collection.to_string(), store: self.clone() }
    }

    async fn create_collection(&self, name: &str, options: &Document) -> TableResult<()> {
        let mut store = self.store.write().await;

        if store.contains_key(name) {
            return Err(TableError::CollectionAlreadyExists(name.to_string()));
        }

        debug!(collection = name, "creating in-memory collection");
        store.insert(
            name.to_string(),
            MemoryCollection { options: options.clone(), ..MemoryCollection::default() },
        );

        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> TableResult<()> {
        self.store
            .write()
            .await
            .remove(name);

        Ok(())
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> TableResult<()> {
        let mut store = self.store.write().await;
        let col = store
            .entry(collection.to_string())
            .or_default();

        if !col.indexes.contains(index) {
            col.indexes.push(index.clone());
        }

        Ok(())
    }

    async fn find(&self, collection: &str, query: Query) -> TableResult<RecordStream> {
        let store = self.store.read().await;
        let Some(col) = store.get(collection) else {
            return Ok(RecordStream::empty());
        };

        let mut documents = col.matching(query.filter.as_ref())?;

        if let Some(sort) = &query.sort {
            documents.sort_by(|a, b| {
                let ordering = compare_by(a, b, &sort.field);
                match sort.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }

        let records = documents
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|document| match &query.projection {
                Some(fields) => project(document, fields),
                None => document.clone(),
            })
            .map(|document| Ok(Record::from(document)))
            .collect::<Vec<_>>();

        Ok(RecordStream::new(stream::iter(records)))
    }

    async fn count_documents(&self, collection: &str, filter: Option<Expr>) -> TableResult<u64> {
        let store = self.store.read().await;

        Ok(match store.get(collection) {
            Some(col) => col.matching(filter.as_ref())?.len() as u64,
            None => 0,
        })
    }

    async fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: Option<Expr>,
    ) -> TableResult<Vec<Bson>> {
        let store = self.store.read().await;
        let Some(col) = store.get(collection) else {
            return Ok(Vec::new());
        };

        let mut values: Vec<Bson> = Vec::new();
        for document in col.matching(filter.as_ref())? {
            let candidates = match lookup(document, field) {
                Some(Bson::Array(items)) => items.clone(),
                Some(value) => vec![value.clone()],
                None => continue,
            };

            for value in candidates {
                if !values.contains(&value) {
                    values.push(value);
                }
            }
        }

        Ok(values)
    }

    async fn insert_one(&self, collection: &str, record: Record) -> TableResult<Record> {
        self.store
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(collection, record)
    }

    async fn insert_many(&self, collection: &str, records: Vec<Record>) -> TableResult<Vec<Record>> {
        let mut store = self.store.write().await;
        let col = store
            .entry(collection.to_string())
            .or_default();

        let mut inserted = Vec::with_capacity(records.len());
        for record in records {
            inserted.push(col.insert(collection, record)?);
        }

        Ok(inserted)
    }

    async fn replace_one(
        &self,
        collection: &str,
        id: &RecordId,
        record: Record,
        upsert: bool,
    ) -> TableResult<()> {
        let mut store = self.store.write().await;
        let col = store
            .entry(collection.to_string())
            .or_default();

        let key = key_of(id.as_bson());
        if upsert || col.documents.contains_key(&key) {
            col.documents.insert(key, record.with_primary_id(id).into_document());
        }

        Ok(())
    }

    async fn update_one(
        &self,
        collection: &str,
        id: &RecordId,
        update: UpdateOp,
        upsert: bool,
    ) -> TableResult<Option<Record>> {
        let mut store = self.store.write().await;
        let col = store
            .entry(collection.to_string())
            .or_default();

        let key = key_of(id.as_bson());
        let mut document = match col.documents.get(&key) {
            Some(existing) => existing.clone(),
            None if upsert => {
                let mut created = Document::new();
                created.insert(PRIMARY_KEY, id.as_bson().clone());
                created
            }
            None => return Ok(None),
        };

        apply_update(&mut document, update)?;
        col.documents.insert(key, document.clone());

        Ok(Some(Record::from(document)))
    }

    async fn delete_one(&self, collection: &str, id: &RecordId) -> TableResult<u64> {
        let mut store = self.store.write().await;

        Ok(match store.get_mut(collection) {
            Some(col) => col.documents.remove(&key_of(id.as_bson())).map_or(0, |_| 1),
            None => 0,
        })
    }

    async fn delete_many(&self, collection: &str, ids: Vec<RecordId>) -> TableResult<u64> {
        let mut store = self.store.write().await;
        let Some(col) = store.get_mut(collection) else {
            return Ok(0);
        };

        Ok(ids
            .iter()
            .filter(|id| col.documents.remove(&key_of(id.as_bson())).is_some())
            .count() as u64)
    }

    async fn bulk_upsert(
        &self,
        collection: &str,
        records: Vec<(RecordId, Record)>,
    ) -> TableResult<BulkWriteSummary> {
        let mut store = self.store.write().await;
        let col = store
            .entry(collection.to_string())
            .or_default();

        let mut summary = BulkWriteSummary::default();
        for (id, record) in records {
            let replacement = record.with_primary_id(&id).into_document();
            match col.documents.insert(key_of(id.as_bson()), replacement.clone()) {
                Some(previous) => {
                    summary.matched += 1;
                    if previous != replacement {
                        summary.modified += 1;
                    }
                }
                None => summary.upserted += 1,
            }
        }

        Ok(summary)
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl TableBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Always succeeds with a freshly initialized store.
    async fn build(self) -> TableResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use futures::TryStreamExt;
    use doctable_core::query::Filter;

    async fn collect(stream: RecordStream) -> Vec<Record> {
        stream.try_collect().await.unwrap()
    }

    #[tokio::test]
    async fn create_collection_twice_reports_existing() {
        let store = InMemoryStore::new();
        store.create_collection("users", &doc! { "capped": false }).await.unwrap();

        let err = store.create_collection("users", &Document::new()).await.unwrap_err();

        assert!(matches!(err, TableError::CollectionAlreadyExists(name) if name == "users"));
        assert_eq!(store.collection_options("users").await, Some(doc! { "capped": false }));
    }

    #[tokio::test]
    async fn insert_assigns_missing_identifier_and_rejects_duplicates() {
        let store = InMemoryStore::new();

        let generated = store.insert_one("t", Record::from(doc! { "n": 1 })).await.unwrap();
        assert!(matches!(generated.primary_id(), Some(Bson::String(_))));

        store.insert_one("t", Record::from(doc! { "_id": 1 })).await.unwrap();
        let err = store.insert_one("t", Record::from(doc! { "_id": 1i64 })).await.unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn insert_many_keeps_documents_before_a_failure() {
        let store = InMemoryStore::new();
        let records = vec![
            Record::from(doc! { "_id": "a" }),
            Record::from(doc! { "_id": "b" }),
            Record::from(doc! { "_id": "a" }),
            Record::from(doc! { "_id": "c" }),
        ];

        assert!(store.insert_many("t", records).await.unwrap_err().is_duplicate());
        assert_eq!(store.collection_handle("t").len().await, 2);
    }

    #[tokio::test]
    async fn find_sorts_paginates_and_projects() {
        let store = InMemoryStore::new();
        for n in 1..=5 {
            store.insert_one("t", Record::from(doc! { "_id": n, "n": n, "x": "y" })).await.unwrap();
        }

        let query = Query::builder()
            .filter(Filter::gte("n", 2))
            .sort("n", SortDirection::Desc)
            .offset(1)
            .limit(2)
            .project(["n"])
            .build();
        let records = collect(store.find("t", query).await.unwrap()).await;

        assert_eq!(
            records,
            vec![Record::from(doc! { "_id": 4, "n": 4 }), Record::from(doc! { "_id": 3, "n": 3 })]
        );
    }

    #[tokio::test]
    async fn update_applies_set_add_to_set_and_pull_all() {
        let store = InMemoryStore::new();
        let id = RecordId::from("a");
        store.insert_one("t", Record::from(doc! { "_id": "a", "tags": ["x"] })).await.unwrap();

        store.update_one("t", &id, UpdateOp::Set(doc! { "name": "A" }), false).await.unwrap();
        store
            .update_one(
                "t",
                &id,
                UpdateOp::AddToSet { field: "tags".into(), values: vec!["x".into(), "y".into()] },
                false,
            )
            .await
            .unwrap();
        let updated = store
            .update_one(
                "t",
                &id,
                UpdateOp::PullAll { field: "tags".into(), values: vec!["x".into()] },
                false,
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.into_document(), doc! { "_id": "a", "tags": ["y"], "name": "A" });
    }

    #[tokio::test]
    async fn update_without_upsert_leaves_missing_documents_alone() {
        let store = InMemoryStore::new();
        let id = RecordId::from("ghost");

        let result = store.update_one("t", &id, UpdateOp::Set(doc! { "a": 1 }), false).await.unwrap();
        assert!(result.is_none());

        let created = store.update_one("t", &id, UpdateOp::Set(doc! { "a": 1 }), true).await.unwrap();
        assert_eq!(created.unwrap().into_document(), doc! { "_id": "ghost", "a": 1 });
    }

    #[tokio::test]
    async fn array_updates_compare_numbers_across_widths() {
        let store = InMemoryStore::new();
        let id = RecordId::from("a");
        store.insert_one("t", Record::from(doc! { "_id": "a", "tags": [1i32] })).await.unwrap();

        let pushed = store
            .update_one(
                "t",
                &id,
                UpdateOp::AddToSet { field: "tags".into(), values: vec![Bson::Int64(1), Bson::Int64(2)] },
                false,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pushed.get("tags"), Some(&Bson::Array(vec![Bson::Int32(1), Bson::Int64(2)])));

        let pulled = store
            .update_one(
                "t",
                &id,
                UpdateOp::PullAll { field: "tags".into(), values: vec![Bson::Double(1.0)] },
                false,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pulled.get("tags"), Some(&Bson::Array(vec![Bson::Int64(2)])));
    }

    #[tokio::test]
    async fn add_to_set_on_scalar_field_is_rejected() {
        let store = InMemoryStore::new();
        store.insert_one("t", Record::from(doc! { "_id": "a", "tags": "x" })).await.unwrap();

        let err = store
            .update_one(
                "t",
                &RecordId::from("a"),
                UpdateOp::AddToSet { field: "tags".into(), values: vec!["y".into()] },
                false,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TableError::InvalidDocument(_)));
    }

    #[tokio::test]
    async fn bulk_upsert_counts_matches_and_creations() {
        let store = InMemoryStore::new();
        store.insert_one("t", Record::from(doc! { "_id": "a", "v": 1 })).await.unwrap();
        store.insert_one("t", Record::from(doc! { "_id": "b", "v": 1 })).await.unwrap();

        let summary = store
            .bulk_upsert(
                "t",
                vec![
                    ("a".into(), Record::from(doc! { "v": 2 })),
                    ("b".into(), Record::from(doc! { "v": 1 })),
                    ("c".into(), Record::from(doc! { "v": 1 })),
                ],
            )
            .await
            .unwrap();

        assert_eq!(summary, BulkWriteSummary { matched: 2, modified: 1, upserted: 1 });
    }

    #[tokio::test]
    async fn distinct_flattens_arrays() {
        let store = InMemoryStore::new();
        store.insert_one("t", Record::from(doc! { "_id": 1, "tags": ["a", "b"] })).await.unwrap();
        store.insert_one("t", Record::from(doc! { "_id": 2, "tags": "a" })).await.unwrap();

        let values = store.distinct("t", "tags", None).await.unwrap();

        assert_eq!(values, vec![Bson::from("a"), Bson::from("b")]);
    }

    #[tokio::test]
    async fn index_creation_is_idempotent() {
        let store = InMemoryStore::new();
        let index = IndexSpec::Ascending("email".into());

        store.create_index("t", &index).await.unwrap();
        store.create_index("t", &index).await.unwrap();

        assert_eq!(store.indexes("t").await, vec![index]);
    }
}
