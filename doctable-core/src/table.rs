//! The table: a provisioned collection and its operation surface.
//!
//! A [`Table`] is created by [`Table::provision`], which runs the schema provisioner once
//! against a backend and returns a handle bound to the provisioned collection. All
//! operations are asynchronous and safe to call concurrently; single-document atomicity is
//! provided by the store, not by this layer.
//!
//! # Example
//!
//! ```ignore
//! use doctable::prelude::*;
//! use doctable::memory::InMemoryStore;
//! use bson::doc;
//!
//! let schema = Schema::builder("users").index("email").build();
//! let users = Table::provision(InMemoryStore::new(), schema).await?;
//!
//! users.upsert(Record::from(doc! { "id": "u1", "email": "a@example.com" })).await?;
//! assert!(users.has("u1").await?);
//! ```

use bson::{Bson, Document};
use futures::{Stream, TryStreamExt};
use serde::de::DeserializeOwned;
use std::error::Error as StdError;
use tracing::debug;

use crate::{
    backend::{BulkWriteSummary, TableBackend},
    document::{PRIMARY_KEY, Record, RecordId, resolve_id},
    error::{TableError, TableResult},
    provision::provision,
    query::{Expr, Filter, FindOptions, Query, RangeQuery, SearchOptions, UpdateOp},
    schema::Schema,
    stream::RecordStream,
};

/// Options for [`Table::set`]. Upserts by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetOptions {
    pub upsert: bool,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self { upsert: true }
    }
}

/// Options for [`Table::update`]. Upserts by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOptions {
    pub upsert: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self { upsert: true }
    }
}

#[derive(Debug, Clone)]
pub struct Table<B: TableBackend> {
    schema: Schema,
    backend: B,
}

impl<B: TableBackend> Table<B> {
    /// Provisions `schema` on `backend` and returns the table bound to it.
    ///
    /// # Errors
    ///
    /// Precondition failures in the schema are returned before any store call. An existing
    /// collection is not an error; any other provisioning failure is returned as-is.
    pub async fn provision(backend: B, schema: Schema) -> TableResult<Self> {
        provision(&backend, &schema).await?;

        Ok(Self { schema, backend })
    }

    /// Returns the name of the backing collection.
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the backend (database) handle this table is bound to.
    pub fn db(&self) -> &B {
        &self.backend
    }

    /// Returns the store's native handle to the backing collection, for custom queries.
    pub fn query(&self) -> B::CollectionHandle {
        self.backend.collection_handle(self.name())
    }

    /// Shuts the backend down. Every table sharing the backend is closed with it.
    pub async fn close(self) -> TableResult<()> {
        self.backend.shutdown().await
    }

    /// Drops the backing collection and all of its documents.
    pub async fn drop(&self) -> TableResult<()> {
        self.backend.drop_collection(self.name()).await
    }

    /// Returns the document with identifier `id`, if any.
    pub async fn get(&self, id: impl Into<RecordId>) -> TableResult<Option<Record>> {
        let id = checked(id)?;

        self.first(Query {
            filter: Some(Filter::id(&id)),
            limit: Some(1),
            ..Query::default()
        })
        .await
    }

    /// Returns the document with identifier `id` deserialized into `T`, if any.
    pub async fn get_as<T: DeserializeOwned>(&self, id: impl Into<RecordId>) -> TableResult<Option<T>> {
        self.get(id)
            .await?
            .map(Record::deserialize::<T>)
            .transpose()
    }

    /// Returns `true` if a document with identifier `id` exists. Only `_id` is fetched.
    pub async fn has(&self, id: impl Into<RecordId>) -> TableResult<bool> {
        let id = checked(id)?;

        Ok(self
            .first(Query {
                filter: Some(Filter::id(&id)),
                limit: Some(1),
                projection: Some(vec![PRIMARY_KEY.to_string()]),
                ..Query::default()
            })
            .await?
            .is_some())
    }

    /// Replaces the whole document identified by `id`, or by the record's `id` field when
    /// `id` is `None`. Returns `{ _id: id, ..record }`.
    pub async fn set(
        &self,
        id: Option<RecordId>,
        record: Record,
        options: SetOptions,
    ) -> TableResult<Record> {
        let id = resolve_id(id, &record)?;
        let merged = record.with_primary_id(&id);

        self.backend
            .replace_one(self.name(), &id, merged.clone(), options.upsert)
            .await?;

        Ok(merged)
    }

    /// Replace-or-create keyed by the record's own identifier.
    pub async fn upsert(&self, record: Record) -> TableResult<Record> {
        self.set(None, record, SetOptions::default())
            .await
    }

    /// Merges the fields of `partial` into the document identified by `id`.
    ///
    /// Returns the document after the update. With `upsert` (the default) a missing document
    /// is created from `{ _id: id, ..partial }`. Without it, a missing document yields
    /// `Ok(None)`.
    pub async fn update(
        &self,
        id: impl Into<RecordId>,
        partial: Record,
        options: UpdateOptions,
    ) -> TableResult<Option<Record>> {
        let id = checked(id)?;

        let mut fields: Document = partial.into();
        fields.remove(PRIMARY_KEY);
        if fields.is_empty() {
            return Err(TableError::precondition("update requires at least one field"));
        }

        self.backend
            .update_one(self.name(), &id, UpdateOp::Set(fields), options.upsert)
            .await
    }

    /// Inserts `record` as-is. Fails with `DocumentAlreadyExists` on a duplicate identifier.
    pub async fn insert(&self, record: Record) -> TableResult<Record> {
        self.backend
            .insert_one(self.name(), record)
            .await
    }

    /// Copies the record's `id` field into `_id`, then inserts it.
    pub async fn create(&self, record: Record) -> TableResult<Record> {
        let record = match record.external_id().cloned() {
            Some(id) => {
                let id = RecordId::new(id)?;
                record.with_primary_id(&id)
            }
            None => record,
        };

        self.insert(record).await
    }

    /// Deletes the document identified by `id`.
    ///
    /// Always returns `{ _id: id, id: id }`, whether or not a document existed.
    pub async fn delete(&self, id: impl Into<RecordId>) -> TableResult<Record> {
        let id = checked(id)?;

        self.backend
            .delete_one(self.name(), &id)
            .await?;

        Ok(Record::identity(&id))
    }

    /// Deletes every document whose identifier is in `ids`. Returns the number deleted.
    pub async fn delete_all<I, T>(&self, ids: I) -> TableResult<u64>
    where
        I: IntoIterator<Item = T>,
        T: Into<RecordId>,
    {
        let ids = checked_all(ids)?;
        if ids.is_empty() {
            return Ok(0);
        }

        debug!(collection = self.name(), count = ids.len(), "bulk delete");
        self.backend
            .delete_many(self.name(), ids)
            .await
    }

    /// Inserts `records` in one ordered bulk insert.
    ///
    /// Records without `_id` but with an `id` field get `_id` copied from `id`. The batch is
    /// not atomic: on a duplicate identifier the store stops, the documents before it stay
    /// inserted, and the error is returned.
    pub async fn insert_many(&self, records: Vec<Record>) -> TableResult<Vec<Record>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let records = records
            .into_iter()
            .map(|mut record| {
                record.promote_external_id();
                record
            })
            .collect::<Vec<_>>();

        debug!(collection = self.name(), count = records.len(), "bulk insert");
        self.backend
            .insert_many(self.name(), records)
            .await
    }

    /// Replaces-or-creates every record, keyed by its own identifier, in one bulk write.
    ///
    /// Identifiers are resolved for the whole batch before anything is sent. The write is
    /// ordered and not atomic; a failure is returned as reported by the store.
    pub async fn upsert_many(&self, records: Vec<Record>) -> TableResult<BulkWriteSummary> {
        let operations = records
            .into_iter()
            .map(|record| {
                let id = resolve_id(None, &record)?;
                let replacement = record.with_primary_id(&id);
                Ok((id, replacement))
            })
            .collect::<TableResult<Vec<_>>>()?;

        if operations.is_empty() {
            return Ok(BulkWriteSummary::default());
        }

        debug!(collection = self.name(), count = operations.len(), "bulk upsert");
        self.backend
            .bulk_upsert(self.name(), operations)
            .await
    }

    /// Returns every document whose `field` equals `value`.
    pub async fn get_by(
        &self,
        field: &str,
        value: impl Into<Bson>,
        options: Option<FindOptions>,
    ) -> TableResult<Vec<Record>> {
        required("field", field)?;

        self.find(
            Query::filtered(Some(Filter::eq(field, value)))
                .with_options(options.unwrap_or_default()),
        )
        .await
    }

    /// Returns every document whose identifier is in `ids`, in no particular order.
    pub async fn get_all<I, T>(&self, ids: I) -> TableResult<Vec<Record>>
    where
        I: IntoIterator<Item = T>,
        T: Into<RecordId>,
    {
        let ids = checked_all(ids)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        self.find(Query::filtered(Some(Filter::ids(&ids))))
            .await
    }

    /// Returns every document in the table.
    pub async fn list(&self) -> TableResult<Vec<Record>> {
        self.find(Query::new()).await
    }

    /// Runs a structured query and collects the results.
    pub async fn find(&self, query: Query) -> TableResult<Vec<Record>> {
        self.backend
            .find(self.name(), query)
            .await?
            .try_collect()
            .await
    }

    /// Counts the documents matching `filter`, or all documents when `None`.
    pub async fn count(&self, filter: Option<Expr>) -> TableResult<u64> {
        self.backend
            .count_documents(self.name(), filter)
            .await
    }

    /// Returns the distinct values of `field` across the table.
    pub async fn distinct(&self, field: &str) -> TableResult<Vec<Bson>> {
        required("field", field)?;

        self.backend
            .distinct(self.name(), field, None)
            .await
    }

    /// Case-insensitive substring search of `term` in `field`, paginated by `options`.
    pub async fn search(
        &self,
        field: &str,
        term: &str,
        options: SearchOptions,
    ) -> TableResult<Vec<Record>> {
        required("field", field)?;
        if options.limit == 0 {
            return Err(TableError::precondition("limit must be >= 1"));
        }

        self.find(Query {
            filter: Some(Filter::contains(field, term)),
            offset: Some(options.skip),
            limit: Some(options.limit),
            ..Query::default()
        })
        .await
    }

    /// Same operation as [`Table::search`]; no edit-distance matching is performed.
    pub async fn search_fuzzy(
        &self,
        field: &str,
        term: &str,
        options: SearchOptions,
    ) -> TableResult<Vec<Record>> {
        self.search(field, term, options)
            .await
    }

    /// Documents matching the range query's filter whose sort key lies in `[min, max]`,
    /// newest first. Out-of-range arguments fail before any query is issued.
    pub async fn get_by_sorted_between(&self, range: RangeQuery) -> TableResult<Vec<Record>> {
        self.find(range.into_query()?)
            .await
    }

    /// Adds each of `items` to the array field `key`, skipping values already present.
    ///
    /// Returns the updated document, or `None` if no document has identifier `id`.
    pub async fn push<I, V>(&self, id: impl Into<RecordId>, key: &str, items: I) -> TableResult<Option<Record>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        let id = checked(id)?;
        required("key", key)?;

        self.backend
            .update_one(
                self.name(),
                &id,
                UpdateOp::AddToSet {
                    field: key.to_string(),
                    values: items.into_iter().map(Into::into).collect(),
                },
                false,
            )
            .await
    }

    /// Removes every element of the array field `key` that is one of `items`.
    ///
    /// Returns the updated document, or `None` if no document has identifier `id`.
    pub async fn pull<I, V>(&self, id: impl Into<RecordId>, key: &str, items: I) -> TableResult<Option<Record>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        let id = checked(id)?;
        required("key", key)?;

        self.backend
            .update_one(
                self.name(),
                &id,
                UpdateOp::PullAll {
                    field: key.to_string(),
                    values: items.into_iter().map(Into::into).collect(),
                },
                false,
            )
            .await
    }

    /// Streams the documents matching `filter` (all documents when `None`).
    ///
    /// The stream is lazy and single-pass; issue a new call to restart.
    pub async fn read_stream(&self, filter: Option<Expr>) -> TableResult<RecordStream> {
        self.backend
            .find(self.name(), Query::filtered(filter))
            .await
    }

    /// Wraps a cursor obtained elsewhere, e.g. from a custom query on [`Table::query`].
    pub fn streamify<S, T, E>(&self, cursor: S) -> RecordStream
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
        T: Into<Record>,
        E: StdError + Send + Sync + 'static,
    {
        RecordStream::from_cursor(cursor)
    }

    async fn first(&self, query: Query) -> TableResult<Option<Record>> {
        self.backend
            .find(self.name(), query)
            .await?
            .try_next()
            .await
    }
}

fn checked(id: impl Into<RecordId>) -> TableResult<RecordId> {
    let id = id.into();
    id.validate()?;

    Ok(id)
}

fn checked_all<I, T>(ids: I) -> TableResult<Vec<RecordId>>
where
    I: IntoIterator<Item = T>,
    T: Into<RecordId>,
{
    ids.into_iter()
        .map(checked)
        .collect()
}

fn required(name: &str, value: &str) -> TableResult<()> {
    if value.is_empty() {
        return Err(TableError::precondition(format!("`{}` must not be empty", name)));
    }

    Ok(())
}
