//! Storage backend abstraction for tables.
//!
//! [`TableBackend`] is the contract a document store must satisfy for a
//! [`Table`](crate::table::Table) to run on top of it: collection and index creation,
//! single-document and bulk writes, cursor-based queries, counting and distinct values.
//! Implementations are thread-safe (`Send + Sync`) and cheap to clone; clones share one
//! underlying connection, so several tables can be bound to the same backend.
//!
//! [`TableBackendBuilder`] is the connection-provider seam: it turns connection parameters
//! into a ready backend.
//!
//! # Error contract
//!
//! - `create_collection` reports an existing collection as
//!   [`TableError::CollectionAlreadyExists`](crate::error::TableError::CollectionAlreadyExists).
//! - Inserts report a duplicate identifier as
//!   [`TableError::DocumentAlreadyExists`](crate::error::TableError::DocumentAlreadyExists).
//! - Every other store failure is reported as-is, without retries.

use async_trait::async_trait;
use bson::{Bson, Document};
use std::fmt::Debug;

use crate::{
    document::{Record, RecordId},
    error::TableResult,
    query::{Expr, Query, UpdateOp},
    schema::IndexSpec,
    stream::RecordStream,
};

/// Counts reported by a bulk upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkWriteSummary {
    /// Documents whose identifier matched an existing document.
    pub matched: u64,
    /// Matched documents that were actually changed.
    pub modified: u64,
    /// Documents created because no match existed.
    pub upserted: u64,
}

#[async_trait]
pub trait TableBackend: Clone + Send + Sync + Debug {
    /// The store's native collection handle, exposed as a table's raw query handle.
    type CollectionHandle: Send + Sync;

    /// Returns the native handle for `collection`.
    fn collection_handle(&self, collection: &str) -> Self::CollectionHandle;

    /// Creates a collection, forwarding `options` to the store unchanged.
    ///
    /// Fails with `CollectionAlreadyExists` if the collection is already present.
    async fn create_collection(&self, name: &str, options: &Document) -> TableResult<()>;

    /// Drops a collection and all its documents. Dropping a missing collection succeeds.
    async fn drop_collection(&self, name: &str) -> TableResult<()>;

    /// Creates an index. Creating an index identical to an existing one succeeds.
    async fn create_index(&self, collection: &str, index: &IndexSpec) -> TableResult<()>;

    /// Runs a query and returns its cursor as a lazy stream.
    async fn find(&self, collection: &str, query: Query) -> TableResult<RecordStream>;

    /// Counts the documents matching `filter` (all documents when `None`).
    async fn count_documents(&self, collection: &str, filter: Option<Expr>) -> TableResult<u64>;

    /// Returns the distinct values of `field` across documents matching `filter`.
    async fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: Option<Expr>,
    ) -> TableResult<Vec<Bson>>;

    /// Inserts one document. A document without `_id` gets a store-assigned identifier,
    /// which is present in the returned record.
    async fn insert_one(&self, collection: &str, record: Record) -> TableResult<Record>;

    /// Inserts documents in order, stopping at the first failure. Documents inserted before
    /// the failure remain.
    async fn insert_many(&self, collection: &str, records: Vec<Record>) -> TableResult<Vec<Record>>;

    /// Replaces the whole document identified by `id`, creating it when `upsert` is set.
    async fn replace_one(
        &self,
        collection: &str,
        id: &RecordId,
        record: Record,
        upsert: bool,
    ) -> TableResult<()>;

    /// Applies `update` to the document identified by `id` and returns it as it is after the
    /// update. Returns `None` when no document matched and `upsert` did not create one.
    async fn update_one(
        &self,
        collection: &str,
        id: &RecordId,
        update: UpdateOp,
        upsert: bool,
    ) -> TableResult<Option<Record>>;

    /// Deletes the document identified by `id`, returning the number deleted (0 or 1).
    async fn delete_one(&self, collection: &str, id: &RecordId) -> TableResult<u64>;

    /// Deletes every document whose identifier is in `ids`, returning the number deleted.
    async fn delete_many(&self, collection: &str, ids: Vec<RecordId>) -> TableResult<u64>;

    /// Submits one replace-with-upsert per `(id, record)` pair as a single ordered bulk write.
    ///
    /// The batch is not atomic. A failure aborts the remaining operations and is returned.
    async fn bulk_upsert(
        &self,
        collection: &str,
        records: Vec<(RecordId, Record)>,
    ) -> TableResult<BulkWriteSummary>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// Shutting down affects every clone of the backend and every table bound to it.
    async fn shutdown(self) -> TableResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
pub trait TableBackendBuilder {
    type Backend: TableBackend;

    async fn build(self) -> TableResult<Self::Backend>;
}
