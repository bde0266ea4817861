use async_trait::async_trait;
use bson::{Bson, Document, doc};
use mongodb::{
    Client, Collection as MongoCollection, IndexModel,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{ClientOptions, FindOptions, IndexOptions, ReplaceOneModel, ReturnDocument},
};
use tracing::{debug, instrument};

use doctable_core::{
    backend::{BulkWriteSummary, TableBackend, TableBackendBuilder},
    document::{PRIMARY_KEY, Record, RecordId},
    error::{TableError, TableResult},
    query::{Expr, Query, SortDirection, UpdateOp},
    schema::IndexSpec,
    stream::RecordStream,
};

use crate::query::MongoQueryTranslator;

/// Server error code for `NamespaceExists`.
const NAMESPACE_EXISTS: i32 = 48;
/// Server error code for a unique-index violation.
const DUPLICATE_KEY: i32 = 11000;

/// Maps a driver error to the table error taxonomy.
pub(crate) fn map_error(collection: &str, err: MongoError) -> TableError {
    let duplicate = |message: &str| TableError::DocumentAlreadyExists(message.to_string(), collection.to_string());

    match err.kind.as_ref() {
        ErrorKind::Command(command) if command.code == NAMESPACE_EXISTS => {
            TableError::CollectionAlreadyExists(collection.to_string())
        }
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY => {
            duplicate(&write.message)
        }
        ErrorKind::InsertMany(failure) => match failure
            .write_errors
            .as_ref()
            .and_then(|errors| errors.first())
        {
            Some(write) if write.code == DUPLICATE_KEY => duplicate(&write.message),
            _ => TableError::Backend(err.to_string()),
        },
        _ => TableError::Backend(err.to_string()),
    }
}

fn id_filter(id: &RecordId) -> Document {
    doc! { PRIMARY_KEY: id.as_bson().clone() }
}

fn index_model(index: &IndexSpec) -> IndexModel {
    match index {
        IndexSpec::Ascending(field) => IndexModel::builder()
            .keys(doc! { field.as_str(): 1 })
            .build(),
        IndexSpec::Compound(fields) => IndexModel::builder()
            .keys(Document::from_iter(
                fields
                    .iter()
                    .map(|field| (field.clone(), Bson::Int32(1))),
            ))
            .build(),
        IndexSpec::Text(field) => IndexModel::builder()
            .keys(doc! { field.as_str(): "text" })
            .build(),
        IndexSpec::Ttl { field, expire_after } => IndexModel::builder()
            .keys(doc! { field.as_str(): 1 })
            .options(
                IndexOptions::builder()
                .expire_after(*expire_after)
                .build()
            )
            .build(),
    }
}

fn find_options(query: &Query) -> FindOptions {
    let mut options = FindOptions::default();

    if let Some(limit) = query.limit {
        options.limit = Some(limit as i64);
    }
    if let Some(skip) = query.offset {
        options.skip = Some(skip as u64);
    }
    if let Some(sort) = &query.sort {
        options.sort = Some(doc! {
            sort.field.clone(): match sort.direction {
                SortDirection::Asc => 1,
                SortDirection::Desc => -1,
            }
        })
    }
    if let Some(fields) = &query.projection {
        options.projection = Some(Document::from_iter(
            fields
                .iter()
                .map(|field| (field.clone(), Bson::Int32(1))),
        ));
    }

    options
}

fn update_document(update: UpdateOp) -> Document {
    match update {
        UpdateOp::Set(mut fields) => {
            fields.remove(PRIMARY_KEY);
            doc! { "$set": fields }
        }
        UpdateOp::AddToSet { field, values } => doc! { "$addToSet": { field: { "$each": values } } },
        UpdateOp::PullAll { field, values } => doc! { "$pullAll": { field: values } },
    }
}

/// MongoDB table backend.
///
/// Clones share one driver [`Client`] and its connection pool.
#[derive(Debug, Clone)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: impl Into<String>) -> Self {
        Self { client, database: database.into() }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    /// Returns the underlying driver client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Returns the driver handle to the configured database.
    pub fn database(&self) -> mongodb::Database {
        self.client.database(&self.database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.database()
            .collection(collection_name)
    }
}

#[async_trait]
impl TableBackend for MongoDbStore {
    type CollectionHandle = MongoCollection<Document>;

    fn collection_handle(&self, collection: &str) -> Self::CollectionHandle {
        self.get_collection(collection)
    }

    #[instrument(skip(self, options))]
    async fn create_collection(&self, name: &str, options: &Document) -> TableResult<()> {
        let mut command = doc! { "create": name };
        command.extend(options.clone());

        self.database()
            .run_command(command)
            .await
            .map_err(|e| map_error(name, e))?;

        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> TableResult<()> {
        self.get_collection(name)
            .drop()
            .await
            .map_err(|e| map_error(name, e))?;

        Ok(())
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> TableResult<()> {
        let model = index_model(index);
        debug!(collection, keys = ?model.keys, "creating index");

        self.get_collection(collection)
            .create_index(model)
            .await
            .map_err(|e| map_error(collection, e))?;

        Ok(())
    }

    async fn find(&self, collection: &str, query: Query) -> TableResult<RecordStream> {
        let cursor = self.get_collection(collection)
            .find(MongoQueryTranslator::translate(query.filter.as_ref())?)
            .with_options(find_options(&query))
            .await
            .map_err(|e| map_error(collection, e))?;

        Ok(RecordStream::from_cursor(cursor))
    }

    async fn count_documents(&self, collection: &str, filter: Option<Expr>) -> TableResult<u64> {
        self.get_collection(collection)
            .count_documents(MongoQueryTranslator::translate(filter.as_ref())?)
            .await
            .map_err(|e| map_error(collection, e))
    }

    async fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: Option<Expr>,
    ) -> TableResult<Vec<Bson>> {
        self.get_collection(collection)
            .distinct(field, MongoQueryTranslator::translate(filter.as_ref())?)
            .await
            .map_err(|e| map_error(collection, e))
    }

    async fn insert_one(&self, collection: &str, record: Record) -> TableResult<Record> {
        let result = self.get_collection(collection)
            .insert_one(record.as_document())
            .await
            .map_err(|e| map_error(collection, e))?;

        Ok(record.with_primary_id(&RecordId::new(result.inserted_id)?))
    }

    async fn insert_many(&self, collection: &str, records: Vec<Record>) -> TableResult<Vec<Record>> {
        let result = self.get_collection(collection)
            .insert_many(records.iter().map(Record::as_document))
            .ordered(true)
            .await
            .map_err(|e| map_error(collection, e))?;

        records
            .into_iter()
            .enumerate()
            .map(|(i, record)| match result.inserted_ids.get(&i) {
                Some(id) => Ok(record.with_primary_id(&RecordId::new(id.clone())?)),
                None => Ok(record),
            })
            .collect()
    }

    async fn replace_one(
        &self,
        collection: &str,
        id: &RecordId,
        record: Record,
        upsert: bool,
    ) -> TableResult<()> {
        self.get_collection(collection)
            .replace_one(id_filter(id), record.with_primary_id(id).into_document())
            .upsert(upsert)
            .await
            .map_err(|e| map_error(collection, e))?;

        Ok(())
    }

    async fn update_one(
        &self,
        collection: &str,
        id: &RecordId,
        update: UpdateOp,
        upsert: bool,
    ) -> TableResult<Option<Record>> {
        Ok(self.get_collection(collection)
            .find_one_and_update(id_filter(id), update_document(update))
            .upsert(upsert)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| map_error(collection, e))?
            .map(Record::from))
    }

    async fn delete_one(&self, collection: &str, id: &RecordId) -> TableResult<u64> {
        Ok(self.get_collection(collection)
            .delete_one(id_filter(id))
            .await
            .map_err(|e| map_error(collection, e))?
            .deleted_count)
    }

    async fn delete_many(&self, collection: &str, ids: Vec<RecordId>) -> TableResult<u64> {
        let ids = ids
            .into_iter()
            .map(RecordId::into_bson)
            .collect::<Vec<_>>();

        Ok(self.get_collection(collection)
            .delete_many(doc! { PRIMARY_KEY: { "$in": ids } })
            .await
            .map_err(|e| map_error(collection, e))?
            .deleted_count)
    }

    async fn bulk_upsert(
        &self,
        collection: &str,
        records: Vec<(RecordId, Record)>,
    ) -> TableResult<BulkWriteSummary> {
        let namespace = self.get_collection(collection).namespace();
        let models = records
            .into_iter()
            .map(|(id, record)| {
                ReplaceOneModel::builder()
                    .namespace(namespace.clone())
                    .filter(id_filter(&id))
                    .replacement(record.with_primary_id(&id).into_document())
                    .upsert(true)
                    .build()
            })
            .collect::<Vec<_>>();

        let result = self.client
            .bulk_write(models)
            .ordered(true)
            .await
            .map_err(|e| map_error(collection, e))?;

        Ok(BulkWriteSummary {
            matched: result.matched_count as u64,
            modified: result.modified_count as u64,
            upserted: result.upserted_count as u64,
        })
    }

    async fn shutdown(self) -> TableResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl TableBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> TableResult<Self::Backend> {
        Ok(MongoDbStore::new(
            Client::with_options(
                ClientOptions::parse(&self.dsn)
                    .await
                    .map_err(|e| TableError::Initialization(e.to_string()))?,
            )
            .map_err(|e| TableError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn index_specs_map_to_key_documents() {
        assert_eq!(index_model(&IndexSpec::Ascending("email".into())).keys, doc! { "email": 1 });
        assert_eq!(
            index_model(&IndexSpec::Compound(vec!["user".into(), "created".into()])).keys,
            doc! { "user": 1, "created": 1 }
        );
        assert_eq!(index_model(&IndexSpec::Text("body".into())).keys, doc! { "body": "text" });

        let ttl = index_model(&IndexSpec::Ttl { field: "expires".into(), expire_after: Duration::from_secs(60) });
        assert_eq!(ttl.keys, doc! { "expires": 1 });
        assert_eq!(ttl.options.and_then(|o| o.expire_after), Some(Duration::from_secs(60)));
    }

    fn command_error(code: i32) -> MongoError {
        let command = bson::deserialize_from_document(doc! {
            "code": code,
            "codeName": "Test",
            "errmsg": "server said no",
        })
        .unwrap();

        MongoError::from(ErrorKind::Command(command))
    }

    #[test]
    fn namespace_exists_maps_to_collection_already_exists() {
        let err = map_error("users", command_error(NAMESPACE_EXISTS));

        assert!(matches!(err, TableError::CollectionAlreadyExists(name) if name == "users"));
    }

    #[test]
    fn duplicate_key_maps_to_document_already_exists() {
        let write = bson::deserialize_from_document(doc! {
            "code": DUPLICATE_KEY,
            "errmsg": "E11000 duplicate key error",
        })
        .unwrap();

        let err = map_error("users", MongoError::from(ErrorKind::Write(WriteFailure::WriteError(write))));

        assert!(err.is_duplicate());
        assert!(matches!(err, TableError::DocumentAlreadyExists(_, collection) if collection == "users"));
    }

    #[test]
    fn other_server_errors_map_to_backend() {
        let err = map_error("users", command_error(13));

        assert!(matches!(err, TableError::Backend(message) if message.contains("server said no")));
    }

    #[test]
    fn set_updates_never_touch_the_primary_key() {
        assert_eq!(
            update_document(UpdateOp::Set(doc! { "_id": "x", "name": "A" })),
            doc! { "$set": { "name": "A" } }
        );
    }

    #[test]
    fn array_updates_use_each_and_pull_all() {
        assert_eq!(
            update_document(UpdateOp::AddToSet { field: "tags".into(), values: vec!["a".into(), "b".into()] }),
            doc! { "$addToSet": { "tags": { "$each": ["a", "b"] } } }
        );
        assert_eq!(
            update_document(UpdateOp::PullAll { field: "tags".into(), values: vec!["a".into()] }),
            doc! { "$pullAll": { "tags": ["a"] } }
        );
    }

    #[test]
    fn find_options_carry_pagination_sort_and_projection() {
        let query = Query::builder()
            .sort("created", SortDirection::Desc)
            .offset(10)
            .limit(5)
            .project(["name"])
            .build();
        let options = find_options(&query);

        assert_eq!(options.limit, Some(5));
        assert_eq!(options.skip, Some(10));
        assert_eq!(options.sort, Some(doc! { "created": -1 }));
        assert_eq!(options.projection, Some(doc! { "name": 1 }));
    }
}
