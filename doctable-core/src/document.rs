//! Records and identifiers.
//!
//! A [`Record`] is an ordered mapping from field name to a tagged BSON value. Two fields are
//! reserved: [`PRIMARY_KEY`] (`_id`), the store's primary identifier, and [`EXTERNAL_KEY`]
//! (`id`), the caller-facing identifier that is copied into `_id` on creation.
//!
//! Identity-based operations never inspect those fields ad hoc. They call [`resolve_id`] once,
//! at the boundary, and work with the resulting [`RecordId`].
//!
//! # Example
//!
//! ```ignore
//! use doctable::document::{Record, RecordId, resolve_id};
//! use bson::doc;
//!
//! let record = Record::from(doc! { "id": "user-1", "name": "Alice" });
//! let id = resolve_id(None, &record)?;
//! assert_eq!(id, RecordId::from("user-1"));
//! ```

use bson::{Bson, Document, de::deserialize_from_document, oid::ObjectId, ser::serialize_to_document};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::fmt;

use crate::error::{TableError, TableResult};

/// The store's reserved primary-identifier field.
pub const PRIMARY_KEY: &str = "_id";

/// The caller-facing identifier field.
pub const EXTERNAL_KEY: &str = "id";

/// A validated document identifier.
///
/// Identifiers wrap a BSON value so that string, numeric, UUID and ObjectId keys are all
/// supported. [`RecordId::new`] rejects `null`, `undefined` and empty strings. The infallible
/// `From` conversions skip that check; table operations run [`RecordId::validate`] instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Bson);

impl RecordId {
    /// Creates a validated identifier from any BSON value.
    pub fn new(value: impl Into<Bson>) -> TableResult<Self> {
        let id = RecordId(value.into());
        id.validate()?;

        Ok(id)
    }

    /// Checks that this identifier is usable as a primary key.
    pub fn validate(&self) -> TableResult<()> {
        match &self.0 {
            Bson::Null | Bson::Undefined => Err(TableError::precondition("identifier is required")),
            Bson::String(s) if s.is_empty() => Err(TableError::precondition("identifier must not be empty")),
            _ => Ok(()),
        }
    }

    /// Returns the identifier as a BSON value.
    pub fn as_bson(&self) -> &Bson {
        &self.0
    }

    /// Consumes the identifier and returns the underlying BSON value.
    pub fn into_bson(self) -> Bson {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Bson::String(s) => f.write_str(s),
            other => write!(f, "{}", other),
        }
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        RecordId(Bson::String(value.to_string()))
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        RecordId(Bson::String(value))
    }
}

impl From<&String> for RecordId {
    fn from(value: &String) -> Self {
        RecordId(Bson::String(value.clone()))
    }
}

impl From<i32> for RecordId {
    fn from(value: i32) -> Self {
        RecordId(Bson::Int32(value))
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        RecordId(Bson::Int64(value))
    }
}

impl From<ObjectId> for RecordId {
    fn from(value: ObjectId) -> Self {
        RecordId(Bson::ObjectId(value))
    }
}

impl From<bson::Uuid> for RecordId {
    fn from(value: bson::Uuid) -> Self {
        RecordId(Bson::from(value))
    }
}

impl From<uuid::Uuid> for RecordId {
    fn from(value: uuid::Uuid) -> Self {
        RecordId(Bson::from(bson::Uuid::from(value)))
    }
}

impl From<RecordId> for Bson {
    fn from(value: RecordId) -> Self {
        value.0
    }
}

impl TryFrom<Bson> for RecordId {
    type Error = TableError;

    fn try_from(value: Bson) -> TableResult<Self> {
        RecordId::new(value)
    }
}

/// An open-ended document: field name to BSON value, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Document);

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self(Document::new())
    }

    /// Creates a record holding only `_id` and `id`, both set to `id`.
    pub fn identity(id: &RecordId) -> Self {
        let mut record = Record::new();
        record.insert(PRIMARY_KEY, id.as_bson().clone());
        record.insert(EXTERNAL_KEY, id.as_bson().clone());
        record
    }

    /// Serializes any serde type into a record.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::Serialization`] if the value does not serialize to a BSON document.
    pub fn from_serializable<T: Serialize>(value: &T) -> TableResult<Self> {
        Ok(Self(serialize_to_document(value)?))
    }

    /// Deserializes this record into a serde type.
    pub fn deserialize<T: DeserializeOwned>(self) -> TableResult<T> {
        Ok(deserialize_from_document(self.0)?)
    }

    /// Converts this record to a JSON value.
    pub fn to_json(&self) -> TableResult<Value> {
        Ok(serde_json::to_value(&self.0)?)
    }

    pub fn get(&self, field: &str) -> Option<&Bson> {
        self.0.get(field)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Bson> {
        self.0.get_mut(field)
    }

    /// Sets `field` to `value`, returning the previous value if there was one.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Bson>) -> Option<Bson> {
        self.0.insert(field, value)
    }

    pub fn remove(&mut self, field: &str) -> Option<Bson> {
        self.0.remove(field)
    }

    pub fn contains_key(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> bson::document::Iter<'_> {
        self.0.iter()
    }

    /// Returns the value of the primary-identifier field (`_id`), if present.
    pub fn primary_id(&self) -> Option<&Bson> {
        self.get(PRIMARY_KEY)
    }

    /// Returns the value of the external identifier field (`id`), if present.
    pub fn external_id(&self) -> Option<&Bson> {
        self.get(EXTERNAL_KEY)
    }

    /// Returns a copy of this record with `_id` set to `id` as its first field.
    pub fn with_primary_id(&self, id: &RecordId) -> Record {
        let mut merged = Document::new();
        merged.insert(PRIMARY_KEY, id.as_bson().clone());
        for (key, value) in self.0.iter() {
            if key != PRIMARY_KEY {
                merged.insert(key.clone(), value.clone());
            }
        }

        Record(merged)
    }

    /// Copies the `id` field into `_id` when `_id` is missing.
    pub fn promote_external_id(&mut self) {
        if self.primary_id().is_some() {
            return;
        }

        if let Some(id) = self.external_id().cloned() {
            *self = self.with_primary_id(&RecordId(id));
        }
    }

    pub fn as_document(&self) -> &Document {
        &self.0
    }

    pub fn into_document(self) -> Document {
        self.0
    }
}

impl From<Document> for Record {
    fn from(document: Document) -> Self {
        Record(document)
    }
}

impl From<Record> for Document {
    fn from(record: Record) -> Self {
        record.0
    }
}

impl From<Record> for Bson {
    fn from(record: Record) -> Self {
        Bson::Document(record.0)
    }
}

impl FromIterator<(String, Bson)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Bson)>>(iter: I) -> Self {
        Record(Document::from_iter(iter))
    }
}

/// Resolves the identifier of an identity-based operation.
///
/// The explicit argument wins; otherwise the record's `id` field is used, then its `_id`
/// field. A missing or empty identifier is a [`TableError::Precondition`].
pub fn resolve_id(explicit: Option<RecordId>, record: &Record) -> TableResult<RecordId> {
    let id = match explicit {
        Some(id) => id,
        None => record
            .external_id()
            .or_else(|| record.primary_id())
            .cloned()
            .map(RecordId)
            .ok_or_else(|| TableError::precondition("record has no `id` field and no identifier was given"))?,
    };
    id.validate()?;

    Ok(id)
}
