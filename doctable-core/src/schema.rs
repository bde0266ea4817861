//! Declarative table schemas.
//!
//! A [`Schema`] names a collection, lists the indexes to provision and carries a bag of
//! store-specific collection options that are forwarded verbatim. Schemas are usually loaded
//! from JSON:
//!
//! ```ignore
//! use doctable::schema::Schema;
//!
//! let schema = Schema::from_json(r#"{
//!     "name": "events",
//!     "indices": ["user"],
//!     "compound": [["user", "created"]],
//!     "text": ["body"],
//!     "ttl": [["created", { "expireAfterSeconds": 86400 }]],
//!     "capped": true,
//!     "size": 1048576
//! }"#)?;
//! ```
//!
//! or built in code with [`Schema::builder`].

use bson::{Bson, Document};
use serde::{Deserialize, Deserializer, Serialize, de::Error as _};
use std::time::Duration;

use crate::error::{TableError, TableResult};

/// Declarative description of a table: collection name, indexes and passthrough options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Name of the backing collection.
    pub name: String,
    /// Fields that each receive an ascending single-field index.
    #[serde(default)]
    pub indices: Vec<String>,
    /// Ordered field lists that each receive one compound ascending index.
    #[serde(default)]
    pub compound: Vec<Vec<String>>,
    /// Fields that each receive a text index.
    #[serde(default)]
    pub text: Vec<String>,
    /// Time-to-live indexes, as `[field, { expireAfterSeconds }]` pairs.
    #[serde(default)]
    pub ttl: Vec<TtlIndex>,
    /// Collection options forwarded to the store unchanged.
    #[serde(flatten)]
    pub options: Document,
}

/// One time-to-live entry: the timestamp field and its options. The options object may be
/// left out, which [`Schema::index_plan`] then rejects for lacking an expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtlIndex(pub String, #[serde(default)] pub TtlOptions);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtlOptions {
    #[serde(
        default,
        deserialize_with = "whole_seconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub expire_after_seconds: Option<u64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Seconds {
    Integer(u64),
    Float(f64),
}

/// Accepts integral seconds written either as integers or as floats such as `3600.0`.
fn whole_seconds<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Seconds>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Seconds::Integer(seconds)) => Ok(Some(seconds)),
        Some(Seconds::Float(seconds))
            if seconds.is_finite() && seconds >= 0.0 && seconds.fract() == 0.0 && seconds <= u64::MAX as f64 =>
        {
            Ok(Some(seconds as u64))
        }
        Some(Seconds::Float(seconds)) => Err(D::Error::custom(format!(
            "expireAfterSeconds must be a non-negative whole number, got {}",
            seconds
        ))),
    }
}

/// A single index to create, in the shape the backends understand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSpec {
    /// Ascending index over one field.
    Ascending(String),
    /// Ascending index over several fields, in order.
    Compound(Vec<String>),
    /// Text index over one field.
    Text(String),
    /// Expires documents `expire_after` past the timestamp held in `field`.
    Ttl { field: String, expire_after: Duration },
}

impl IndexSpec {
    /// Returns the indexed fields in key order.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            IndexSpec::Ascending(field) | IndexSpec::Text(field) => vec![field.as_str()],
            IndexSpec::Ttl { field, .. } => vec![field.as_str()],
            IndexSpec::Compound(fields) => fields.iter().map(String::as_str).collect(),
        }
    }
}

impl Schema {
    /// Creates a schema with no indexes and no options.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indices: Vec::new(),
            compound: Vec::new(),
            text: Vec::new(),
            ttl: Vec::new(),
            options: Document::new(),
        }
    }

    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    /// Parses a schema from its JSON form.
    pub fn from_json(json: &str) -> TableResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parses a schema from an already decoded JSON value.
    pub fn from_value(value: serde_json::Value) -> TableResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Validates the schema and returns every index in provisioning order:
    /// single-field, then compound, then text, then TTL.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::Precondition`] if the name is empty, an index names an empty field,
    /// a compound entry has no fields, or a TTL entry lacks `expireAfterSeconds`.
    pub fn index_plan(&self) -> TableResult<Vec<IndexSpec>> {
        if self.name.is_empty() {
            return Err(TableError::precondition("schema name must not be empty"));
        }

        let mut plan = Vec::with_capacity(
            self.indices.len() + self.compound.len() + self.text.len() + self.ttl.len(),
        );

        for field in &self.indices {
            plan.push(IndexSpec::Ascending(non_empty_field(field, "indices")?));
        }

        for fields in &self.compound {
            if fields.is_empty() {
                return Err(TableError::precondition("compound index must list at least one field"));
            }
            plan.push(IndexSpec::Compound(
                fields
                    .iter()
                    .map(|field| non_empty_field(field, "compound"))
                    .collect::<TableResult<Vec<_>>>()?,
            ));
        }

        for field in &self.text {
            plan.push(IndexSpec::Text(non_empty_field(field, "text")?));
        }

        for TtlIndex(field, options) in &self.ttl {
            let seconds = options.expire_after_seconds.ok_or_else(|| {
                TableError::precondition(format!("ttl index on `{}` requires expireAfterSeconds", field))
            })?;
            plan.push(IndexSpec::Ttl {
                field: non_empty_field(field, "ttl")?,
                expire_after: Duration::from_secs(seconds),
            });
        }

        Ok(plan)
    }
}

fn non_empty_field(field: &str, section: &str) -> TableResult<String> {
    if field.is_empty() {
        return Err(TableError::precondition(format!("empty field name in `{}`", section)));
    }

    Ok(field.to_string())
}

/// Fluent construction of a [`Schema`].
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { schema: Schema::new(name) }
    }

    /// Adds an ascending single-field index.
    pub fn index(mut self, field: impl Into<String>) -> Self {
        self.schema.indices.push(field.into());
        self
    }

    /// Adds a compound ascending index over `fields`, in order.
    pub fn compound<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schema
            .compound
            .push(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Adds a text index.
    pub fn text(mut self, field: impl Into<String>) -> Self {
        self.schema.text.push(field.into());
        self
    }

    /// Adds a time-to-live index expiring documents `seconds` after `field`.
    pub fn ttl(mut self, field: impl Into<String>, seconds: u64) -> Self {
        self.schema.ttl.push(TtlIndex(
            field.into(),
            TtlOptions { expire_after_seconds: Some(seconds) },
        ));
        self
    }

    /// Adds a passthrough collection option.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.schema.options.insert(key, value);
        self
    }

    pub fn build(self) -> Schema {
        self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_with_defaults_and_passthrough_options() {
        let schema = Schema::from_json(r#"{
            "name": "events",
            "indices": ["user"],
            "ttl": [["created", { "expireAfterSeconds": 60 }]],
            "capped": true
        }"#)
        .unwrap();

        assert_eq!(schema.name, "events");
        assert_eq!(schema.indices, vec!["user".to_string()]);
        assert!(schema.compound.is_empty());
        assert!(schema.text.is_empty());
        assert_eq!(schema.ttl[0].1.expire_after_seconds, Some(60));
        assert_eq!(schema.options.get("capped"), Some(&Bson::Boolean(true)));
        assert!(!schema.options.contains_key("name"));
    }

    #[test]
    fn plan_follows_provisioning_order() {
        let schema = Schema::builder("events")
            .ttl("created", 30)
            .text("body")
            .compound(["user", "created"])
            .index("user")
            .build();

        assert_eq!(
            schema.index_plan().unwrap(),
            vec![
                IndexSpec::Ascending("user".into()),
                IndexSpec::Compound(vec!["user".into(), "created".into()]),
                IndexSpec::Text("body".into()),
                IndexSpec::Ttl { field: "created".into(), expire_after: Duration::from_secs(30) },
            ]
        );
    }

    #[test]
    fn ttl_without_expiry_is_rejected() {
        let schema = Schema::from_json(r#"{ "name": "events", "ttl": [["created", {}]] }"#).unwrap();
        let err = schema.index_plan().unwrap_err();

        assert!(err.is_precondition());
        assert!(err.to_string().contains("expireAfterSeconds"));
    }

    #[test]
    fn ttl_entry_without_options_is_a_precondition_failure() {
        let schema = Schema::from_json(r#"{ "name": "events", "ttl": [["created"]] }"#).unwrap();

        assert_eq!(schema.ttl[0], TtlIndex("created".into(), TtlOptions::default()));
        assert!(schema.index_plan().unwrap_err().is_precondition());
    }

    #[test]
    fn ttl_expiry_accepts_whole_floats() {
        let schema = Schema::from_json(
            r#"{ "name": "events", "ttl": [["created", { "expireAfterSeconds": 3600.0 }]] }"#,
        )
        .unwrap();

        assert_eq!(schema.ttl[0].1.expire_after_seconds, Some(3600));
        assert!(Schema::from_json(r#"{ "name": "e", "ttl": [["c", { "expireAfterSeconds": 1.5 }]] }"#).is_err());
        assert!(Schema::from_json(r#"{ "name": "e", "ttl": [["c", { "expireAfterSeconds": -1 }]] }"#).is_err());
    }

    #[test]
    fn empty_names_are_rejected() {
        assert!(Schema::new("").index_plan().unwrap_err().is_precondition());
        assert!(
            Schema::builder("t")
                .compound(Vec::<String>::new())
                .build()
                .index_plan()
                .unwrap_err()
                .is_precondition()
        );
        assert!(Schema::builder("t").index("").build().index_plan().is_err());
    }
}
