//! Main doctable crate: schema-driven tables over document stores.
//!
//! This crate is the primary entry point for users of doctable. It re-exports the core
//! types from the sub-crates and provides access to the storage backends.
//!
//! # Features
//!
//! - **Declarative provisioning** - A schema names the collection and its single-field,
//!   compound, text and TTL indexes; provisioning creates them once, in order
//! - **Identifier-keyed operations** - `get`, `set`, `update`, `push`, `pull` and friends all
//!   resolve the document identifier the same way
//! - **Range and pattern queries** - Sorted range scans and literal, case-insensitive search
//! - **Streaming** - Lazy, cancellable streams over query cursors
//! - **Multiple backends** - In-memory and MongoDB, behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use doctable::{prelude::*, memory::InMemoryStore};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> TableResult<()> {
//!     let schema = Schema::from_json(r#"{
//!         "name": "events",
//!         "indices": ["user"],
//!         "ttl": [["expires", { "expireAfterSeconds": 3600 }]]
//!     }"#)?;
//!
//!     let events = Table::provision(InMemoryStore::builder().build().await?, schema).await?;
//!
//!     events.upsert(Record::from(doc! { "id": "e1", "user": "u1", "created": 1 })).await?;
//!     let recent = events
//!         .get_by_sorted_between(RangeQuery::new().filter(Filter::eq("user", "u1")))
//!         .await?;
//!
//!     println!("{} events", recent.len());
//!     events.close().await
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - `mongodb` - MongoDB backend (requires the `mongodb` feature)

pub mod prelude;

pub use doctable_core::{backend, document, error, provision, query, schema, stream, table};
pub use doctable_core::{
    document::{Record, RecordId},
    error::{TableError, TableResult},
    schema::Schema,
    table::Table,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use doctable_memory::{InMemoryCollection, InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use doctable_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
