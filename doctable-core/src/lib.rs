//! A schema-driven table layer over document stores.
//!
//! This crate is the core of the doctable project and provides:
//!
//! - **Records and identifiers** ([`document`]) - Open-ended records and identifier resolution
//! - **Schemas** ([`schema`]) - Declarative collection and index definitions
//! - **Provisioning** ([`provision`]) - Turning a schema into a ready collection
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing different storage backends
//! - **Query and filtering API** ([`query`]) - Type-safe query construction and filtering
//! - **Streaming** ([`stream`]) - Lazy, cancellable streams over query cursors
//! - **Tables** ([`table`]) - The table handle and its operation surface
//! - **Error handling** ([`error`]) - Error taxonomy and result types
//!
//! # Example
//!
//! ```ignore
//! use doctable::{Record, Schema, Table};
//! use doctable::memory::InMemoryStore;
//! use bson::doc;
//!
//! let schema = Schema::builder("events")
//!     .index("user")
//!     .compound(["user", "created"])
//!     .ttl("expires", 3600)
//!     .build();
//!
//! let events = Table::provision(InMemoryStore::new(), schema).await?;
//! events.create(Record::from(doc! { "id": "e1", "user": "u1", "created": 1 })).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as doctable_core;

pub mod backend;
pub mod document;
pub mod error;
pub mod provision;
pub mod query;
pub mod schema;
pub mod stream;
pub mod table;
