//! MongoDB backend implementation for doctable.
//!
//! This crate provides a MongoDB-based implementation of the `TableBackend` trait.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! doctable = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Verbatim collection options** - Schema options are passed to the `create` command unchanged
//! - **Full index support** - Single-field, compound, text and TTL indexes
//! - **Server-side cursors** - Query results stream batch by batch
//! - **Bulk upserts** - One ordered client bulk write per `upsert_many` call (MongoDB 8.0+)
//!
//! # Example
//!
//! ```ignore
//! use doctable::{Schema, Table, backend::TableBackendBuilder, mongodb::MongoDbStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!         .build()
//!         .await?;
//!     let users = Table::provision(store, Schema::builder("users").index("email").build()).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as doctable_mongodb;

pub mod store;
pub mod query;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
