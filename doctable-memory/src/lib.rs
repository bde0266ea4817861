//! In-memory table backend for doctable.
//!
//! This crate provides a thread-safe, in-memory implementation of the `TableBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is ideal for development
//! and testing.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Full query support** - Filtering, sorting, pagination and projection
//! - **Store semantics** - Duplicate detection, upserts and array updates behave like a document store
//!
//! # Quick Start
//!
//! ```ignore
//! use doctable::{Record, Schema, Table, memory::InMemoryStore};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = InMemoryStore::builder().build().await?;
//!     let users = Table::provision(backend, Schema::new("users")).await?;
//!
//!     users.create(Record::from(doc! { "id": "u1", "name": "Alice" })).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as doctable_memory;

pub mod store;
pub mod evaluator;

pub use store::{InMemoryCollection, InMemoryStore, InMemoryStoreBuilder};
