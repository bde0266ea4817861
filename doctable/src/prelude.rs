//! Convenient re-exports of commonly used types from doctable.
//!
//! ```ignore
//! use doctable::prelude::*;
//! ```

pub use doctable_core::{
    table::{Table, SetOptions, UpdateOptions},
    document::{Record, RecordId, resolve_id},
    schema::{Schema, SchemaBuilder, IndexSpec, TtlIndex, TtlOptions},
    provision::{provision, ProvisionReport},
    backend::{TableBackend, TableBackendBuilder, BulkWriteSummary},
    query::{Query, QueryBuilder, QueryVisitor, Expr, Filter, FieldOp, Sort, SortDirection, FindOptions, SearchOptions, RangeQuery, UpdateOp},
    stream::RecordStream,
    error::{TableError, TableResult},
};
