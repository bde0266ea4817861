//! Schema provisioning.
//!
//! [`provision`] turns a [`Schema`] into a ready collection. The steps run strictly in
//! sequence, each awaited before the next:
//!
//! 1. build and validate the index plan (no I/O; precondition failures stop here),
//! 2. create the collection with the schema's passthrough options,
//! 3. create single-field indexes, then compound, then text, then TTL indexes.
//!
//! An already existing collection is logged and skipped, so re-provisioning an initialized
//! table succeeds and still creates any index that is missing. Every other failure aborts
//! the remaining steps.

use tracing::{debug, info, instrument};

use crate::{
    backend::TableBackend,
    error::{TableError, TableResult},
    schema::Schema,
};

/// What a provisioning run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    /// `false` when the collection already existed.
    pub collection_created: bool,
    /// Number of index-creation calls issued.
    pub indexes: usize,
}

#[instrument(skip(backend, schema), fields(collection = %schema.name))]
pub async fn provision<B: TableBackend>(backend: &B, schema: &Schema) -> TableResult<ProvisionReport> {
    let plan = schema.index_plan()?;

    let collection_created = match backend
        .create_collection(&schema.name, &schema.options)
        .await
    {
        Ok(()) => {
            info!("created collection");
            true
        }
        Err(TableError::CollectionAlreadyExists(_)) => {
            info!("collection already exists, continuing with indexes");
            false
        }
        Err(err) => return Err(err),
    };

    for index in &plan {
        debug!(?index, "creating index");
        backend
            .create_index(&schema.name, index)
            .await?;
    }

    info!(indexes = plan.len(), "provisioned");

    Ok(ProvisionReport { collection_created, indexes: plan.len() })
}
