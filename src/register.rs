// src/register.rs

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::cloud::{ExternalTable, ObjectStore, Provision, Warehouse};
use crate::schema::SchemaStore;

#[derive(Debug, Default)]
pub struct RegisterSummary {
    pub dataset: Option<Provision>,
    pub created: Vec<String>,
    pub existing: Vec<String>,
}

/// Table name for a bucket object: the part before the first `.`, with
/// anything outside `[A-Za-z0-9_]` replaced by `_`.
pub fn table_name(object: &str) -> String {
    let base = object.split('.').next().unwrap_or_default();
    base.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Make sure `dataset` exists, then create one external table per object in
/// `bucket`. Tables that already exist are left untouched.
#[instrument(level = "info", skip(store, warehouse, schemas), fields(project = %warehouse.project()))]
pub async fn register_tables(
    store: &dyn ObjectStore,
    warehouse: &dyn Warehouse,
    bucket: &str,
    dataset: &str,
    schemas: &SchemaStore,
) -> Result<RegisterSummary> {
    let mut summary = RegisterSummary::default();

    let provision = warehouse.ensure_dataset(dataset).await?;
    match provision {
        Provision::Created => info!(dataset, "created dataset"),
        Provision::AlreadyExists => info!(dataset, "dataset already exists"),
    }
    summary.dataset = Some(provision);

    let objects = store.list_objects(bucket).await?;
    info!(bucket, objects = objects.len(), "registering external tables");

    for object in objects {
        let table = table_name(&object);
        if table.is_empty() {
            warn!(object, "object name gives no table name, skipping");
            continue;
        }
        let schema = schemas.fields(&table)?;
        if schema.is_none() {
            info!(%table, "no schema description, using auto-detect");
        }
        let ext = ExternalTable {
            dataset: dataset.to_string(),
            table: table.clone(),
            source_uri: format!("gs://{}/{}", bucket, object),
            schema,
        };
        match warehouse
            .create_external_table(&ext)
            .await
            .with_context(|| format!("registering {}", ext.source_uri))?
        {
            Provision::Created => {
                info!(%table, uri = %ext.source_uri, "created external table");
                summary.created.push(table);
            }
            Provision::AlreadyExists => {
                info!(%table, "table already exists");
                summary.existing.push(table);
            }
        }
    }

    info!(
        created = summary.created.len(),
        existing = summary.existing.len(),
        "registration finished"
    );
    Ok(summary)
}
