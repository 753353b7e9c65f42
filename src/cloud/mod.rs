// src/cloud/mod.rs

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use tracing::info;

use crate::config::Config;
use crate::schema::FieldDescriptor;

pub mod bigquery;
pub mod credentials;
pub mod gcs;
#[cfg(test)]
pub(crate) mod memory;

pub use bigquery::BigQueryWarehouse;
pub use credentials::ServiceAccountKey;
pub use gcs::GcsStore;

/// Location every bucket and dataset is created in.
pub const LOCATION: &str = "US";
pub const STORAGE_CLASS: &str = "STANDARD";

/// Outcome of a create-if-absent call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provision {
    Created,
    AlreadyExists,
}

impl Provision {
    pub fn is_created(self) -> bool {
        matches!(self, Provision::Created)
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    /// Create `bucket`; a name conflict is `AlreadyExists`, not an error.
    async fn create_bucket(&self, bucket: &str) -> Result<Provision>;

    /// Object names in `bucket`, in listing order.
    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>>;

    /// Upload `path` as `object`, overwriting. Returns the byte count.
    async fn upload_file(&self, bucket: &str, object: &str, path: &Path) -> Result<u64>;

    async fn ensure_bucket(&self, bucket: &str) -> Result<Provision> {
        if self.bucket_exists(bucket).await? {
            return Ok(Provision::AlreadyExists);
        }
        self.create_bucket(bucket).await
    }
}

/// An external table backed by one bucket object.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalTable {
    pub dataset: String,
    pub table: String,
    pub source_uri: String,
    /// `None` lets the warehouse detect the schema.
    pub schema: Option<Vec<FieldDescriptor>>,
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Project the datasets live in.
    fn project(&self) -> &str;

    async fn dataset_exists(&self, dataset: &str) -> Result<bool>;

    async fn create_dataset(&self, dataset: &str) -> Result<Provision>;

    async fn create_external_table(&self, table: &ExternalTable) -> Result<Provision>;

    async fn ensure_dataset(&self, dataset: &str) -> Result<Provision> {
        if self.dataset_exists(dataset).await? {
            return Ok(Provision::AlreadyExists);
        }
        self.create_dataset(dataset).await
    }
}

/// Cloud clients for one run. Each is present only when a stage needs it.
#[derive(Default)]
pub struct Context {
    pub store: Option<Box<dyn ObjectStore>>,
    pub warehouse: Option<Box<dyn Warehouse>>,
}

impl Context {
    /// No cloud access; enough for a conversion-only run.
    pub fn offline() -> Self {
        Self::default()
    }

    /// Read the key file once and build the clients the enabled stages use.
    pub async fn connect(config: &Config) -> Result<Self> {
        if !config.options.needs_cloud() {
            return Ok(Self::offline());
        }
        let key = ServiceAccountKey::read(&config.cloud.key_file)?;
        let project = key.resolve_project(&config.cloud.project)?;
        info!(project = %project, account = %key.client_email, "cloud credentials loaded");

        let store = GcsStore::connect(&key, &project).await?;
        let warehouse = if config.options.bigquery {
            Some(Box::new(BigQueryWarehouse::connect(&key, &project).await?) as Box<dyn Warehouse>)
        } else {
            None
        };

        Ok(Self {
            store: Some(Box::new(store)),
            warehouse,
        })
    }
}
