// In-memory stand-ins for the cloud services, used by tests.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
    sync::Mutex,
};

use super::{ExternalTable, ObjectStore, Provision, Warehouse};

#[derive(Default)]
pub(crate) struct MemoryStore {
    buckets: Mutex<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
    /// Calls to `upload_file` that should fail, by object name.
    pub fail_uploads: BTreeSet<String>,
}

impl MemoryStore {
    pub fn with_bucket(bucket: &str) -> Self {
        let store = Self::default();
        store.buckets.lock().unwrap().insert(bucket.to_string(), BTreeMap::new());
        store
    }

    pub fn put(&self, bucket: &str, object: &str, data: &[u8]) {
        self.buckets
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default()
            .insert(object.to_string(), data.to_vec());
    }

    pub fn object(&self, bucket: &str, object: &str) -> Option<Vec<u8>> {
        self.buckets.lock().unwrap().get(bucket)?.get(object).cloned()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self.buckets.lock().unwrap().contains_key(bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<Provision> {
        let mut buckets = self.buckets.lock().unwrap();
        if buckets.contains_key(bucket) {
            return Ok(Provision::AlreadyExists);
        }
        buckets.insert(bucket.to_string(), BTreeMap::new());
        Ok(Provision::Created)
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>> {
        let buckets = self.buckets.lock().unwrap();
        let objects = buckets
            .get(bucket)
            .with_context(|| format!("bucket {} not found", bucket))?;
        Ok(objects.keys().cloned().collect())
    }

    async fn upload_file(&self, bucket: &str, object: &str, path: &Path) -> Result<u64> {
        if self.fail_uploads.contains(object) {
            bail!("simulated transport failure for {}", object);
        }
        let data = std::fs::read(path)?;
        let mut buckets = self.buckets.lock().unwrap();
        let objects = buckets
            .get_mut(bucket)
            .with_context(|| format!("bucket {} not found", bucket))?;
        let len = data.len() as u64;
        objects.insert(object.to_string(), data);
        Ok(len)
    }
}

pub(crate) struct MemoryWarehouse {
    project: String,
    datasets: Mutex<BTreeSet<String>>,
    tables: Mutex<BTreeMap<(String, String), ExternalTable>>,
    /// Table names whose creation is rejected with a non-conflict error.
    pub reject_tables: BTreeSet<String>,
}

impl MemoryWarehouse {
    pub fn new(project: &str) -> Self {
        Self {
            project: project.to_string(),
            datasets: Mutex::default(),
            tables: Mutex::default(),
            reject_tables: BTreeSet::new(),
        }
    }

    pub fn table(&self, dataset: &str, table: &str) -> Option<ExternalTable> {
        self.tables
            .lock()
            .unwrap()
            .get(&(dataset.to_string(), table.to_string()))
            .cloned()
    }

    pub fn table_count(&self) -> usize {
        self.tables.lock().unwrap().len()
    }

    pub fn has_dataset(&self, dataset: &str) -> bool {
        self.datasets.lock().unwrap().contains(dataset)
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    fn project(&self) -> &str {
        &self.project
    }

    async fn dataset_exists(&self, dataset: &str) -> Result<bool> {
        Ok(self.has_dataset(dataset))
    }

    async fn create_dataset(&self, dataset: &str) -> Result<Provision> {
        if self.datasets.lock().unwrap().insert(dataset.to_string()) {
            Ok(Provision::Created)
        } else {
            Ok(Provision::AlreadyExists)
        }
    }

    async fn create_external_table(&self, table: &ExternalTable) -> Result<Provision> {
        if !self.has_dataset(&table.dataset) {
            bail!("dataset {} not found", table.dataset);
        }
        if self.reject_tables.contains(&table.table) {
            bail!("permission denied on {}", table.table);
        }
        let key = (table.dataset.clone(), table.table.clone());
        let mut tables = self.tables.lock().unwrap();
        if tables.contains_key(&key) {
            return Ok(Provision::AlreadyExists);
        }
        tables.insert(key, table.clone());
        Ok(Provision::Created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn provisioning_twice_reports_existing() -> Result<()> {
        let store = MemoryStore::default();
        assert_eq!(store.ensure_bucket("b").await?, Provision::Created);
        assert_eq!(store.ensure_bucket("b").await?, Provision::AlreadyExists);
        assert_eq!(store.bucket_count(), 1);

        let wh = MemoryWarehouse::new("p");
        assert_eq!(wh.ensure_dataset("d").await?, Provision::Created);
        assert_eq!(wh.ensure_dataset("d").await?, Provision::AlreadyExists);
        Ok(())
    }
}
