// src/cloud/credentials.rs

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};

#[derive(Deserialize)]
struct KeyFields {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    project_id: Option<String>,
    client_email: String,
}

/// Service-account key, read from disk once and handed to each client.
#[derive(Clone)]
pub struct ServiceAccountKey {
    raw: Vec<u8>,
    pub project_id: Option<String>,
    pub client_email: String,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn read(path: &Path) -> Result<Self> {
        let raw = fs::read(path)
            .with_context(|| format!("reading service-account key {}", path.display()))?;
        Self::from_bytes(raw).with_context(|| format!("parsing key file {}", path.display()))
    }

    pub fn from_bytes(raw: Vec<u8>) -> Result<Self> {
        let fields: KeyFields = serde_json::from_slice(&raw)?;
        if fields.kind != "service_account" {
            bail!("expected a service_account key, found type `{}`", fields.kind);
        }
        Ok(Self {
            raw,
            project_id: fields.project_id.filter(|p| !p.is_empty()),
            client_email: fields.client_email,
        })
    }

    /// `configured` when set, else the key's own project.
    pub fn resolve_project(&self, configured: &str) -> Result<String> {
        if !configured.is_empty() {
            return Ok(configured.to_string());
        }
        match &self.project_id {
            Some(p) => Ok(p.clone()),
            None => bail!("cloud.project is empty and the key file names no project_id"),
        }
    }

    pub fn storage_credentials(
        &self,
    ) -> Result<google_cloud_storage::client::google_cloud_auth::credentials::CredentialsFile> {
        serde_json::from_slice(&self.raw).context("building storage credentials")
    }

    pub fn bigquery_credentials(
        &self,
    ) -> Result<google_cloud_bigquery::client::google_cloud_auth::credentials::CredentialsFile>
    {
        serde_json::from_slice(&self.raw).context("building bigquery credentials")
    }
}
