// src/cloud/gcs.rs

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::fs::File;
use tracing::{debug, info, instrument};

use google_cloud_storage::client::{Client, ClientConfig};
use google_cloud_storage::http::buckets::get::GetBucketRequest;
use google_cloud_storage::http::buckets::insert::{
    BucketCreationConfig, InsertBucketParam, InsertBucketRequest,
};
use google_cloud_storage::http::objects::list::ListObjectsRequest;
use google_cloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};
use google_cloud_storage::http::Error as GcsError;

use super::{ObjectStore, Provision, ServiceAccountKey, LOCATION, STORAGE_CLASS};

fn status(err: &GcsError) -> Option<u16> {
    match err {
        GcsError::Response(resp) => Some(resp.code),
        _ => None,
    }
}

/// Google Cloud Storage, authenticated with a service-account key.
pub struct GcsStore {
    client: Client,
    project: String,
}

impl GcsStore {
    pub async fn connect(key: &ServiceAccountKey, project: &str) -> Result<Self> {
        let cfg = ClientConfig::default()
            .with_credentials(key.storage_credentials()?)
            .await
            .context("authenticating to GCS")?;
        Ok(Self {
            client: Client::new(cfg),
            project: project.to_string(),
        })
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let req = GetBucketRequest {
            bucket: bucket.to_string(),
            ..Default::default()
        };
        match self.client.get_bucket(&req).await {
            Ok(_) => Ok(true),
            Err(e) if status(&e) == Some(404) => Ok(false),
            Err(e) => Err(e).with_context(|| format!("looking up bucket {}", bucket)),
        }
    }

    #[instrument(level = "info", skip(self), fields(project = %self.project))]
    async fn create_bucket(&self, bucket: &str) -> Result<Provision> {
        let req = InsertBucketRequest {
            name: bucket.to_string(),
            param: InsertBucketParam {
                project: self.project.clone(),
                ..Default::default()
            },
            bucket: BucketCreationConfig {
                location: LOCATION.to_string(),
                storage_class: Some(STORAGE_CLASS.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        match self.client.insert_bucket(&req).await {
            Ok(_) => {
                info!(bucket, "bucket created");
                Ok(Provision::Created)
            }
            Err(e) if status(&e) == Some(409) => Ok(Provision::AlreadyExists),
            Err(e) => Err(e).with_context(|| format!("creating bucket {}", bucket)),
        }
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut page_token = None;
        loop {
            let req = ListObjectsRequest {
                bucket: bucket.to_string(),
                page_token: page_token.take(),
                ..Default::default()
            };
            let resp = self
                .client
                .list_objects(&req)
                .await
                .with_context(|| format!("listing gs://{}", bucket))?;
            names.extend(resp.items.unwrap_or_default().into_iter().map(|o| o.name));
            match resp.next_page_token {
                Some(t) if !t.is_empty() => page_token = Some(t),
                _ => break,
            }
        }
        debug!(bucket, objects = names.len(), "listed bucket");
        Ok(names)
    }

    async fn upload_file(&self, bucket: &str, object: &str, path: &Path) -> Result<u64> {
        let (file, media) = open_upload(path, object).await?;
        let len = media.content_length.unwrap_or_default();

        let req = UploadObjectRequest {
            bucket: bucket.to_string(),
            ..Default::default()
        };
        self.client
            .upload_object(&req, file, &UploadType::Simple(media))
            .await
            .with_context(|| format!("uploading {} to gs://{}/{}", path.display(), bucket, object))?;
        Ok(len)
    }
}

/// Open `path` for a streamed upload; the media length comes from the file's
/// metadata.
async fn open_upload(path: &Path, object: &str) -> Result<(File, Media)> {
    let file = File::open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    let len = file
        .metadata()
        .await
        .with_context(|| format!("reading metadata of {}", path.display()))?
        .len();

    let mut media = Media::new(object.to_string());
    media.content_type = "application/x-ndjson".into();
    media.content_length = Some(len);
    Ok((file, media))
}
