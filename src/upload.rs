// src/upload.rs

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, instrument, warn};

use crate::cloud::{ObjectStore, Provision};
use crate::convert::files_with_extension;

#[derive(Debug)]
pub struct UploadSummary {
    pub bucket: Provision,
    pub objects: Vec<String>,
    pub bytes: u64,
}

/// Object name for a local `.jsonl` file: its stem.
fn object_name(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|s| s.to_str())
}

/// Make sure `bucket` exists, then upload every `.jsonl` in `folder` as an
/// object named after the file stem. Stops at the first failed upload.
#[instrument(level = "info", skip(store), fields(folder = %folder.display()))]
pub async fn upload_folder(
    store: &dyn ObjectStore,
    folder: &Path,
    bucket: &str,
) -> Result<UploadSummary> {
    let provision = store.ensure_bucket(bucket).await?;
    match provision {
        Provision::Created => info!(bucket, "created bucket"),
        Provision::AlreadyExists => info!(bucket, "bucket already exists"),
    }

    let mut summary = UploadSummary {
        bucket: provision,
        objects: Vec::new(),
        bytes: 0,
    };
    if !folder.is_dir() {
        warn!("jsonl folder does not exist, nothing to upload");
        return Ok(summary);
    }

    for path in files_with_extension(folder, "jsonl")? {
        let Some(object) = object_name(&path) else {
            warn!(file = %path.display(), "skipping file with non UTF-8 name");
            continue;
        };
        let bytes = store
            .upload_file(bucket, object, &path)
            .await
            .with_context(|| format!("uploading {}", path.display()))?;
        info!(object, bytes, "uploaded");
        summary.bytes += bytes;
        summary.objects.push(object.to_string());
    }

    info!(
        objects = summary.objects.len(),
        bytes = summary.bytes,
        "upload finished"
    );
    Ok(summary)
}
