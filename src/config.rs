// src/config.rs

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use url::Url;

/// GCS bucket names: 3-63 chars, lowercase letters, digits, `-`, `_` and `.`,
/// starting and ending with a letter or digit.
static BUCKET_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9._-]{1,61}[a-z0-9]$").unwrap());

/// BigQuery dataset ids: letters, digits and underscores, at most 1024 chars.
static DATASET_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]{1,1024}$").unwrap());

/// Top-level settings, one struct per group of the YAML file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub local: LocalPaths,
    pub cloud: CloudTarget,
    pub options: Stages,
    #[serde(default)]
    pub nlp: NlpSettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LocalPaths {
    /// Folder holding the source `.xlsx` files.
    pub raw: PathBuf,
    /// Folder the `.jsonl` files are written to (and uploaded from).
    pub jsonl: PathBuf,
    /// Folder holding one `<table>.json` schema description per table.
    pub schemas: PathBuf,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CloudTarget {
    /// Empty means "take `project_id` from the key file".
    #[serde(default)]
    pub project: String,
    pub bucket: String,
    pub dataset: String,
    #[serde(default = "default_key_file")]
    pub key_file: PathBuf,
}

fn default_key_file() -> PathBuf {
    PathBuf::from("gcp_key.json")
}

/// Which stages run.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Stages {
    pub xlsx2jsonl: bool,
    pub storage: bool,
    pub bigquery: bool,
}

impl Stages {
    pub fn needs_cloud(&self) -> bool {
        self.storage || self.bigquery
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NlpBackend {
    /// UDPipe-compatible REST service.
    #[default]
    Udpipe,
    /// Built-in Unicode sentence/word segmentation, no tagging.
    Segmenter,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct NlpSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub backend: NlpBackend,
    #[serde(default = "default_endpoint")]
    pub endpoint: Url,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_endpoint() -> Url {
    Url::parse("https://lindat.mff.cuni.cz/services/udpipe/api/").expect("static url")
}

fn default_model() -> String {
    "hungarian".to_string()
}

impl Default for NlpSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: NlpBackend::default(),
            endpoint: default_endpoint(),
            model: default_model(),
        }
    }
}

impl Config {
    /// Read and validate the settings file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let cfg = Self::from_yaml(&text)
            .with_context(|| format!("loading config file {}", path.display()))?;
        Ok(cfg)
    }

    /// Parse and validate YAML text. Paths are taken as written.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(text).context("parsing YAML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks that need no filesystem access; the key file is checked when
    /// credentials are loaded.
    pub fn validate(&self) -> Result<()> {
        if self.options.needs_cloud() {
            if !BUCKET_NAME.is_match(&self.cloud.bucket) {
                bail!("cloud.bucket `{}` is not a valid bucket name", self.cloud.bucket);
            }
            if self.cloud.bucket.contains("..") {
                bail!("cloud.bucket `{}` must not contain `..`", self.cloud.bucket);
            }
        }
        if self.options.bigquery && !DATASET_NAME.is_match(&self.cloud.dataset) {
            bail!("cloud.dataset `{}` is not a valid dataset id", self.cloud.dataset);
        }
        if self.nlp.enabled
            && self.nlp.backend == NlpBackend::Udpipe
            && self.nlp.model.trim().is_empty()
        {
            bail!("nlp.model must be set for the udpipe backend");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
local:
  raw: data/raw
  jsonl: data/jsonl
  schemas: schemas
cloud:
  project: cap-project
  bucket: cap-data
  dataset: cap
options:
  xlsx2jsonl: true
  storage: true
  bigquery: false
nlp:
  enabled: true
  backend: segmenter
"#;

    #[test]
    fn parses_all_groups() {
        let cfg = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(cfg.local.raw, PathBuf::from("data/raw"));
        assert_eq!(cfg.cloud.key_file, PathBuf::from("gcp_key.json"));
        assert!(cfg.options.xlsx2jsonl && cfg.options.storage && !cfg.options.bigquery);
        assert!(cfg.nlp.enabled);
        assert_eq!(cfg.nlp.backend, NlpBackend::Segmenter);
        assert_eq!(cfg.nlp.model, "hungarian");
    }

    #[test]
    fn nlp_group_is_optional() {
        let text = SAMPLE.split("nlp:").next().unwrap();
        let cfg = Config::from_yaml(text).unwrap();
        assert!(!cfg.nlp.enabled);
        assert_eq!(cfg.nlp.backend, NlpBackend::Udpipe);
    }

    #[test]
    fn rejects_unknown_keys() {
        let text = SAMPLE.replace("  storage: true", "  storage: true\n  sftp: true");
        let err = Config::from_yaml(&text).unwrap_err();
        assert!(format!("{:#}", err).contains("sftp"));
    }

    #[test]
    fn rejects_stringly_booleans() {
        let text = SAMPLE.replace("storage: true", "storage: \"yes\"");
        assert!(Config::from_yaml(&text).is_err());
    }

    #[test]
    fn rejects_bad_bucket_when_uploading() {
        let text = SAMPLE.replace("bucket: cap-data", "bucket: Cap_Data!");
        assert!(Config::from_yaml(&text).is_err());

        // not checked when no cloud stage runs
        let offline = text.replace("storage: true", "storage: false");
        assert!(Config::from_yaml(&offline).is_ok());
    }

    #[test]
    fn rejects_bad_dataset_when_registering() {
        let text = SAMPLE
            .replace("bigquery: false", "bigquery: true")
            .replace("dataset: cap", "dataset: cap-speeches");
        assert!(Config::from_yaml(&text).is_err());
    }
}
