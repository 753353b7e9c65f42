// src/nlp/udpipe.rs

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info};
use url::Url;

use super::{conllu, AnalyzedSentence, LanguageModel};

/// Client for a UDPipe 2 compatible REST service (`/models`, `/process`).
pub struct UdpipeModel {
    client: Client,
    base: Url,
    /// Full model name as reported by the service.
    model: String,
}

#[derive(Deserialize)]
struct ModelsResponse {
    models: BTreeMap<String, Vec<String>>,
}

#[derive(Deserialize)]
struct ProcessResponse {
    result: String,
}

/// `https://host/api` and `https://host/api/` both resolve `process` below `api`.
fn endpoint(base: &Url, method: &str) -> Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(method)
        .with_context(|| format!("building {} url from {}", method, base))
}

/// Pick the served model matching `wanted`: exact name first, then prefix
/// (`hungarian` matches `hungarian-szeged-ud-2.12-230717`).
fn pick_model(served: &BTreeMap<String, Vec<String>>, wanted: &str) -> Option<String> {
    if served.contains_key(wanted) {
        return Some(wanted.to_string());
    }
    served.keys().find(|name| name.starts_with(wanted)).cloned()
}

impl UdpipeModel {
    /// Ask the service which models it serves and make sure `model` is one of
    /// them and can tokenize, tag and parse.
    pub async fn connect(base: Url, model: &str) -> Result<Self> {
        let client = Client::new();
        let url = endpoint(&base, "models")?;
        let resp = client
            .get(url.clone())
            .query(&[("model", model)])
            .send()
            .await
            .with_context(|| format!("requesting {}", url))?
            .error_for_status()
            .with_context(|| format!("model `{}` not available at {}", model, base))?;
        let listing: ModelsResponse = resp.json().await.context("parsing model list")?;

        let Some(name) = pick_model(&listing.models, model) else {
            bail!("service at {} does not serve model `{}`", base, model);
        };
        let caps = &listing.models[&name];
        for needed in ["tokenizer", "tagger", "parser"] {
            if !caps.iter().any(|c| c == needed) {
                bail!("model `{}` has no {}", name, needed);
            }
        }

        info!(model = %name, endpoint = %base, "UDPipe model found");
        Ok(Self {
            client,
            base,
            model: name,
        })
    }
}

#[async_trait]
impl LanguageModel for UdpipeModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn analyze(&self, text: &str) -> Result<Vec<AnalyzedSentence>> {
        let url = endpoint(&self.base, "process")?;
        let resp = self
            .client
            .post(url.clone())
            .form(&[
                ("model", self.model.as_str()),
                ("tokenizer", ""),
                ("tagger", ""),
                ("parser", ""),
                ("data", text),
            ])
            .send()
            .await
            .with_context(|| format!("posting to {}", url))?
            .error_for_status()?;
        let body: ProcessResponse = resp.json().await.context("parsing UDPipe response")?;
        debug!(bytes = body.result.len(), "received CoNLL-U");
        conllu::parse(&body.result)
    }
}
