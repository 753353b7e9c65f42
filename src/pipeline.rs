// src/pipeline.rs

use anyhow::{Context as _, Result};
use tracing::{info, instrument};

use crate::cloud::Context;
use crate::config::Config;
use crate::convert::{convert_folder, ConvertSummary};
use crate::nlp::{Annotator, LanguageModel};
use crate::register::{register_tables, RegisterSummary};
use crate::schema::SchemaStore;
use crate::tables::Catalog;
use crate::upload::{upload_folder, UploadSummary};

/// What each stage did; `None` for stages that were switched off.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub convert: Option<ConvertSummary>,
    pub upload: Option<UploadSummary>,
    pub register: Option<RegisterSummary>,
}

/// Run the enabled stages in order: convert, upload, register.
///
/// `model` is used only when conversion runs; without it no annotation
/// happens. Cloud stages take their clients from `ctx`.
#[instrument(level = "info", skip_all)]
pub async fn run(
    config: &Config,
    catalog: &Catalog,
    ctx: &Context,
    model: Option<&dyn LanguageModel>,
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();

    // ─── 1) xlsx → jsonl ─────────────────────────────────────────────
    if config.options.xlsx2jsonl {
        let mut annotator = model.map(Annotator::new);
        let conv = convert_folder(
            &config.local.raw,
            &config.local.jsonl,
            catalog,
            annotator.as_mut(),
        )
        .await?;
        info!(
            files = conv.files,
            rows = conv.rows,
            annotated_rows = conv.annotated_rows,
            "conversion stage done"
        );
        if let Some(ann) = &annotator {
            info!(
                sentences = ann.sentences().len(),
                tokens = ann.tokens().len(),
                "annotation done"
            );
        }
        summary.convert = Some(conv);
    } else {
        info!("conversion disabled");
    }

    // ─── 2) upload ───────────────────────────────────────────────────
    if config.options.storage {
        let store = ctx
            .store
            .as_deref()
            .context("storage stage enabled but no object store configured")?;
        let up = upload_folder(store, &config.local.jsonl, &config.cloud.bucket).await?;
        info!(objects = up.objects.len(), bytes = up.bytes, "upload stage done");
        summary.upload = Some(up);
    } else {
        info!("upload disabled");
    }

    // ─── 3) external tables ──────────────────────────────────────────
    if config.options.bigquery {
        let store = ctx
            .store
            .as_deref()
            .context("bigquery stage needs the object store to list the bucket")?;
        let warehouse = ctx
            .warehouse
            .as_deref()
            .context("bigquery stage enabled but no warehouse configured")?;
        let reg = register_tables(
            store,
            warehouse,
            &config.cloud.bucket,
            &config.cloud.dataset,
            &SchemaStore::new(&config.local.schemas),
        )
        .await?;
        info!(
            created = reg.created.len(),
            existing = reg.existing.len(),
            "registration stage done"
        );
        summary.register = Some(reg);
    } else {
        info!("table registration disabled");
    }

    info!(
        converted = summary.convert.as_ref().map_or(0, |c| c.files),
        uploaded = summary.upload.as_ref().map_or(0, |u| u.objects.len()),
        tables_created = summary.register.as_ref().map_or(0, |r| r.created.len()),
        tables_existing = summary.register.as_ref().map_or(0, |r| r.existing.len()),
        "pipeline finished"
    );
    Ok(summary)
}
