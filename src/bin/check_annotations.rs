// src/bin/check_annotations.rs

use anyhow::{Context, Result};
use capjsonl::jsonl::read_jsonl;
use capjsonl::nlp::{check_integrity, SentenceRecord, TokenRecord, SENTENCE_FILE, TOKEN_FILE};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Verify the sentence and token files in an output folder: gapless ids from
/// 1 and every token pointing at an existing sentence.
#[derive(Parser, Debug)]
struct Args {
    /// Folder holding mondat.jsonl and conll_szo.jsonl
    #[arg(default_value = "jsonl")]
    dir: PathBuf,
}

fn main() -> Result<()> {
    fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();
    let sentences: Vec<SentenceRecord> = read_jsonl(&args.dir.join(SENTENCE_FILE))
        .context("loading sentences")?;
    let tokens: Vec<TokenRecord> =
        read_jsonl(&args.dir.join(TOKEN_FILE)).context("loading tokens")?;
    info!(sentences = sentences.len(), tokens = tokens.len(), "loaded");

    let report = check_integrity(&sentences, &tokens);
    if report.is_clean() {
        info!("annotations are consistent");
        return Ok(());
    }
    error!(
        sentence_gaps = report.sentence_gaps,
        token_gaps = report.token_gaps,
        dangling_tokens = report.dangling_tokens,
        "annotations are inconsistent"
    );
    std::process::exit(1);
}
