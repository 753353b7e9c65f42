use anyhow::{Context as _, Result};
use capjsonl::{cloud::Context, config::Config, nlp, pipeline, tables::Catalog};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Convert the CAP spreadsheets to JSON Lines, upload them and register
/// them as BigQuery external tables.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Settings file
    #[arg(long, env = "CAPJSONL_CONFIG", default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    if let Err(e) = run(Args::parse()).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    info!(config = %args.config.display(), "startup");

    // ─── 2) settings ─────────────────────────────────────────────────
    let config = Config::load(&args.config)?;
    info!(
        xlsx2jsonl = config.options.xlsx2jsonl,
        storage = config.options.storage,
        bigquery = config.options.bigquery,
        nlp = config.nlp.enabled,
        "stages"
    );

    // ─── 3) clients ──────────────────────────────────────────────────
    let ctx = Context::connect(&config)
        .await
        .context("connecting to Google Cloud")?;
    let model = if config.options.xlsx2jsonl && config.nlp.enabled {
        let m = nlp::load_model(&config.nlp).await?;
        info!(model = m.name(), "language model ready");
        Some(m)
    } else {
        None
    };

    // ─── 4) run ──────────────────────────────────────────────────────
    pipeline::run(&config, &Catalog::cap(), &ctx, model.as_deref()).await?;
    Ok(())
}
