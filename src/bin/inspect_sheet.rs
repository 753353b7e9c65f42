// src/bin/inspect_sheet.rs

use anyhow::Result;
use capjsonl::convert::{normalize, sheet};
use capjsonl::tables::{Catalog, TableDescriptor};
use clap::Parser;
use std::path::PathBuf;

/// Show what a workbook turns into: its sheets, the cleaned column names and
/// the first normalized rows.
#[derive(Parser, Debug)]
struct Args {
    /// Workbook to inspect
    path: PathBuf,

    /// Sheet index; defaults to the catalog's choice for known files, else 0
    #[arg(long)]
    sheet: Option<usize>,

    /// Number of rows to print
    #[arg(long, default_value_t = 5)]
    rows: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let catalog = Catalog::cap();

    let stem = args
        .path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let mut desc = match catalog.lookup(stem) {
        Some(d) => {
            println!("catalog: {} → table `{}`", stem, d.table);
            *d
        }
        None => {
            println!("catalog: `{}` is not a known file, the pipeline would skip it", stem);
            TableDescriptor::new("", "")
        }
    };
    if let Some(i) = args.sheet {
        desc = desc.sheet(i);
    }

    println!("sheets:");
    for (i, name) in sheet::sheet_names(&args.path)?.iter().enumerate() {
        let mark = if i == desc.sheet { "*" } else { " " };
        println!("  {} [{}] {}", mark, i, name);
    }

    let ws = sheet::read_sheet(&args.path, desc.sheet)?;
    println!("columns:");
    let plans = normalize::plan_columns(&ws);
    for plan in &plans {
        println!("  {:>3}  {}", plan.index, plan.name);
    }
    let dropped = ws.headers.len().saturating_sub(plans.len());
    if dropped > 0 {
        println!("  ({} unnamed column(s) dropped)", dropped);
    }

    let records = normalize::normalize_sheet(&ws, &desc);
    println!("rows: {} total, first {}:", records.len(), args.rows.min(records.len()));
    for rec in records.iter().take(args.rows) {
        println!("{}", serde_json::to_string(rec)?);
    }
    Ok(())
}
