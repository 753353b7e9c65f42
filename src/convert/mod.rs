// src/convert/mod.rs

pub mod normalize;
pub mod sheet;

use anyhow::{Context, Result};
use glob::{glob_with, MatchOptions, Pattern};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use crate::jsonl::write_jsonl;
use crate::nlp::Annotator;
use crate::tables::{Catalog, TableDescriptor};

/// One normalized spreadsheet row; key order follows the sheet.
pub type Record = Map<String, Value>;

#[derive(Debug, Default)]
pub struct ConvertSummary {
    pub files: usize,
    pub rows: usize,
    pub annotated_rows: usize,
    pub outputs: Vec<PathBuf>,
}

/// Office lock files (`~$name.xlsx`) sit next to open workbooks.
pub(crate) fn is_lock_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or(false, |n| n.starts_with("~$"))
}

/// All files in `dir` with extension `ext` (case-insensitive), sorted.
pub(crate) fn files_with_extension(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/*.{}", Pattern::escape(&dir.to_string_lossy()), ext);
    let opts = MatchOptions {
        case_sensitive: false,
        ..Default::default()
    };
    let mut files: Vec<PathBuf> = glob_with(&pattern, opts)
        .with_context(|| format!("invalid glob pattern {}", pattern))?
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file() && !is_lock_file(p))
        .collect();
    files.sort();
    Ok(files)
}

/// Spreadsheets in `input` whose stem is in the catalog, in name order.
pub fn recognized_files(input: &Path, catalog: &Catalog) -> Result<Vec<(PathBuf, TableDescriptor)>> {
    let mut out = Vec::new();
    for path in files_with_extension(input, "xlsx")? {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match catalog.lookup(stem) {
            Some(desc) => out.push((path.clone(), *desc)),
            None => info!(file = %path.display(), "not in table catalog, skipping"),
        }
    }
    Ok(out)
}

/// Read, normalize and write one workbook; returns its records.
pub fn convert_file(path: &Path, desc: &TableDescriptor, output: &Path) -> Result<(PathBuf, Vec<Record>)> {
    let sheet = sheet::read_sheet(path, desc.sheet)?;
    let records = normalize::normalize_sheet(&sheet, desc);
    let out_path = output.join(desc.output_file());
    write_jsonl(&out_path, &records)?;
    Ok((out_path, records))
}

/// Convert every recognized workbook in `input` into `<output>/<table>.jsonl`.
///
/// With an annotator, text-bearing tables are also analyzed and the sentence
/// and token files are written once all workbooks are done.
#[instrument(level = "info", skip(catalog, annotator), fields(input = %input.display(), output = %output.display()))]
pub async fn convert_folder(
    input: &Path,
    output: &Path,
    catalog: &Catalog,
    mut annotator: Option<&mut Annotator<'_>>,
) -> Result<ConvertSummary> {
    let mut summary = ConvertSummary::default();
    if !input.is_dir() {
        warn!("input folder does not exist, nothing to convert");
        return Ok(summary);
    }

    let files = recognized_files(input, catalog)?;
    if files.is_empty() {
        warn!("no recognized spreadsheets found");
        return Ok(summary);
    }
    info!(count = files.len(), "converting spreadsheets");

    for (i, (path, desc)) in files.into_iter().enumerate() {
        // calamine is blocking; keep it off the async worker
        let (out_path, records) = tokio::task::spawn_blocking({
            let path = path.clone();
            let output = output.to_path_buf();
            move || convert_file(&path, &desc, &output)
        })
        .await
        .context("conversion task panicked")?
        .with_context(|| format!("converting {}", path.display()))?;

        info!(
            n = i + 1,
            file = %path.display(),
            table = desc.table,
            rows = records.len(),
            "converted"
        );
        summary.files += 1;
        summary.rows += records.len();
        summary.outputs.push(out_path);

        if let (Some(ann), Some(cols)) = (annotator.as_deref_mut(), desc.text) {
            ann.annotate_rows(&records, cols)
                .await
                .with_context(|| format!("annotating {}", path.display()))?;
            summary.annotated_rows += records.len();
        }
    }

    if let Some(ann) = annotator {
        if summary.annotated_rows > 0 {
            let (s, t) = ann.write(output)?;
            summary.outputs.push(s);
            summary.outputs.push(t);
        }
    }

    Ok(summary)
}
