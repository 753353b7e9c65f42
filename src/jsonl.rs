// src/jsonl.rs

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs::{self, File},
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};
use tempfile::NamedTempFile;

/// Write `records` to `path`, one JSON object per line.
///
/// The file is written next to its destination and renamed into place, so a
/// failed run never leaves a half-written table behind. Quotes, backslashes
/// and control characters inside strings are escaped by `serde_json`.
pub fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<usize> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    {
        let mut w = BufWriter::new(tmp.as_file());
        for (i, rec) in records.iter().enumerate() {
            serde_json::to_writer(&mut w, rec)
                .with_context(|| format!("serializing record {} for {}", i, path.display()))?;
            w.write_all(b"\n")?;
        }
        w.flush()
            .with_context(|| format!("flushing {}", path.display()))?;
    }
    tmp.persist(path)
        .with_context(|| format!("renaming temp file onto {}", path.display()))?;

    Ok(records.len())
}

/// Read every non-blank line of `path` as a `T`.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut out = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("reading {} line {}", path.display(), idx + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let rec = serde_json::from_str(&line)
            .with_context(|| format!("parsing {} line {}", path.display(), idx + 1))?;
        out.push(rec);
    }
    Ok(out)
}
