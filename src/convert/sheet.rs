// src/convert/sheet.rs

use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook_auto, Data, Range, Reader};
use std::path::Path;

/// One worksheet: the first row as headers, the rest as cells.
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Data>>,
}

impl Sheet {
    /// Split a range into header row and data rows. Rows with no value in any
    /// cell (trailing formatted rows, mostly) are skipped.
    pub fn from_range(name: impl Into<String>, range: &Range<Data>) -> Self {
        let mut rows = range.rows();
        let headers: Vec<String> = rows
            .next()
            .map(|r| r.iter().map(header_text).collect())
            .unwrap_or_default();

        let data: Vec<Vec<Data>> = rows
            .filter(|r| r.iter().any(|c| !matches!(c, Data::Empty)))
            .map(|r| r.to_vec())
            .collect();

        Self {
            name: name.into(),
            headers,
            rows: data,
        }
    }
}

/// Names of every worksheet, in workbook order.
pub fn sheet_names(path: &Path) -> Result<Vec<String>> {
    let workbook = open_workbook_auto(path)
        .with_context(|| format!("opening workbook {}", path.display()))?;
    Ok(workbook.sheet_names())
}

/// Read worksheet number `index` (0-based) of the workbook at `path`.
pub fn read_sheet(path: &Path, index: usize) -> Result<Sheet> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("opening workbook {}", path.display()))?;
    let names = workbook.sheet_names();
    let name = names.get(index).cloned().ok_or_else(|| {
        anyhow!(
            "{} has {} worksheet(s), no sheet at index {}",
            path.display(),
            names.len(),
            index
        )
    })?;
    let range = workbook
        .worksheet_range(&name)
        .with_context(|| format!("reading sheet `{}` of {}", name, path.display()))?;
    Ok(Sheet::from_range(name, &range))
}

/// Header cells as text; an empty header stays empty so the column is later
/// treated as unnamed.
fn header_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.is_finite() => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
    }
}
