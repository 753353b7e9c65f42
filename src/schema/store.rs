// src/schema/store.rs

use anyhow::{bail, Context, Result};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use super::FieldDescriptor;

/// Folder of `<table>.json` schema descriptions.
#[derive(Debug, Clone)]
pub struct SchemaStore {
    dir: PathBuf,
}

impl SchemaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.json", table))
    }

    /// Fields for `table`, or `None` when no description file exists and the
    /// schema should be auto-detected. A file that exists but does not parse
    /// is an error.
    pub fn fields(&self, table: &str) -> Result<Option<Vec<FieldDescriptor>>> {
        let path = self.path_for(table);
        if !path.is_file() {
            return Ok(None);
        }
        load_fields(&path).map(Some)
    }
}

/// Parse one schema description file.
pub fn load_fields(path: &Path) -> Result<Vec<FieldDescriptor>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading schema {}", path.display()))?;
    let fields: Vec<FieldDescriptor> = serde_json::from_str(&text)
        .with_context(|| format!("parsing schema {}", path.display()))?;

    if fields.is_empty() {
        bail!("schema {} lists no fields", path.display());
    }
    let mut seen = HashSet::new();
    for f in &fields {
        if !seen.insert(f.name.to_lowercase()) {
            bail!("schema {} lists `{}` twice", path.display(), f.name);
        }
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldMode, FieldType};
    use tempfile::tempdir;

    #[test]
    fn loads_fields_in_order() -> Result<()> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join("mondat.json"),
            r#"[
                {"name": "mondat_id", "type": "INTEGER", "mode": "REQUIRED"},
                {"name": "raw_text", "type": "STRING", "mode": "NULLABLE"},
                {"name": "text_id", "type": "STRING"}
            ]"#,
        )?;
        let store = SchemaStore::new(dir.path());
        let fields = store.fields("mondat")?.expect("schema present");

        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].name, "mondat_id");
        assert_eq!(fields[0].ty, FieldType::Integer);
        assert_eq!(fields[0].mode, FieldMode::Required);
        assert_eq!(fields[2].mode, FieldMode::Nullable);
        Ok(())
    }

    #[test]
    fn missing_file_means_autodetect() -> Result<()> {
        let dir = tempdir()?;
        assert!(SchemaStore::new(dir.path()).fields("cap_kod")?.is_none());
        Ok(())
    }

    #[test]
    fn standard_sql_aliases() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("t.json");
        fs::write(
            &path,
            r#"[{"name":"a","type":"INT64"},{"name":"b","type":"BOOL"},{"name":"c","type":"FLOAT64"}]"#,
        )?;
        let fields = load_fields(&path)?;
        assert_eq!(fields[0].ty, FieldType::Integer);
        assert_eq!(fields[1].ty, FieldType::Boolean);
        assert_eq!(fields[2].ty.sql_name(), "FLOAT64");
        Ok(())
    }

    #[test]
    fn malformed_files_are_errors() -> Result<()> {
        let dir = tempdir()?;
        let store = SchemaStore::new(dir.path());

        fs::write(store.path_for("bad_type"), r#"[{"name":"a","type":"BLOB"}]"#)?;
        assert!(store.fields("bad_type").is_err());

        fs::write(store.path_for("dup"), r#"[{"name":"a","type":"STRING"},{"name":"A","type":"STRING"}]"#)?;
        assert!(store.fields("dup").is_err());

        fs::write(store.path_for("empty"), "[]")?;
        assert!(store.fields("empty").is_err());
        Ok(())
    }
}
