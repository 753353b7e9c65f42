// src/tables.rs

/// Columns the annotator reads from a text-bearing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextColumns {
    pub id: &'static str,
    pub body: &'static str,
}

/// Date column rewritten from the dotted `YYYY.MM.DD.` form, plus a companion
/// time column forced to text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateFixup {
    pub date_column: &'static str,
    pub time_column: &'static str,
}

/// One spreadsheet file stem and the table it becomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDescriptor {
    pub stem: &'static str,
    pub table: &'static str,
    pub sheet: usize,
    pub text: Option<TextColumns>,
    pub date_fixup: Option<DateFixup>,
}

impl TableDescriptor {
    pub const fn new(stem: &'static str, table: &'static str) -> Self {
        Self {
            stem,
            table,
            sheet: 0,
            text: None,
            date_fixup: None,
        }
    }

    pub const fn sheet(mut self, index: usize) -> Self {
        self.sheet = index;
        self
    }

    pub const fn text(mut self, id: &'static str, body: &'static str) -> Self {
        self.text = Some(TextColumns { id, body });
        self
    }

    pub const fn date_fixup(mut self, date_column: &'static str, time_column: &'static str) -> Self {
        self.date_fixup = Some(DateFixup {
            date_column,
            time_column,
        });
        self
    }

    pub fn output_file(&self) -> String {
        format!("{}.jsonl", self.table)
    }
}

/// The CAP corpus tables.
const CAP_TABLES: [TableDescriptor; 7] = [
    TableDescriptor::new("CAP_CODE", "cap_kod"),
    TableDescriptor::new("text_jav", "felszolalas")
        .text("text_id", "text")
        .date_fixup("exact_date", "video_felszolalas_ido"),
    TableDescriptor::new("demo_kész", "kepviselo"),
    TableDescriptor::new("cycle_kész", "parlamenti_ciklus"),
    // the party workbook keeps the full names on its second sheet
    TableDescriptor::new("party_name_full_hun", "part").sheet(1),
    TableDescriptor::new("mondat", "mondat"),
    TableDescriptor::new("conll_szo", "conll_szo"),
];

/// Lookup from file stem to descriptor.
#[derive(Debug, Clone)]
pub struct Catalog {
    tables: Vec<TableDescriptor>,
}

impl Catalog {
    pub fn cap() -> Self {
        Self {
            tables: CAP_TABLES.to_vec(),
        }
    }

    /// Build a catalog from an explicit list. Later duplicates of a stem are
    /// ignored so every stem maps to exactly one table.
    pub fn new(tables: impl IntoIterator<Item = TableDescriptor>) -> Self {
        let mut out: Vec<TableDescriptor> = Vec::new();
        for t in tables {
            if !out.iter().any(|o| o.stem == t.stem) {
                out.push(t);
            }
        }
        Self { tables: out }
    }

    pub fn lookup(&self, stem: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.stem == stem)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.tables.iter()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::cap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_catalog_has_unique_stems() {
        let cat = Catalog::cap();
        assert_eq!(cat.len(), 7);
        for t in cat.iter() {
            assert_eq!(cat.iter().filter(|o| o.stem == t.stem).count(), 1);
        }
    }

    #[test]
    fn cap_rules() {
        let cat = Catalog::cap();
        assert_eq!(cat.lookup("party_name_full_hun").unwrap().sheet, 1);
        assert_eq!(cat.lookup("CAP_CODE").unwrap().sheet, 0);

        let text = cat.lookup("text_jav").unwrap();
        assert_eq!(text.table, "felszolalas");
        assert_eq!(text.text.unwrap().body, "text");
        assert_eq!(text.date_fixup.unwrap().date_column, "exact_date");
        assert_eq!(text.output_file(), "felszolalas.jsonl");

        assert_eq!(cat.lookup("demo_kész").unwrap().table, "kepviselo");
        assert!(cat.lookup("unknown").is_none());
    }

    #[test]
    fn explicit_catalog_keeps_first_stem() {
        let cat = Catalog::new([
            TableDescriptor::new("a", "ab"),
            TableDescriptor::new("a", "other"),
        ]);
        assert_eq!(cat.len(), 1);
        assert_eq!(cat.lookup("a").unwrap().table, "ab");
    }
}
