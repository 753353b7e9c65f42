// src/nlp/conllu.rs
//! Reader for the CoNLL-U output of UD taggers.
//!
//! Only the columns the annotator stores are kept. Multiword range lines
//! (`3-4`) and empty nodes (`5.1`) are skipped so every kept line is a
//! surface token.

use anyhow::{bail, Result};

use super::{AnalyzedSentence, AnalyzedToken};

fn field(raw: &str) -> String {
    if raw == "_" {
        String::new()
    } else {
        raw.to_string()
    }
}

/// `NE=B-PER` in MISC becomes `B PER`; no annotation means `O`.
fn entity_from_misc(misc: &str) -> String {
    misc.split('|')
        .find_map(|kv| kv.strip_prefix("NE="))
        .map(|ne| match ne.split_once('-') {
            Some((iob, ty)) => format!("{} {}", iob, ty),
            None => ne.to_string(),
        })
        .unwrap_or_else(|| "O".to_string())
}

fn space_after(misc: &str) -> bool {
    !misc.split('|').any(|kv| kv == "SpaceAfter=No")
}

#[derive(Default)]
struct Pending {
    text: Option<String>,
    rebuilt: String,
    tokens: Vec<AnalyzedToken>,
}

impl Pending {
    fn finish(self) -> Option<AnalyzedSentence> {
        if self.tokens.is_empty() {
            return None;
        }
        let text = self
            .text
            .unwrap_or_else(|| self.rebuilt.trim_end().to_string());
        Some(AnalyzedSentence {
            text,
            tokens: self.tokens,
        })
    }
}

/// Parse a CoNLL-U document into sentences.
pub fn parse(doc: &str) -> Result<Vec<AnalyzedSentence>> {
    let mut out = Vec::new();
    let mut cur = Pending::default();

    for (lineno, line) in doc.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            if let Some(s) = std::mem::take(&mut cur).finish() {
                out.push(s);
            }
            continue;
        }
        if let Some(comment) = line.strip_prefix('#') {
            if let Some(text) = comment.trim_start().strip_prefix("text =") {
                cur.text = Some(text.trim().to_string());
            }
            continue;
        }

        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() != 10 {
            bail!(
                "CoNLL-U line {} has {} columns, expected 10",
                lineno + 1,
                cols.len()
            );
        }
        if cols[0].contains('-') || cols[0].contains('.') {
            continue;
        }

        cur.rebuilt.push_str(cols[1]);
        if space_after(cols[9]) {
            cur.rebuilt.push(' ');
        }
        cur.tokens.push(AnalyzedToken {
            form: cols[1].to_string(),
            lemma: field(cols[2]),
            entity: entity_from_misc(cols[9]),
            pos: field(cols[3]),
            morph: field(cols[5]),
            dep: field(cols[7]),
        });
    }
    if let Some(s) = cur.finish() {
        out.push(s);
    }
    Ok(out)
}
