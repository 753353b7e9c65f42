// src/nlp/mod.rs

pub mod conllu;
pub mod segmenter;
pub mod udpipe;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use crate::config::{NlpBackend, NlpSettings};
use crate::convert::Record;
use crate::jsonl::write_jsonl;
use crate::tables::TextColumns;

pub use segmenter::SegmenterModel;
pub use udpipe::UdpipeModel;

/// Sentence output, written as `mondat.jsonl`.
pub const SENTENCE_FILE: &str = "mondat.jsonl";
/// Token output, written as `conll_szo.jsonl`.
pub const TOKEN_FILE: &str = "conll_szo.jsonl";

/// One token as the model sees it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnalyzedToken {
    pub form: String,
    pub lemma: String,
    /// IOB marker and entity type joined by a space, e.g. `B PER` or `O`.
    pub entity: String,
    pub pos: String,
    /// `Feature=Value|...` as in CoNLL-U FEATS.
    pub morph: String,
    pub dep: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnalyzedSentence {
    pub text: String,
    pub tokens: Vec<AnalyzedToken>,
}

/// Sentence splitting, tokenization and tagging of free text.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    /// Sentences in document order, tokens in sentence order.
    async fn analyze(&self, text: &str) -> Result<Vec<AnalyzedSentence>>;
}

/// Build the configured model. A model that cannot be reached or is not
/// served is an error.
pub async fn load_model(settings: &NlpSettings) -> Result<Box<dyn LanguageModel>> {
    match settings.backend {
        NlpBackend::Udpipe => {
            let model = UdpipeModel::connect(settings.endpoint.clone(), &settings.model)
                .await
                .with_context(|| format!("loading UDPipe model `{}`", settings.model))?;
            Ok(Box::new(model))
        }
        NlpBackend::Segmenter => Ok(Box::new(SegmenterModel)),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceRecord {
    #[serde(rename = "mondat_id")]
    pub sentence_id: u64,
    pub raw_text: String,
    #[serde(rename = "text_id")]
    pub source_text_id: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    #[serde(rename = "szo_id")]
    pub token_id: u64,
    #[serde(rename = "szoalak")]
    pub surface_form: String,
    pub lemma: String,
    #[serde(rename = "entity_IOB")]
    pub entity_tag: String,
    #[serde(rename = "POS")]
    pub part_of_speech: String,
    #[serde(rename = "morf_analysis")]
    pub morphology: String,
    #[serde(rename = "dependencia_el")]
    pub dependency_relation: String,
    #[serde(rename = "mondat_id")]
    pub sentence_id: u64,
}

/// Runs the model over rows and numbers sentences and tokens across the whole
/// run. Ids start at 1 and never reset, so several tables can feed the same
/// annotator and still share one id space.
pub struct Annotator<'m> {
    model: &'m dyn LanguageModel,
    next_sentence_id: u64,
    next_token_id: u64,
    rows: usize,
    sentences: Vec<SentenceRecord>,
    tokens: Vec<TokenRecord>,
}

impl<'m> Annotator<'m> {
    pub fn new(model: &'m dyn LanguageModel) -> Self {
        Self {
            model,
            next_sentence_id: 1,
            next_token_id: 1,
            rows: 0,
            sentences: Vec::new(),
            tokens: Vec::new(),
        }
    }

    /// Analyze `text` and append its sentences and tokens.
    pub async fn annotate_text(&mut self, text_id: &Value, text: &str) -> Result<()> {
        self.rows += 1;
        if text.trim().is_empty() {
            return Ok(());
        }
        let analyzed = self.model.analyze(text).await?;

        for sentence in analyzed {
            let sentence_id = self.next_sentence_id;
            self.next_sentence_id += 1;
            self.sentences.push(SentenceRecord {
                sentence_id,
                raw_text: sentence.text,
                source_text_id: text_id.clone(),
            });

            for tok in sentence.tokens {
                self.tokens.push(TokenRecord {
                    token_id: self.next_token_id,
                    surface_form: tok.form,
                    lemma: tok.lemma,
                    entity_tag: tok.entity,
                    part_of_speech: tok.pos,
                    morphology: tok.morph,
                    dependency_relation: tok.dep,
                    sentence_id,
                });
                self.next_token_id += 1;
            }
        }
        Ok(())
    }

    /// Annotate every row of a text-bearing table, in row order.
    #[instrument(level = "info", skip_all, fields(model = self.model.name(), rows = rows.len()))]
    pub async fn annotate_rows(&mut self, rows: &[Record], cols: TextColumns) -> Result<()> {
        let Some(first) = rows.first() else {
            return Ok(());
        };
        for col in [cols.id, cols.body] {
            if !first.contains_key(col) {
                bail!("text table has no `{}` column", col);
            }
        }

        for (idx, row) in rows.iter().enumerate() {
            let text_id = row.get(cols.id).cloned().unwrap_or(Value::Null);
            let text = match row.get(cols.body) {
                Some(Value::String(s)) => s.as_str(),
                _ => "",
            };
            self.annotate_text(&text_id, text)
                .await
                .with_context(|| format!("analyzing row {} (text_id {})", idx, text_id))?;

            if (idx + 1) % 500 == 0 {
                debug!(done = idx + 1, total = rows.len(), "annotation progress");
            }
        }
        info!(
            sentences = self.sentences.len(),
            tokens = self.tokens.len(),
            "annotated rows"
        );
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn sentences(&self) -> &[SentenceRecord] {
        &self.sentences
    }

    pub fn tokens(&self) -> &[TokenRecord] {
        &self.tokens
    }

    /// Write `mondat.jsonl` and `conll_szo.jsonl` into `dir`.
    pub fn write(&self, dir: &Path) -> Result<(PathBuf, PathBuf)> {
        let sentences = dir.join(SENTENCE_FILE);
        let tokens = dir.join(TOKEN_FILE);
        write_jsonl(&sentences, &self.sentences)?;
        write_jsonl(&tokens, &self.tokens)?;
        info!(
            sentences = %sentences.display(),
            tokens = %tokens.display(),
            "wrote annotations"
        );
        Ok((sentences, tokens))
    }
}

/// Problems found by [`check_integrity`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub sentence_gaps: usize,
    pub token_gaps: usize,
    pub dangling_tokens: usize,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        *self == IntegrityReport::default()
    }
}

/// Check that ids run 1, 2, 3, ... and every token points at a sentence.
pub fn check_integrity(sentences: &[SentenceRecord], tokens: &[TokenRecord]) -> IntegrityReport {
    let mut report = IntegrityReport::default();
    for (i, s) in sentences.iter().enumerate() {
        if s.sentence_id != i as u64 + 1 {
            report.sentence_gaps += 1;
        }
    }
    for (i, t) in tokens.iter().enumerate() {
        if t.token_id != i as u64 + 1 {
            report.token_gaps += 1;
        }
    }
    let ids: std::collections::HashSet<u64> = sentences.iter().map(|s| s.sentence_id).collect();
    report.dangling_tokens = tokens
        .iter()
        .filter(|t| !ids.contains(&t.sentence_id))
        .count();
    report
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use tempfile::tempdir;

    /// Splits on `.` into sentences and on spaces into tokens.
    pub(crate) struct DotModel;

    #[async_trait]
    impl LanguageModel for DotModel {
        fn name(&self) -> &str {
            "dot"
        }

        async fn analyze(&self, text: &str) -> Result<Vec<AnalyzedSentence>> {
            Ok(text
                .split('.')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| AnalyzedSentence {
                    text: format!("{}.", s),
                    tokens: s
                        .split_whitespace()
                        .map(|w| AnalyzedToken {
                            form: w.to_string(),
                            lemma: w.to_lowercase(),
                            entity: "O".into(),
                            pos: "X".into(),
                            ..Default::default()
                        })
                        .collect(),
                })
                .collect())
        }
    }

    fn row(id: i64, text: &str) -> Record {
        let mut r = Record::new();
        r.insert("text_id".into(), json!(id));
        r.insert("text".into(), json!(text));
        r
    }

    const COLS: TextColumns = TextColumns {
        id: "text_id",
        body: "text",
    };

    #[tokio::test]
    async fn ids_are_global_and_tokens_point_at_their_sentence() -> Result<()> {
        let model = DotModel;
        let mut ann = Annotator::new(&model);
        // row 1: 2 sentences / 5 tokens, row 2: 1 sentence / 3 tokens
        let rows = vec![row(10, "a b c. d e."), row(20, "f g h.")];
        ann.annotate_rows(&rows, COLS).await?;

        let sids: Vec<u64> = ann.sentences().iter().map(|s| s.sentence_id).collect();
        assert_eq!(sids, vec![1, 2, 3]);
        let tids: Vec<u64> = ann.tokens().iter().map(|t| t.token_id).collect();
        assert_eq!(tids, (1..=8).collect::<Vec<_>>());

        let refs: Vec<u64> = ann.tokens().iter().map(|t| t.sentence_id).collect();
        assert_eq!(refs, vec![1, 1, 1, 2, 2, 3, 3, 3]);
        assert_eq!(ann.tokens()[3].surface_form, "d");

        // every token's sentence belongs to the row the token came from
        let by_id: HashMap<u64, &SentenceRecord> =
            ann.sentences().iter().map(|s| (s.sentence_id, s)).collect();
        assert_eq!(by_id[&ann.tokens()[4].sentence_id].source_text_id, json!(10));
        assert_eq!(by_id[&ann.tokens()[5].sentence_id].source_text_id, json!(20));

        assert!(check_integrity(ann.sentences(), ann.tokens()).is_clean());
        Ok(())
    }

    #[tokio::test]
    async fn numbering_continues_across_tables() -> Result<()> {
        let model = DotModel;
        let mut ann = Annotator::new(&model);
        ann.annotate_rows(&[row(1, "x y.")], COLS).await?;
        ann.annotate_rows(&[row(2, "z.")], COLS).await?;

        assert_eq!(ann.sentences()[1].sentence_id, 2);
        assert_eq!(ann.tokens()[2].token_id, 3);
        assert_eq!(ann.tokens()[2].sentence_id, 2);
        Ok(())
    }

    #[tokio::test]
    async fn empty_and_null_text_yield_nothing() -> Result<()> {
        let model = DotModel;
        let mut ann = Annotator::new(&model);
        let mut null_row = row(2, "");
        null_row.insert("text".into(), Value::Null);
        ann.annotate_rows(&[row(1, "  "), null_row, row(3, "q.")], COLS)
            .await?;

        assert_eq!(ann.rows(), 3);
        assert_eq!(ann.sentences().len(), 1);
        assert_eq!(ann.sentences()[0].sentence_id, 1);
        assert_eq!(ann.sentences()[0].source_text_id, json!(3));
        Ok(())
    }

    #[tokio::test]
    async fn missing_text_column_is_an_error() {
        let model = DotModel;
        let mut ann = Annotator::new(&model);
        let mut r = Record::new();
        r.insert("text_id".into(), json!(1));
        assert!(ann.annotate_rows(&[r], COLS).await.is_err());
    }

    #[tokio::test]
    async fn writes_both_files_with_source_field_names() -> Result<()> {
        let model = DotModel;
        let mut ann = Annotator::new(&model);
        ann.annotate_rows(&[row(7, "Jó napot.")], COLS).await?;

        let dir = tempdir()?;
        let (s_path, t_path) = ann.write(dir.path())?;
        let s_lines: Vec<Value> = crate::jsonl::read_jsonl(&s_path)?;
        let t_lines: Vec<Value> = crate::jsonl::read_jsonl(&t_path)?;

        assert_eq!(
            s_lines[0],
            json!({"mondat_id": 1, "raw_text": "Jó napot.", "text_id": 7})
        );
        assert_eq!(t_lines.len(), 2);
        assert_eq!(t_lines[1]["szo_id"], json!(2));
        assert_eq!(t_lines[1]["szoalak"], json!("napot"));
        assert_eq!(t_lines[1]["mondat_id"], json!(1));
        assert!(t_lines[1].get("entity_IOB").is_some());
        Ok(())
    }

    /// Answers every text with fixed CoNLL-U, as a service with a
    /// named-entity stage would.
    struct TaggedService(&'static str);

    #[async_trait]
    impl LanguageModel for TaggedService {
        fn name(&self) -> &str {
            "tagged"
        }

        async fn analyze(&self, _text: &str) -> Result<Vec<AnalyzedSentence>> {
            conllu::parse(self.0)
        }
    }

    #[tokio::test]
    async fn entity_tags_come_only_from_ne_annotations() -> Result<()> {
        let tagged = TaggedService(
            "1\tOrbán\tOrbán\tPROPN\t_\t_\t3\tnsubj\t_\tNE=B-PER\n\
             2\tViktor\tViktor\tPROPN\t_\t_\t1\tflat:name\t_\tNE=I-PER\n\
             3\tszólt\tszól\tVERB\t_\t_\t0\troot\t_\tSpaceAfter=No\n",
        );
        let mut ann = Annotator::new(&tagged);
        ann.annotate_rows(&[row(1, "Orbán Viktor szólt")], COLS).await?;
        let tags: Vec<&str> = ann.tokens().iter().map(|t| t.entity_tag.as_str()).collect();
        assert_eq!(tags, vec!["B PER", "I PER", "O"]);

        // plain UDPipe output carries no NE= entries
        let untagged = TaggedService("1\tOrbán\tOrbán\tPROPN\t_\t_\t0\troot\t_\t_\n");
        let mut ann = Annotator::new(&untagged);
        ann.annotate_rows(&[row(1, "Orbán")], COLS).await?;
        assert_eq!(ann.tokens()[0].entity_tag, "O");

        let offline = segmenter::SegmenterModel;
        let mut ann = Annotator::new(&offline);
        ann.annotate_rows(&[row(1, "Orbán Viktor szólt.")], COLS).await?;
        assert!(ann.tokens().iter().all(|t| t.entity_tag == "O"));
        Ok(())
    }

    #[test]
    fn integrity_check_finds_dangling_tokens() {
        let s = vec![SentenceRecord {
            sentence_id: 1,
            raw_text: "a".into(),
            source_text_id: json!(1),
        }];
        let t = vec![TokenRecord {
            token_id: 1,
            surface_form: "a".into(),
            lemma: "a".into(),
            entity_tag: "O".into(),
            part_of_speech: "X".into(),
            morphology: String::new(),
            dependency_relation: String::new(),
            sentence_id: 0,
        }];
        let report = check_integrity(&s, &t);
        assert_eq!(report.dangling_tokens, 1);
        assert!(!report.is_clean());
    }
}
