// src/nlp/segmenter.rs

use anyhow::Result;
use async_trait::async_trait;
use unicode_segmentation::UnicodeSegmentation;

use super::{AnalyzedSentence, AnalyzedToken, LanguageModel};

/// Offline model: Unicode sentence and word boundaries, no tagger.
///
/// Lemmas are lowercased forms; POS is `PUNCT`, `NUM` or `X`; no entities,
/// morphology or dependencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmenterModel;

fn coarse_pos(word: &str) -> &'static str {
    if word.chars().all(|c| !c.is_alphanumeric()) {
        "PUNCT"
    } else if word.chars().all(|c| c.is_numeric() || c == '.' || c == ',') {
        "NUM"
    } else {
        "X"
    }
}

fn tokenize(sentence: &str) -> Vec<AnalyzedToken> {
    sentence
        .split_word_bounds()
        .filter(|w| !w.trim().is_empty())
        .map(|w| AnalyzedToken {
            form: w.to_string(),
            lemma: w.to_lowercase(),
            entity: "O".to_string(),
            pos: coarse_pos(w).to_string(),
            morph: String::new(),
            dep: String::new(),
        })
        .collect()
}

#[async_trait]
impl LanguageModel for SegmenterModel {
    fn name(&self) -> &str {
        "unicode-segmenter"
    }

    async fn analyze(&self, text: &str) -> Result<Vec<AnalyzedSentence>> {
        Ok(text
            .split_sentence_bounds()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| AnalyzedSentence {
                text: s.to_string(),
                tokens: tokenize(s),
            })
            .filter(|s| !s.tokens.is_empty())
            .collect())
    }
}
