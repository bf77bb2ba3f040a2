use anyhow::{Context, Result};
use async_trait::async_trait;
use common::config::{UnifyConfig, UnifyStrategy};
use common::{Artifact, ArtifactStore};
use extract::{ChatModel, ResponseFormat};
use std::sync::Arc;
use tracing::{debug, info};
use unicode_segmentation::UnicodeSegmentation;

use crate::prompt;

/// Merges the next transcript fragment into the text unified so far.
#[async_trait]
pub trait TranscriptMerger: Send + Sync {
    async fn merge(&self, unified: &str, next: &str) -> Result<String>;
}

/// Word with its byte span in the source text.
struct WordSpan<'a> {
    start: usize,
    end: usize,
    word: &'a str,
}

fn word_spans(text: &str) -> Vec<WordSpan<'_>> {
    text.split_word_bound_indices()
        .filter(|(_, w)| w.chars().any(char::is_alphanumeric))
        .map(|(start, word)| WordSpan {
            start,
            end: start + word.len(),
            word,
        })
        .collect()
}

/// Part of `next` left after removing the longest run of at least
/// `min_words` words that ends `unified` and starts `next`. Punctuation
/// following the run is kept so `join` can carry it over.
/// Words compare case-insensitively; returns `next` untouched when no such run exists.
pub fn drop_overlap<'a>(unified: &str, next: &'a str, min_words: usize) -> &'a str {
    let tail = word_spans(unified);
    let head = word_spans(next);
    let min_words = min_words.max(1);
    let max_k = tail.len().min(head.len());

    for k in (min_words..=max_k).rev() {
        let tail_words = &tail[tail.len() - k..];
        let head_words = &head[..k];
        let matches = tail_words
            .iter()
            .zip(head_words)
            .all(|(a, b)| a.word.to_lowercase() == b.word.to_lowercase());
        if matches {
            let rest = &next[head_words[k - 1].end..];
            return rest.trim_start();
        }
    }

    // no overlap: keep the fragment from its first word
    match head.first() {
        Some(first) => &next[first.start..],
        None => "",
    }
}

const BOUNDARY_MARKS: [char; 7] = ['.', '!', '?', ',', ';', ':', '…'];

/// Append with a single space, capitalising a lowercase start after a sentence end.
/// Punctuation leading `addition` closes `unified` unless it already ends with some.
fn join(unified: &str, addition: &str) -> String {
    let unified = unified.trim_end();
    let addition = addition.trim();
    let body = addition.trim_start_matches(BOUNDARY_MARKS);
    let marks = &addition[..addition.len() - body.len()];
    let body = body.trim_start();

    let mut joined = String::with_capacity(unified.len() + addition.len() + 1);
    joined.push_str(unified);
    if !unified.is_empty() && !unified.ends_with(BOUNDARY_MARKS) {
        joined.push_str(marks);
    }
    if body.is_empty() {
        return joined;
    }
    if joined.is_empty() {
        joined.push_str(body);
        return joined;
    }
    joined.push(' ');

    let ends_sentence = joined.trim_end().ends_with(['.', '!', '?', '…']);
    let mut chars = body.chars();
    match chars.next() {
        Some(first) if ends_sentence && first.is_lowercase() => {
            joined.extend(first.to_uppercase());
            joined.push_str(chars.as_str());
        }
        _ => joined.push_str(body),
    }
    joined
}

/// Deterministic merge: drop the exact word overlap, append the rest.
#[derive(Debug, Clone)]
pub struct OverlapMerger {
    min_overlap_words: usize,
}

impl OverlapMerger {
    pub fn new(min_overlap_words: usize) -> Self {
        Self { min_overlap_words }
    }
}

#[async_trait]
impl TranscriptMerger for OverlapMerger {
    async fn merge(&self, unified: &str, next: &str) -> Result<String> {
        let rest = drop_overlap(unified, next, self.min_overlap_words);
        Ok(join(unified, rest))
    }
}

/// Drops the exact overlap, then lets the language model stitch what remains.
pub struct LlmMerger {
    model: Arc<dyn ChatModel>,
    min_overlap_words: usize,
}

impl LlmMerger {
    pub fn new(model: Arc<dyn ChatModel>, min_overlap_words: usize) -> Self {
        Self {
            model,
            min_overlap_words,
        }
    }
}

#[async_trait]
impl TranscriptMerger for LlmMerger {
    async fn merge(&self, unified: &str, next: &str) -> Result<String> {
        let rest = drop_overlap(unified, next, self.min_overlap_words);
        if !rest.chars().any(char::is_alphanumeric) {
            debug!("Fragment fully contained in overlap, skipping model");
            return Ok(join(unified, rest));
        }

        let messages = prompt::build_unify_messages(unified, rest);
        let reply = self
            .model
            .complete(&messages, ResponseFormat::Text)
            .await
            .context("Transcript merge request failed")?;

        let merged = reply.trim();
        if merged.is_empty() {
            anyhow::bail!("Transcript merge returned empty text");
        }
        Ok(merged.to_string())
    }
}

/// Pick the configured merge strategy.
pub fn build_merger(config: &UnifyConfig, model: Arc<dyn ChatModel>) -> Arc<dyn TranscriptMerger> {
    match config.strategy {
        UnifyStrategy::Llm => Arc::new(LlmMerger::new(model, config.min_overlap_words)),
        UnifyStrategy::Overlap => Arc::new(OverlapMerger::new(config.min_overlap_words)),
    }
}

/// Folds ordered segment transcripts into one transcript per item.
pub struct TranscriptUnifier {
    merger: Arc<dyn TranscriptMerger>,
    store: ArtifactStore,
}

impl TranscriptUnifier {
    pub fn new(merger: Arc<dyn TranscriptMerger>, store: ArtifactStore) -> Self {
        Self { merger, store }
    }

    /// Left fold over `transcripts`; silent (empty) fragments are skipped and
    /// the first non-empty one is taken verbatim.
    pub async fn unify(&self, item_id: &str, transcripts: &[String]) -> Result<String> {
        let mut fragments = transcripts.iter().filter(|t| !t.trim().is_empty());

        let mut unified = match fragments.next() {
            Some(first) => first.clone(),
            None => String::new(),
        };

        for (step, fragment) in fragments.enumerate() {
            unified = self
                .merger
                .merge(&unified, fragment)
                .await
                .context(format!("Failed to merge fragment {} of item {}", step + 1, item_id))?;
            debug!(item_id, step = step + 1, characters = unified.len(), "Fragment merged");
        }

        self.store
            .write_text(item_id, Artifact::Unified, &unified)
            .await?;

        info!(
            item_id,
            fragments = transcripts.len(),
            characters = unified.len(),
            "Transcripts unified"
        );
        Ok(unified)
    }
}
