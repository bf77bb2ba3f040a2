use anyhow::{Context, Result};
use common::config::RefineConfig;
use common::{Artifact, ArtifactStore, PipelineError};
use extract::{ChatModel, ResponseFormat};
use std::sync::Arc;
use tracing::{debug, info};

use crate::prompt;

/// Outcome of language detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Language {
    /// Already in the target language
    Target,
    /// The dialect that gets translated
    Dialect,
    Other(String),
}

/// Lowercase and strip surrounding whitespace, quotes and punctuation.
fn normalize_label(reply: &str) -> String {
    reply
        .trim()
        .trim_matches(|c: char| {
            c.is_whitespace() || matches!(c, '"' | '\'' | '`' | '«' | '»' | '.' | ',' | ';' | ':' | '!')
        })
        .to_lowercase()
}

/// Classifies the text's language, then translates dialect text into the
/// target language. Target-language text passes through untouched.
pub struct Translator {
    model: Arc<dyn ChatModel>,
    store: ArtifactStore,
    target_language: String,
    source_dialect: String,
}

impl Translator {
    pub fn new(model: Arc<dyn ChatModel>, store: ArtifactStore, config: &RefineConfig) -> Self {
        Self {
            model,
            store,
            target_language: config.target_language.to_lowercase(),
            source_dialect: config.source_dialect.to_lowercase(),
        }
    }

    pub async fn detect(&self, text: &str) -> Result<Language> {
        let labels = [self.source_dialect.as_str(), self.target_language.as_str(), "other"];
        let messages = prompt::build_language_detection_messages(&labels, text);
        let reply = self
            .model
            .complete(&messages, ResponseFormat::Text)
            .await
            .context("Language detection request failed")?;

        let label = normalize_label(&reply);
        debug!(label = %label, "Language detected");
        Ok(if label == self.target_language {
            Language::Target
        } else if label == self.source_dialect {
            Language::Dialect
        } else {
            Language::Other(label)
        })
    }

    pub async fn translate(&self, item_id: &str, text: &str) -> Result<String> {
        if text.trim().is_empty() {
            return crate::persist_empty(&self.store, item_id, Artifact::Translated).await;
        }

        match self
            .detect(text)
            .await
            .context(format!("Cannot translate item {}", item_id))?
        {
            Language::Target => {
                info!(item_id, language = %self.target_language, "Text already in target language");
                self.store
                    .write_text(item_id, Artifact::Translated, text)
                    .await?;
                Ok(text.to_string())
            }
            Language::Dialect => {
                info!(item_id, from = %self.source_dialect, to = %self.target_language, "Translating");
                let messages =
                    prompt::build_translation_messages(&self.source_dialect, &self.target_language, text);
                crate::rewrite(self.model.as_ref(), &self.store, item_id, Artifact::Translated, &messages).await
            }
            Language::Other(label) => Err(anyhow::Error::from(PipelineError::UnsupportedLanguage(label))
                .context(format!("Cannot translate item {}", item_id))),
        }
    }
}
