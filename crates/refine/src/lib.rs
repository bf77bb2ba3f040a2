//! Text refinement: unify fragments, then correct, resolve references and translate.

pub mod coref;
pub mod correct;
pub mod prompt;
pub mod translate;
pub mod unify;

pub use coref::CoreferenceResolver;
pub use correct::Corrector;
pub use prompt::UNRESOLVED_MARKER;
pub use translate::{Language, Translator};
pub use unify::{build_merger, LlmMerger, OverlapMerger, TranscriptMerger, TranscriptUnifier};

use anyhow::{Context, Result};
use common::{Artifact, ArtifactStore};
use extract::{ChatMessage, ChatModel, ResponseFormat};
use tracing::{info, warn};

/// Persist the empty output of a stage that received no text.
async fn persist_empty(store: &ArtifactStore, item_id: &str, artifact: Artifact) -> Result<String> {
    warn!(item_id, artifact = ?artifact, "Empty input, skipping refinement");
    store.write_text(item_id, artifact, "").await?;
    Ok(String::new())
}

/// One free-text model call whose reply becomes the stage's artifact.
async fn rewrite(
    model: &dyn ChatModel,
    store: &ArtifactStore,
    item_id: &str,
    artifact: Artifact,
    messages: &[ChatMessage],
) -> Result<String> {
    let reply = model
        .complete(messages, ResponseFormat::Text)
        .await
        .context(format!("{:?} request failed for item {}", artifact, item_id))?;
    let text = reply.trim().to_string();

    store.write_text(item_id, artifact, &text).await?;
    info!(item_id, artifact = ?artifact, characters = text.len(), "Refinement completed");
    Ok(text)
}
