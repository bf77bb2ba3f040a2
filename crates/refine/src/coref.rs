use anyhow::Result;
use common::{Artifact, ArtifactStore, ItemRecord};
use extract::ChatModel;
use std::sync::Arc;
use tracing::warn;

use crate::prompt;

/// Replaces pronouns and vague referents with full names, using the item's
/// title and description as context.
pub struct CoreferenceResolver {
    model: Arc<dyn ChatModel>,
    store: ArtifactStore,
}

impl CoreferenceResolver {
    pub fn new(model: Arc<dyn ChatModel>, store: ArtifactStore) -> Self {
        Self { model, store }
    }

    pub async fn resolve(&self, item_id: &str, text: &str) -> Result<String> {
        if text.trim().is_empty() {
            return crate::persist_empty(&self.store, item_id, Artifact::Coreference).await;
        }

        let record = match self.store.read_metadata(item_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(item_id, "No metadata for item, resolving without context");
                ItemRecord::default()
            }
            Err(e) => {
                warn!(item_id, error = %e, "Unreadable metadata, resolving without context");
                ItemRecord::default()
            }
        };

        let messages = prompt::build_coreference_messages(&record.title, &record.description, text);
        crate::rewrite(self.model.as_ref(), &self.store, item_id, Artifact::Coreference, &messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedChat;

    #[tokio::test]
    async fn test_metadata_is_used_as_context() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        store
            .write_metadata(&ItemRecord::new("vid", "Silvia García, ceramist", "An interview"))
            .await
            .unwrap();
        let chat = Arc::new(ScriptedChat::new(&["Silvia García married Rogelio."]));
        let resolver = CoreferenceResolver::new(chat.clone(), store.clone());

        let resolved = resolver.resolve("vid", "She married Rogelio.").await.unwrap();

        assert_eq!(resolved, "Silvia García married Rogelio.");
        let requests = chat.requests.lock().unwrap();
        assert!(requests[0][1].content.contains("TITLE: Silvia García, ceramist"));
        assert!(requests[0][0].content.contains(crate::UNRESOLVED_MARKER));
        assert_eq!(
            store.read_text("vid", Artifact::Coreference).await.unwrap().as_deref(),
            Some("Silvia García married Rogelio.")
        );
    }

    #[tokio::test]
    async fn test_missing_metadata_still_resolves() {
        let tmp = tempfile::tempdir().unwrap();
        let chat = Arc::new(ScriptedChat::new(&["[unresolved reference] married Rogelio."]));
        let resolver = CoreferenceResolver::new(chat.clone(), ArtifactStore::new(tmp.path()));

        let resolved = resolver.resolve("vid", "She married Rogelio.").await.unwrap();

        assert!(resolved.starts_with(crate::UNRESOLVED_MARKER));
        assert!(chat.requests.lock().unwrap()[0][1].content.contains("TITLE: \n"));
    }
}
