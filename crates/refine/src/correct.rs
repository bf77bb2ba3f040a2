use anyhow::Result;
use common::{Artifact, ArtifactStore};
use extract::ChatModel;
use std::sync::Arc;

use crate::prompt;

/// Fixes transcription artifacts without touching meaning or order.
pub struct Corrector {
    model: Arc<dyn ChatModel>,
    store: ArtifactStore,
    domain_context: String,
}

impl Corrector {
    pub fn new(model: Arc<dyn ChatModel>, store: ArtifactStore, domain_context: impl Into<String>) -> Self {
        Self {
            model,
            store,
            domain_context: domain_context.into(),
        }
    }

    pub async fn correct(&self, item_id: &str, text: &str) -> Result<String> {
        if text.trim().is_empty() {
            return crate::persist_empty(&self.store, item_id, Artifact::Corrected).await;
        }

        let messages = prompt::build_correction_messages(&self.domain_context, text);
        crate::rewrite(self.model.as_ref(), &self.store, item_id, Artifact::Corrected, &messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedChat;

    #[tokio::test]
    async fn test_correction_is_persisted() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let chat = Arc::new(ScriptedChat::new(&["  The IMPIVA backed the fairs.\n"]));
        let corrector = Corrector::new(chat.clone(), store.clone(), "ceramics interviews");

        let corrected = corrector.correct("vid", "The Intima backed the fairs.").await.unwrap();

        assert_eq!(corrected, "The IMPIVA backed the fairs.");
        assert_eq!(
            store.read_text("vid", Artifact::Corrected).await.unwrap().as_deref(),
            Some("The IMPIVA backed the fairs.")
        );
        let requests = chat.requests.lock().unwrap();
        assert!(requests[0][0].content.contains("ceramics interviews"));
        assert!(requests[0][1].content.contains("The Intima backed the fairs."));
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_call() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let chat = Arc::new(ScriptedChat::default());
        let corrector = Corrector::new(chat.clone(), store.clone(), "ctx");

        assert_eq!(corrector.correct("vid", " \n").await.unwrap(), "");
        assert_eq!(chat.request_count(), 0);
        assert!(store.path("vid", Artifact::Corrected).unwrap().exists());
    }
}
