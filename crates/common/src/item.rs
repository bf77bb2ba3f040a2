use serde::{Deserialize, Serialize};

/// Sidecar metadata for one listed video.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub item_id: String,
    pub title: String,
    pub description: String,
}

impl ItemRecord {
    pub fn new(item_id: impl Into<String>, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            title: title.into(),
            description: description.into(),
        }
    }

    /// Canonical watch URL for the item.
    pub fn watch_url(item_id: &str) -> String {
        format!("https://www.youtube.com/watch?v={}", item_id)
    }
}
