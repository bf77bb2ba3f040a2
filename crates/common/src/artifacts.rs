use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::item::ItemRecord;

const METADATA_FILE: &str = "metadata.json";

/// One persisted output per stage, each in its own subdirectory of the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    FullAudio,
    Segments,
    Transcripts,
    Unified,
    Corrected,
    Coreference,
    Translated,
    Structured,
}

impl Artifact {
    fn relative_dir(&self) -> &'static str {
        match self {
            Artifact::FullAudio => "audios/full",
            Artifact::Segments => "audios/chunks",
            Artifact::Transcripts => "texts/transcripts",
            Artifact::Unified => "texts/unified",
            Artifact::Corrected => "texts/corrected",
            Artifact::Coreference => "texts/coreference",
            Artifact::Translated => "texts/translated",
            Artifact::Structured => "texts/structured",
        }
    }

    /// File name of the single-file artifacts.
    fn file_name(&self, item_id: &str) -> Option<String> {
        match self {
            Artifact::Unified => Some(format!("unified_{}.txt", item_id)),
            Artifact::Corrected => Some(format!("corrected_{}.txt", item_id)),
            Artifact::Coreference => Some(format!("coreference_{}.txt", item_id)),
            Artifact::Translated => Some(format!("translated_{}.txt", item_id)),
            Artifact::Structured => Some(format!("structured_{}.json", item_id)),
            Artifact::FullAudio | Artifact::Segments | Artifact::Transcripts => None,
        }
    }
}

/// Per-item directory tree of intermediate outputs rooted at `data_dir`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn item_dir(&self, item_id: &str) -> PathBuf {
        self.root.join(item_id)
    }

    pub fn dir(&self, item_id: &str, artifact: Artifact) -> PathBuf {
        self.item_dir(item_id).join(artifact.relative_dir())
    }

    /// Create (if needed) and return the artifact's directory.
    pub async fn ensure_dir(&self, item_id: &str, artifact: Artifact) -> Result<PathBuf> {
        let dir = self.dir(item_id, artifact);
        fs::create_dir_all(&dir)
            .await
            .context(format!("Failed to create directory: {:?}", dir))?;
        Ok(dir)
    }

    pub fn path(&self, item_id: &str, artifact: Artifact) -> Result<PathBuf> {
        let name = artifact
            .file_name(item_id)
            .ok_or_else(|| anyhow::anyhow!("{:?} is a directory artifact", artifact))?;
        Ok(self.dir(item_id, artifact).join(name))
    }

    /// Write a single-file artifact, overwriting a previous run's output.
    pub async fn write_text(&self, item_id: &str, artifact: Artifact, contents: &str) -> Result<PathBuf> {
        self.ensure_dir(item_id, artifact).await?;
        let path = self.path(item_id, artifact)?;
        fs::write(&path, contents)
            .await
            .context(format!("Failed to write artifact: {:?}", path))?;
        info!(item_id, artifact = ?artifact, path = %path.display(), "Artifact saved");
        Ok(path)
    }

    /// Read a single-file artifact; `None` when it was never written.
    pub async fn read_text(&self, item_id: &str, artifact: Artifact) -> Result<Option<String>> {
        let path = self.path(item_id, artifact)?;
        read_if_exists(&path).await
    }

    pub fn metadata_path(&self, item_id: &str) -> PathBuf {
        self.item_dir(item_id).join(METADATA_FILE)
    }

    pub async fn write_metadata(&self, record: &ItemRecord) -> Result<PathBuf> {
        let dir = self.item_dir(&record.item_id);
        fs::create_dir_all(&dir)
            .await
            .context(format!("Failed to create directory: {:?}", dir))?;
        let path = self.metadata_path(&record.item_id);
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&path, json)
            .await
            .context(format!("Failed to write metadata: {:?}", path))?;
        debug!(item_id = %record.item_id, path = %path.display(), "Metadata saved");
        Ok(path)
    }

    pub async fn read_metadata(&self, item_id: &str) -> Result<Option<ItemRecord>> {
        let path = self.metadata_path(item_id);
        match read_if_exists(&path).await? {
            Some(raw) => {
                let record = serde_json::from_str(&raw)
                    .context(format!("Failed to parse metadata: {:?}", path))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}

async fn read_if_exists(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).context(format!("Failed to read artifact: {:?}", path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_text_artifact_layout_and_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());

        let path = store.write_text("vid", Artifact::Corrected, "first").await.unwrap();
        assert_eq!(path, tmp.path().join("vid/texts/corrected/corrected_vid.txt"));

        store.write_text("vid", Artifact::Corrected, "second").await.unwrap();
        let text = store.read_text("vid", Artifact::Corrected).await.unwrap();
        assert_eq!(text.as_deref(), Some("second"));

        // other stages are untouched
        assert!(store.read_text("vid", Artifact::Unified).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_metadata_round_trip_and_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());

        assert!(store.read_metadata("vid").await.unwrap().is_none());

        let record = ItemRecord::new("vid", "Interview", "About ceramics");
        store.write_metadata(&record).await.unwrap();
        assert!(tmp.path().join("vid/metadata.json").exists());
        assert_eq!(store.read_metadata("vid").await.unwrap(), Some(record));
    }

    #[test]
    fn test_directory_artifacts_have_no_single_path() {
        let store = ArtifactStore::new("data");
        assert!(store.path("vid", Artifact::Segments).is_err());
        assert_eq!(store.dir("vid", Artifact::Segments), PathBuf::from("data/vid/audios/chunks"));
    }
}
