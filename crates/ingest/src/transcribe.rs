use anyhow::{Context, Result};
use async_trait::async_trait;
use common::config::LlmConfig;
use common::retry::Permanent;
use common::{Artifact, ArtifactStore, PipelineError, RetryPolicy};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

use crate::segment::{discover_indexed_files, indexed_file_name};

/// Speech-to-text for a single audio file.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: &Path, prompt: Option<&str>) -> Result<String>;
}

/// OpenAI-compatible `/audio/transcriptions` client.
pub struct WhisperClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    segments: Vec<TranscriptionSegment>,
}

#[derive(Deserialize)]
struct TranscriptionSegment {
    text: String,
}

impl TranscriptionResponse {
    fn into_text(self) -> String {
        if self.segments.is_empty() {
            return self.text.trim().to_string();
        }
        self.segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl WhisperClient {
    pub fn new(config: &LlmConfig, api_key: String, retry: RetryPolicy) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.transcription_model.clone(),
            client: reqwest::Client::new(),
            retry,
        }
    }
}

#[async_trait]
impl SpeechToText for WhisperClient {
    async fn transcribe(&self, audio: &Path, prompt: Option<&str>) -> Result<String> {
        let bytes = fs::read(audio)
            .await
            .context(format!("Failed to read audio segment: {:?}", audio))?;
        let file_name = audio
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "segment".to_string());

        self.retry
            .retry("transcribe", || self.transcribe_once(&bytes, &file_name, prompt))
            .await
    }
}

impl WhisperClient {
    async fn transcribe_once(&self, bytes: &[u8], file_name: &str, prompt: Option<&str>) -> Result<String> {
        let mut form = Form::new()
            .part("file", Part::bytes(bytes.to_vec()).file_name(file_name.to_string()))
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");
        if let Some(prompt) = prompt {
            form = form.text("prompt", prompt.to_string());
        }

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .context("Failed to send transcription request")?;

        let status = response.status();
        if status.is_client_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(Permanent(format!("Transcription failed: {} {}", status, body)).into());
        }
        if !status.is_success() {
            anyhow::bail!("Transcription failed: {}", status);
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .context("Failed to parse transcription response")?;
        Ok(parsed.into_text())
    }
}

/// Transcribes an item's segments one by one, keeping their order.
pub struct SegmentTranscriber {
    stt: Arc<dyn SpeechToText>,
    store: ArtifactStore,
    overlap_ms: u64,
}

impl SegmentTranscriber {
    pub fn new(stt: Arc<dyn SpeechToText>, store: ArtifactStore, overlap_ms: u64) -> Self {
        Self {
            stt,
            store,
            overlap_ms,
        }
    }

    fn prompt_for(&self, segment: &Path) -> String {
        let name = segment
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!(
            "File: {}. This audio overlaps the neighbouring fragments by {} seconds; keep the wording consistent across the overlap.",
            name,
            self.overlap_ms / 1000
        )
    }

    /// One transcript per path, same order. Every path is checked before the
    /// first call, and nothing is persisted unless all segments succeed.
    pub async fn transcribe(&self, item_id: &str, segment_paths: &[PathBuf]) -> Result<Vec<String>> {
        for path in segment_paths {
            if !fs::try_exists(path).await.unwrap_or(false) {
                return Err(anyhow::Error::from(PipelineError::MissingSegment(path.clone()))
                    .context(format!("Cannot transcribe item {}", item_id)));
            }
        }

        info!(item_id, segments = segment_paths.len(), "Starting transcription");

        let mut transcripts = Vec::with_capacity(segment_paths.len());
        for (index, path) in segment_paths.iter().enumerate() {
            let prompt = self.prompt_for(path);
            let text = self
                .stt
                .transcribe(path, Some(&prompt))
                .await
                .context(format!("Failed to transcribe segment {} of item {}", index, item_id))?;
            debug!(item_id, index, characters = text.len(), "Segment transcribed");
            transcripts.push(text);
        }

        self.persist(item_id, &transcripts).await?;

        info!(item_id, transcripts = transcripts.len(), "Transcription completed");
        Ok(transcripts)
    }

    async fn persist(&self, item_id: &str, transcripts: &[String]) -> Result<()> {
        let dir = self.store.dir(item_id, Artifact::Transcripts);
        if fs::try_exists(&dir).await? {
            fs::remove_dir_all(&dir)
                .await
                .context(format!("Failed to clear directory: {:?}", dir))?;
        }
        let dir = self.store.ensure_dir(item_id, Artifact::Transcripts).await?;

        for (index, text) in transcripts.iter().enumerate() {
            let path = dir.join(indexed_file_name(item_id, index, "txt"));
            fs::write(&path, text)
                .await
                .context(format!("Failed to write transcript: {:?}", path))?;
        }
        Ok(())
    }

    /// Read transcripts persisted by an earlier run, in index order.
    /// `None` when the item was never transcribed; an item with no segments
    /// reloads as an empty list.
    pub async fn load_persisted(&self, item_id: &str) -> Result<Option<Vec<String>>> {
        let dir = self.store.dir(item_id, Artifact::Transcripts);
        if !fs::try_exists(&dir).await? {
            return Ok(None);
        }

        let mut transcripts = Vec::new();
        for path in discover_indexed_files(&dir, item_id)? {
            let text = fs::read_to_string(&path)
                .await
                .context(format!("Failed to read transcript: {:?}", path))?;
            transcripts.push(text);
        }
        Ok(Some(transcripts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Returns the file's contents uppercased so outputs map to inputs.
    #[derive(Default)]
    struct EchoStt {
        calls: Mutex<Vec<PathBuf>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl SpeechToText for EchoStt {
        async fn transcribe(&self, audio: &Path, prompt: Option<&str>) -> Result<String> {
            assert!(prompt.is_some());
            self.calls.lock().unwrap().push(audio.to_path_buf());
            let content = std::fs::read_to_string(audio)?;
            if self.fail_on.as_deref() == Some(content.as_str()) {
                anyhow::bail!("service unavailable");
            }
            Ok(content.to_uppercase())
        }
    }

    fn write_segments(dir: &Path, contents: &[&str]) -> Vec<PathBuf> {
        contents
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let path = dir.join(indexed_file_name("vid", i, "mp4"));
                std::fs::write(&path, c).unwrap();
                path
            })
            .collect()
    }

    #[tokio::test]
    async fn test_output_matches_input_order() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("data"));
        let paths = write_segments(tmp.path(), &["one", "two", "three"]);

        let stt = Arc::new(EchoStt::default());
        let transcriber = SegmentTranscriber::new(stt.clone(), store, 60_000);
        let transcripts = transcriber.transcribe("vid", &paths).await.unwrap();

        assert_eq!(transcripts, vec!["ONE", "TWO", "THREE"]);
        assert_eq!(*stt.calls.lock().unwrap(), paths);
    }

    #[tokio::test]
    async fn test_missing_segment_fails_before_any_call() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("data"));
        let mut paths = write_segments(tmp.path(), &["one", "two"]);
        paths.push(tmp.path().join("vid_chunk_2.mp4"));

        let stt = Arc::new(EchoStt::default());
        let transcriber = SegmentTranscriber::new(stt.clone(), store.clone(), 60_000);
        let err = transcriber.transcribe("vid", &paths).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MissingSegment(_))
        ));
        assert!(stt.calls.lock().unwrap().is_empty());
        assert!(!store.dir("vid", Artifact::Transcripts).exists());
    }

    #[tokio::test]
    async fn test_service_failure_persists_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("data"));
        let paths = write_segments(tmp.path(), &["one", "two"]);

        let stt = Arc::new(EchoStt {
            fail_on: Some("two".to_string()),
            ..Default::default()
        });
        let transcriber = SegmentTranscriber::new(stt, store.clone(), 60_000);

        assert!(transcriber.transcribe("vid", &paths).await.is_err());
        assert_eq!(transcriber.load_persisted("vid").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_persisted_transcripts_reload_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("data"));
        let contents: Vec<String> = (0..12).map(|i| format!("part {i}")).collect();
        let refs: Vec<&str> = contents.iter().map(String::as_str).collect();
        let paths = write_segments(tmp.path(), &refs);

        let transcriber = SegmentTranscriber::new(Arc::new(EchoStt::default()), store, 60_000);
        let written = transcriber.transcribe("vid", &paths).await.unwrap();
        let reloaded = transcriber.load_persisted("vid").await.unwrap().unwrap();

        assert_eq!(written, reloaded);
        assert_eq!(reloaded[10], "PART 10");
    }

    #[tokio::test]
    async fn test_no_segments_persist_an_empty_transcript_set() {
        let tmp = tempfile::tempdir().unwrap();
        let stt = Arc::new(EchoStt::default());
        let transcriber = SegmentTranscriber::new(stt.clone(), ArtifactStore::new(tmp.path()), 60_000);

        assert!(transcriber.transcribe("vid", &[]).await.unwrap().is_empty());

        assert!(stt.calls.lock().unwrap().is_empty());
        assert_eq!(transcriber.load_persisted("vid").await.unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_verbose_json_joins_segments() {
        let parsed: TranscriptionResponse = serde_json::from_str(
            r#"{"text":"ignored","segments":[{"text":" Hola "},{"text":"món."}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.into_text(), "Hola món.");

        let plain: TranscriptionResponse = serde_json::from_str(r#"{"text":" just text "}"#).unwrap();
        assert_eq!(plain.into_text(), "just text");
    }
}
