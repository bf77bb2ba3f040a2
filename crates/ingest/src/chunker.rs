use anyhow::{Context, Result};
use common::config::ChunkingConfig;
use common::{Artifact, ArtifactStore, PipelineError};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::media::MediaBackend;
use crate::segment::{indexed_file_name, Segment, Window};

/// Plan overlapping windows over `total_ms` of audio.
///
/// Windows start every `chunk_ms - overlap_ms`; the last one is clamped to
/// `total_ms` and may be shorter than `chunk_ms`.
pub fn plan_windows(total_ms: u64, chunk_ms: u64, overlap_ms: u64) -> Result<Vec<Window>> {
    if chunk_ms == 0 || overlap_ms >= chunk_ms {
        return Err(PipelineError::InvalidWindow { chunk_ms, overlap_ms }.into());
    }
    let step = chunk_ms - overlap_ms;

    let windows = (0..total_ms)
        .step_by(step as usize)
        .enumerate()
        .map(|(index, start_ms)| Window {
            index,
            start_ms,
            end_ms: (start_ms + chunk_ms).min(total_ms),
        })
        .collect();

    Ok(windows)
}

/// Downloads an item's audio and cuts it into overlapping segments.
pub struct WindowChunker {
    backend: Arc<dyn MediaBackend>,
    store: ArtifactStore,
    config: ChunkingConfig,
}

impl WindowChunker {
    pub fn new(backend: Arc<dyn MediaBackend>, store: ArtifactStore, config: ChunkingConfig) -> Self {
        Self {
            backend,
            store,
            config,
        }
    }

    /// Fetch, plan and export. Either every segment is written or the item
    /// fails and its segment directory is removed, so an existing directory
    /// always holds a complete (possibly empty) segment set.
    pub async fn chunk(&self, item_id: &str) -> Result<Vec<Segment>> {
        // validate before touching the network
        plan_windows(0, self.config.chunk_ms, self.config.overlap_ms)?;

        let full_dir = self.store.ensure_dir(item_id, Artifact::FullAudio).await?;
        let chunks_dir = self.store.dir(item_id, Artifact::Segments);
        remove_dir(&chunks_dir).await?;
        let staging = chunks_dir.with_extension("partial");
        remove_dir(&staging).await?;
        fs::create_dir_all(&staging)
            .await
            .context(format!("Failed to create directory: {:?}", staging))?;

        let segments = match self.export_segments(item_id, &full_dir, &staging).await {
            Ok(segments) => segments,
            Err(e) => {
                if let Err(cleanup) = remove_dir(&staging).await {
                    warn!(item_id, error = %cleanup, "Failed to discard partial segments");
                }
                return Err(e);
            }
        };

        fs::rename(&staging, &chunks_dir)
            .await
            .context(format!("Failed to move segments into {:?}", chunks_dir))?;
        let segments: Vec<Segment> = segments
            .into_iter()
            .map(|mut segment| {
                if let Some(name) = segment.media_path.file_name() {
                    segment.media_path = chunks_dir.join(name);
                }
                segment
            })
            .collect();

        info!(item_id, segments = segments.len(), "Chunking completed");
        Ok(segments)
    }

    async fn export_segments(&self, item_id: &str, full_dir: &Path, out_dir: &Path) -> Result<Vec<Segment>> {
        debug!(item_id, "Downloading audio");
        let media = self
            .backend
            .fetch(item_id, full_dir)
            .await
            .context(format!("Failed to fetch media for item {}", item_id))?;

        let total_ms = self
            .backend
            .duration_ms(&media)
            .await
            .context(format!("Failed to probe media duration: {:?}", media))?;

        let windows = plan_windows(total_ms, self.config.chunk_ms, self.config.overlap_ms)?;
        info!(
            item_id,
            total_ms,
            chunk_ms = self.config.chunk_ms,
            overlap_ms = self.config.overlap_ms,
            segments = windows.len(),
            "Chunking audio"
        );

        let mut segments = Vec::with_capacity(windows.len());
        for window in &windows {
            let output = out_dir.join(indexed_file_name(
                item_id,
                window.index,
                &self.config.segment_format,
            ));

            if let Err(e) = self.backend.export(&media, window, &output).await {
                warn!(item_id, index = window.index, error = %e, "Segment export failed, discarding item segments");
                return Err(e.context(format!(
                    "Failed to export segment {} ({}-{} ms) for item {}",
                    window.index, window.start_ms, window.end_ms, item_id
                )));
            }

            debug!(
                item_id,
                index = window.index,
                start_ms = window.start_ms,
                end_ms = window.end_ms,
                "Segment exported"
            );
            segments.push(Segment::new(item_id, window, output));
        }
        Ok(segments)
    }
}

async fn remove_dir(dir: &Path) -> Result<()> {
    if fs::try_exists(dir).await? {
        fs::remove_dir_all(dir)
            .await
            .context(format!("Failed to clear directory: {:?}", dir))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    struct FakeMedia {
        total_ms: u64,
        fail_fetch: bool,
        fail_export_at: Option<usize>,
        exported: Mutex<Vec<Window>>,
    }

    impl FakeMedia {
        fn new(total_ms: u64) -> Self {
            Self {
                total_ms,
                fail_fetch: false,
                fail_export_at: None,
                exported: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MediaBackend for FakeMedia {
        async fn fetch(&self, item_id: &str, dest_dir: &Path) -> Result<PathBuf> {
            if self.fail_fetch {
                anyhow::bail!("video unavailable");
            }
            let path = dest_dir.join(format!("{}.webm", item_id));
            std::fs::write(&path, b"audio")?;
            Ok(path)
        }

        async fn duration_ms(&self, _media: &Path) -> Result<u64> {
            Ok(self.total_ms)
        }

        async fn export(&self, _media: &Path, window: &Window, output: &Path) -> Result<()> {
            if self.fail_export_at == Some(window.index) {
                anyhow::bail!("encoder crashed");
            }
            std::fs::write(output, b"x")?;
            self.exported.lock().unwrap().push(*window);
            Ok(())
        }
    }

    fn config(chunk_ms: u64, overlap_ms: u64) -> ChunkingConfig {
        ChunkingConfig {
            chunk_ms,
            overlap_ms,
            segment_format: "mp4".to_string(),
        }
    }

    #[test]
    fn test_plan_four_second_windows_over_ten_seconds() {
        let windows = plan_windows(10_000, 4000, 1000).unwrap();

        let starts: Vec<u64> = windows.iter().map(|w| w.start_ms).collect();
        let ends: Vec<u64> = windows.iter().map(|w| w.end_ms).collect();
        assert_eq!(starts, vec![0, 3000, 6000, 9000]);
        assert_eq!(ends, vec![4000, 7000, 10000, 10000]);
        assert_eq!(
            windows.iter().map(|w| w.index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
    }

    #[test]
    fn test_plan_exact_multiple_and_empty_source() {
        assert_eq!(plan_windows(9000, 3000, 0).unwrap().len(), 3);
        assert!(plan_windows(0, 3000, 500).unwrap().is_empty());
    }

    #[test]
    fn test_plan_rejects_overlap_not_below_chunk() {
        let err = plan_windows(10_000, 1000, 1000).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::InvalidWindow { chunk_ms: 1000, overlap_ms: 1000 })
        ));
    }

    proptest! {
        #[test]
        fn prop_windows_cover_source_without_gaps(
            total in 0u64..200_000,
            chunk in 1u64..20_000,
            overlap_ratio in 0.0f64..1.0,
        ) {
            let overlap = ((chunk as f64) * overlap_ratio) as u64;
            prop_assume!(overlap < chunk);
            let step = chunk - overlap;

            let windows = plan_windows(total, chunk, overlap).unwrap();

            prop_assert_eq!(windows.len() as u64, total.div_ceil(step));
            let mut covered_to = 0u64;
            for (i, w) in windows.iter().enumerate() {
                prop_assert_eq!(w.index, i);
                prop_assert!(w.end_ms - w.start_ms <= chunk);
                prop_assert!(w.start_ms <= covered_to);
                prop_assert!(w.end_ms > w.start_ms);
                covered_to = covered_to.max(w.end_ms);
            }
            prop_assert_eq!(covered_to, total);
        }
    }

    #[tokio::test]
    async fn test_chunk_writes_indexed_segments() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let media = Arc::new(FakeMedia::new(10_000));
        let chunker = WindowChunker::new(media.clone(), store, config(4000, 1000));

        let segments = chunker.chunk("vid").await.unwrap();

        let names: Vec<String> = segments
            .iter()
            .map(|s| s.media_path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["vid_chunk_0.mp4", "vid_chunk_1.mp4", "vid_chunk_2.mp4", "vid_chunk_3.mp4"]
        );
        for segment in &segments {
            assert!(segment.media_path.exists());
        }
        assert_eq!(segments[3].start_ms, 9000);
        assert_eq!(segments[3].end_ms, 10_000);
        assert_eq!(media.exported.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let mut media = FakeMedia::new(10_000);
        media.fail_fetch = true;
        let chunker = WindowChunker::new(Arc::new(media), ArtifactStore::new(tmp.path()), config(4000, 1000));

        let err = chunker.chunk("vid").await.unwrap_err();
        assert!(format!("{err:#}").contains("video unavailable"));
    }

    #[tokio::test]
    async fn test_export_failure_leaves_no_partial_segments() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let mut media = FakeMedia::new(10_000);
        media.fail_export_at = Some(2);
        let chunker = WindowChunker::new(Arc::new(media), store.clone(), config(4000, 1000));

        assert!(chunker.chunk("vid").await.is_err());

        let chunks_dir = store.dir("vid", Artifact::Segments);
        assert!(!chunks_dir.exists());
        assert!(!chunks_dir.with_extension("partial").exists());
    }

    #[tokio::test]
    async fn test_failed_rerun_discards_earlier_segments() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let ok = WindowChunker::new(Arc::new(FakeMedia::new(10_000)), store.clone(), config(4000, 1000));
        ok.chunk("vid").await.unwrap();

        let mut media = FakeMedia::new(10_000);
        media.fail_fetch = true;
        let failing = WindowChunker::new(Arc::new(media), store.clone(), config(4000, 1000));
        assert!(failing.chunk("vid").await.is_err());

        assert!(!store.dir("vid", Artifact::Segments).exists());
    }

    #[tokio::test]
    async fn test_silent_source_leaves_empty_segment_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let chunker = WindowChunker::new(Arc::new(FakeMedia::new(0)), store.clone(), config(4000, 1000));

        assert!(chunker.chunk("vid").await.unwrap().is_empty());

        let chunks_dir = store.dir("vid", Artifact::Segments);
        assert!(chunks_dir.is_dir());
        assert_eq!(std::fs::read_dir(chunks_dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_rerun_replaces_previous_segments() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());

        let long = WindowChunker::new(Arc::new(FakeMedia::new(20_000)), store.clone(), config(4000, 1000));
        assert_eq!(long.chunk("vid").await.unwrap().len(), 7);

        let short = WindowChunker::new(Arc::new(FakeMedia::new(5_000)), store.clone(), config(4000, 1000));
        assert_eq!(short.chunk("vid").await.unwrap().len(), 2);

        let on_disk = std::fs::read_dir(store.dir("vid", Artifact::Segments)).unwrap().count();
        assert_eq!(on_disk, 2);
    }
}
