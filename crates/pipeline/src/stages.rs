//! Adapters putting each component behind the [`Stage`] trait.

use anyhow::Result;
use async_trait::async_trait;
use common::{Artifact, ArtifactStore, PipelineError};
use extract::StructuredExtractor;
use index::GraphLoader;
use ingest::{discover_indexed_files, SegmentTranscriber, WindowChunker};
use refine::{CoreferenceResolver, Corrector, TranscriptUnifier, Translator};
use std::sync::Arc;
use tokio::fs;

use crate::record::{require, PipelineRecord};
use crate::stage::{Stage, StageKind};

fn missing(item_id: &str, field: &'static str) -> anyhow::Error {
    PipelineError::MissingInput {
        item_id: item_id.to_string(),
        field,
    }
    .into()
}

async fn restore_text(
    store: &ArtifactStore,
    item_id: &str,
    artifact: Artifact,
    field: &'static str,
) -> Result<String> {
    store
        .read_text(item_id, artifact)
        .await?
        .ok_or_else(|| missing(item_id, field))
}

pub struct ChunkStage {
    chunker: WindowChunker,
    store: ArtifactStore,
}

impl ChunkStage {
    pub fn new(chunker: WindowChunker, store: ArtifactStore) -> Self {
        Self { chunker, store }
    }
}

#[async_trait]
impl Stage for ChunkStage {
    fn kind(&self) -> StageKind {
        StageKind::Chunk
    }

    async fn process(&self, mut record: PipelineRecord) -> Result<PipelineRecord> {
        let segments = self.chunker.chunk(&record.item_id).await?;
        record.segment_paths = Some(segments.into_iter().map(|s| s.media_path).collect());
        Ok(record)
    }

    async fn restore(&self, mut record: PipelineRecord) -> Result<PipelineRecord> {
        let dir = self.store.dir(&record.item_id, Artifact::Segments);
        if !fs::try_exists(&dir).await? {
            return Err(missing(&record.item_id, "segment_paths"));
        }
        // an existing but empty directory is a silent source, not a missing one
        record.segment_paths = Some(discover_indexed_files(&dir, &record.item_id)?);
        Ok(record)
    }
}

pub struct TranscribeStage {
    transcriber: SegmentTranscriber,
}

impl TranscribeStage {
    pub fn new(transcriber: SegmentTranscriber) -> Self {
        Self { transcriber }
    }
}

#[async_trait]
impl Stage for TranscribeStage {
    fn kind(&self) -> StageKind {
        StageKind::Transcribe
    }

    async fn process(&self, mut record: PipelineRecord) -> Result<PipelineRecord> {
        let paths = require(&record.item_id, record.segment_paths.as_deref(), "segment_paths")?;
        let transcripts = self.transcriber.transcribe(&record.item_id, paths).await?;
        record.transcripts = Some(transcripts);
        Ok(record)
    }

    async fn restore(&self, mut record: PipelineRecord) -> Result<PipelineRecord> {
        let transcripts = self.transcriber.load_persisted(&record.item_id).await?;
        record.transcripts = Some(transcripts.ok_or_else(|| missing(&record.item_id, "transcripts"))?);
        Ok(record)
    }
}

pub struct UnifyStage {
    unifier: TranscriptUnifier,
    store: ArtifactStore,
}

impl UnifyStage {
    pub fn new(unifier: TranscriptUnifier, store: ArtifactStore) -> Self {
        Self { unifier, store }
    }
}

#[async_trait]
impl Stage for UnifyStage {
    fn kind(&self) -> StageKind {
        StageKind::Unify
    }

    async fn process(&self, mut record: PipelineRecord) -> Result<PipelineRecord> {
        let transcripts = require(&record.item_id, record.transcripts.as_deref(), "transcripts")?;
        let text = self.unifier.unify(&record.item_id, transcripts).await?;
        record.unified_text = Some(text);
        Ok(record)
    }

    async fn restore(&self, mut record: PipelineRecord) -> Result<PipelineRecord> {
        let text = restore_text(&self.store, &record.item_id, Artifact::Unified, "unified_text").await?;
        record.unified_text = Some(text);
        Ok(record)
    }
}

pub struct CorrectStage {
    corrector: Corrector,
    store: ArtifactStore,
}

impl CorrectStage {
    pub fn new(corrector: Corrector, store: ArtifactStore) -> Self {
        Self { corrector, store }
    }
}

#[async_trait]
impl Stage for CorrectStage {
    fn kind(&self) -> StageKind {
        StageKind::Correct
    }

    async fn process(&self, mut record: PipelineRecord) -> Result<PipelineRecord> {
        let text = require(&record.item_id, record.unified_text.as_deref(), "unified_text")?;
        let corrected = self.corrector.correct(&record.item_id, text).await?;
        record.corrected_text = Some(corrected);
        Ok(record)
    }

    async fn restore(&self, mut record: PipelineRecord) -> Result<PipelineRecord> {
        let text = restore_text(&self.store, &record.item_id, Artifact::Corrected, "corrected_text").await?;
        record.corrected_text = Some(text);
        Ok(record)
    }
}

pub struct CoreferenceStage {
    resolver: CoreferenceResolver,
    store: ArtifactStore,
}

impl CoreferenceStage {
    pub fn new(resolver: CoreferenceResolver, store: ArtifactStore) -> Self {
        Self { resolver, store }
    }
}

#[async_trait]
impl Stage for CoreferenceStage {
    fn kind(&self) -> StageKind {
        StageKind::Coreference
    }

    async fn process(&self, mut record: PipelineRecord) -> Result<PipelineRecord> {
        let text = require(&record.item_id, record.corrected_text.as_deref(), "corrected_text")?;
        let resolved = self.resolver.resolve(&record.item_id, text).await?;
        record.coreference_text = Some(resolved);
        Ok(record)
    }

    async fn restore(&self, mut record: PipelineRecord) -> Result<PipelineRecord> {
        let text =
            restore_text(&self.store, &record.item_id, Artifact::Coreference, "coreference_text").await?;
        record.coreference_text = Some(text);
        Ok(record)
    }
}

pub struct TranslateStage {
    translator: Translator,
    store: ArtifactStore,
}

impl TranslateStage {
    pub fn new(translator: Translator, store: ArtifactStore) -> Self {
        Self { translator, store }
    }
}

#[async_trait]
impl Stage for TranslateStage {
    fn kind(&self) -> StageKind {
        StageKind::Translate
    }

    async fn process(&self, mut record: PipelineRecord) -> Result<PipelineRecord> {
        let text = require(&record.item_id, record.coreference_text.as_deref(), "coreference_text")?;
        let translated = self.translator.translate(&record.item_id, text).await?;
        record.translated_text = Some(translated);
        Ok(record)
    }

    async fn restore(&self, mut record: PipelineRecord) -> Result<PipelineRecord> {
        let text =
            restore_text(&self.store, &record.item_id, Artifact::Translated, "translated_text").await?;
        record.translated_text = Some(text);
        Ok(record)
    }
}

pub struct ExtractStage {
    extractor: StructuredExtractor,
}

impl ExtractStage {
    pub fn new(extractor: StructuredExtractor) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl Stage for ExtractStage {
    fn kind(&self) -> StageKind {
        StageKind::Extract
    }

    async fn process(&self, mut record: PipelineRecord) -> Result<PipelineRecord> {
        let text = require(&record.item_id, record.translated_text.as_deref(), "translated_text")?;
        let result = self.extractor.extract(&record.item_id, text).await?;
        record.structured_output = Some(result);
        Ok(record)
    }

    async fn restore(&self, mut record: PipelineRecord) -> Result<PipelineRecord> {
        let result = self
            .extractor
            .load_persisted(&record.item_id)
            .await?
            .ok_or_else(|| missing(&record.item_id, "structured_output"))?;
        record.structured_output = Some(result);
        Ok(record)
    }
}

pub struct LoadStage {
    loader: Arc<GraphLoader>,
}

impl LoadStage {
    pub fn new(loader: Arc<GraphLoader>) -> Self {
        Self { loader }
    }
}

#[async_trait]
impl Stage for LoadStage {
    fn kind(&self) -> StageKind {
        StageKind::Load
    }

    async fn process(&self, mut record: PipelineRecord) -> Result<PipelineRecord> {
        let result = require(&record.item_id, record.structured_output.as_ref(), "structured_output")?;
        let report = self.loader.load(&record.item_id, result).await?;
        record.load_report = Some(report);
        Ok(record)
    }

    /// Nothing downstream consumes the load report, so there is nothing to restore.
    async fn restore(&self, record: PipelineRecord) -> Result<PipelineRecord> {
        Ok(record)
    }
}
