//! Builds the concrete components from one `PipelineConfig`.

use anyhow::Result;
use common::{ArtifactStore, PipelineConfig, RetryPolicy};
use extract::{ChatClient, ChatModel, StructuredExtractor};
use index::{Embedder, EmbeddingClient, GraphLoader, GraphStore, Neo4jStore};
use ingest::{FfmpegBackend, SegmentTranscriber, SourceLister, SpeechToText, WhisperClient, WindowChunker, YouTubeClient};
use pipeline::{
    ChunkStage, CoreferenceStage, CorrectStage, ExtractStage, LoadStage, Stage, TranscribeStage, TranslateStage,
    UnifyStage,
};
use refine::{build_merger, CoreferenceResolver, Corrector, TranscriptUnifier, Translator};
use std::sync::Arc;

fn retry_policy(config: &PipelineConfig) -> RetryPolicy {
    RetryPolicy::from(&config.retry)
}

pub fn source_lister(config: &PipelineConfig) -> Result<SourceLister> {
    let key = config.require_youtube_key()?;
    let client = YouTubeClient::new(&config.youtube, key.to_string(), retry_policy(config));
    Ok(SourceLister::new(Arc::new(client), ArtifactStore::new(&config.data_dir)))
}

pub async fn connect_neo4j(config: &PipelineConfig) -> Result<Neo4jStore> {
    let password = config.require_neo4j_password()?;
    Neo4jStore::connect(&config.neo4j, password).await
}

/// Every stage in execution order, sharing one chat client and one graph loader.
pub fn build_stages(config: &PipelineConfig, graph: Arc<dyn GraphStore>) -> Result<Vec<Box<dyn Stage>>> {
    let key = config.require_llm_key()?.to_string();
    let retry = retry_policy(config);
    let store = ArtifactStore::new(&config.data_dir);

    let chat: Arc<dyn ChatModel> = Arc::new(ChatClient::new(&config.llm, key.clone(), retry));
    let stt: Arc<dyn SpeechToText> = Arc::new(WhisperClient::new(&config.llm, key.clone(), retry));
    let embedder: Arc<dyn Embedder> = Arc::new(EmbeddingClient::new(&config.llm, key, retry));

    let chunker = WindowChunker::new(
        Arc::new(FfmpegBackend::new(config.media.clone())),
        store.clone(),
        config.chunking.clone(),
    );
    let transcriber = SegmentTranscriber::new(stt, store.clone(), config.chunking.overlap_ms);
    let unifier = TranscriptUnifier::new(build_merger(&config.unify, chat.clone()), store.clone());
    let corrector = Corrector::new(chat.clone(), store.clone(), config.refine.domain_context.clone());
    let resolver = CoreferenceResolver::new(chat.clone(), store.clone());
    let translator = Translator::new(chat.clone(), store.clone(), &config.refine);
    let extractor = StructuredExtractor::new(chat, store.clone());
    let loader = GraphLoader::new(graph, embedder, config.llm.embedding_dimensions);

    let stages: Vec<Box<dyn Stage>> = vec![
        Box::new(ChunkStage::new(chunker, store.clone())),
        Box::new(TranscribeStage::new(transcriber)),
        Box::new(UnifyStage::new(unifier, store.clone())),
        Box::new(CorrectStage::new(corrector, store.clone())),
        Box::new(CoreferenceStage::new(resolver, store.clone())),
        Box::new(TranslateStage::new(translator, store)),
        Box::new(ExtractStage::new(extractor)),
        Box::new(LoadStage::new(Arc::new(loader))),
    ];
    Ok(stages)
}
