use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::PipelineError;

/// Everything the pipeline needs, built once and sliced into the stage
/// constructors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub playlist_id: String,
    pub chunking: ChunkingConfig,
    pub concurrency: ConcurrencyConfig,
    pub retry: RetryConfig,
    pub llm: LlmConfig,
    pub unify: UnifyConfig,
    pub refine: RefineConfig,
    pub youtube: YouTubeConfig,
    pub neo4j: Neo4jConfig,
    pub media: MediaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_ms: u64,
    pub overlap_ms: u64,
    /// Container/extension used for exported segments.
    pub segment_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub max_concurrent_items: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub request_timeout_secs: u64,
}

/// OpenAI-compatible endpoint used for chat, transcription and embeddings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub chat_model: String,
    pub transcription_model: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UnifyStrategy {
    /// Exact overlap trimming, then a language-model merge.
    Llm,
    /// Exact overlap trimming only; no external calls.
    Overlap,
}

impl FromStr for UnifyStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "llm" => Ok(Self::Llm),
            "overlap" => Ok(Self::Overlap),
            other => anyhow::bail!("Unknown unify strategy: {}", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifyConfig {
    pub strategy: UnifyStrategy,
    pub min_overlap_words: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineConfig {
    /// Subject matter of the recordings, given to the corrector.
    pub domain_context: String,
    /// Label the language classifier uses for text that needs no translation.
    pub target_language: String,
    /// Label for the dialect that gets translated into the target language.
    pub source_dialect: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YouTubeConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    pub yt_dlp_bin: String,
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            playlist_id: String::new(),
            chunking: ChunkingConfig {
                chunk_ms: 600_000,
                overlap_ms: 60_000,
                segment_format: "mp4".to_string(),
            },
            concurrency: ConcurrencyConfig {
                max_concurrent_items: 3,
            },
            retry: RetryConfig {
                max_retries: 3,
                initial_backoff_ms: 1000,
                max_backoff_ms: 10000,
                request_timeout_secs: 120,
            },
            llm: LlmConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: None,
                chat_model: "gpt-4o-mini".to_string(),
                transcription_model: "whisper-1".to_string(),
                embedding_model: "text-embedding-3-small".to_string(),
                embedding_dimensions: 1536,
            },
            unify: UnifyConfig {
                strategy: UnifyStrategy::Llm,
                min_overlap_words: 3,
            },
            refine: RefineConfig {
                domain_context: "interviews with specialists in Valencian cultural heritage".to_string(),
                target_language: "castellano".to_string(),
                source_dialect: "valenciano".to_string(),
            },
            youtube: YouTubeConfig {
                base_url: "https://www.googleapis.com/youtube/v3".to_string(),
                api_key: None,
            },
            neo4j: Neo4jConfig {
                uri: "bolt://localhost:7687".to_string(),
                user: "neo4j".to_string(),
                password: None,
            },
            media: MediaConfig {
                yt_dlp_bin: "yt-dlp".to_string(),
                ffmpeg_bin: "ffmpeg".to_string(),
                ffprobe_bin: "ffprobe".to_string(),
            },
        }
    }
}

impl PipelineConfig {
    /// Defaults, then the optional JSON file, then environment variables
    /// (a `.env` file is honoured).
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        dotenvy::dotenv().ok();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {:?}", path))?;
        serde_json::from_str(&raw).context(format!("Failed to parse config file: {:?}", path))
    }

    /// Override fields from a variable lookup; unset variables keep the
    /// current value.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        set_string(&lookup, "PLAYLIST_ID", &mut self.playlist_id);

        set_parsed(&lookup, "CHUNK_LENGTH_MS", &mut self.chunking.chunk_ms)?;
        set_parsed(&lookup, "OVERLAP_MS", &mut self.chunking.overlap_ms)?;
        set_string(&lookup, "SEGMENT_FORMAT", &mut self.chunking.segment_format);

        set_parsed(&lookup, "MAX_CONCURRENT_ITEMS", &mut self.concurrency.max_concurrent_items)?;

        set_parsed(&lookup, "MAX_RETRIES", &mut self.retry.max_retries)?;
        set_parsed(&lookup, "INITIAL_BACKOFF_MS", &mut self.retry.initial_backoff_ms)?;
        set_parsed(&lookup, "MAX_BACKOFF_MS", &mut self.retry.max_backoff_ms)?;
        set_parsed(&lookup, "REQUEST_TIMEOUT_SECS", &mut self.retry.request_timeout_secs)?;

        set_string(&lookup, "LLM_BASE_URL", &mut self.llm.base_url);
        set_optional(&lookup, "OPENAI_API_KEY", &mut self.llm.api_key);
        set_string(&lookup, "LLM_MODEL", &mut self.llm.chat_model);
        set_string(&lookup, "TRANSCRIPTION_MODEL", &mut self.llm.transcription_model);
        set_string(&lookup, "EMBEDDINGS_MODEL", &mut self.llm.embedding_model);
        set_parsed(&lookup, "EMBEDDING_DIMENSIONS", &mut self.llm.embedding_dimensions)?;

        set_parsed(&lookup, "UNIFY_STRATEGY", &mut self.unify.strategy)?;
        set_parsed(&lookup, "MIN_OVERLAP_WORDS", &mut self.unify.min_overlap_words)?;

        set_string(&lookup, "DOMAIN_CONTEXT", &mut self.refine.domain_context);
        set_string(&lookup, "TARGET_LANGUAGE", &mut self.refine.target_language);
        set_string(&lookup, "SOURCE_DIALECT", &mut self.refine.source_dialect);

        set_string(&lookup, "YOUTUBE_BASE_URL", &mut self.youtube.base_url);
        set_optional(&lookup, "YOUTUBE_API_KEY", &mut self.youtube.api_key);

        set_string(&lookup, "NEO4J_URI_BOLT", &mut self.neo4j.uri);
        set_string(&lookup, "NEO4J_USER", &mut self.neo4j.user);
        set_optional(&lookup, "NEO4J_PASSWORD", &mut self.neo4j.password);

        set_string(&lookup, "YT_DLP_BIN", &mut self.media.yt_dlp_bin);
        set_string(&lookup, "FFMPEG_BIN", &mut self.media.ffmpeg_bin);
        set_string(&lookup, "FFPROBE_BIN", &mut self.media.ffprobe_bin);

        Ok(())
    }

    /// Checks that hold regardless of which command runs.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_ms == 0 || self.chunking.overlap_ms >= self.chunking.chunk_ms {
            return Err(PipelineError::InvalidWindow {
                chunk_ms: self.chunking.chunk_ms,
                overlap_ms: self.chunking.overlap_ms,
            }
            .into());
        }
        if self.concurrency.max_concurrent_items == 0 {
            anyhow::bail!("MAX_CONCURRENT_ITEMS must be at least 1");
        }
        if self.data_dir.as_os_str().is_empty() {
            anyhow::bail!("DATA_DIR cannot be empty");
        }
        Ok(())
    }

    pub fn require_playlist(&self) -> Result<&str> {
        require("PLAYLIST_ID", Some(&self.playlist_id))
    }

    pub fn require_youtube_key(&self) -> Result<&str> {
        require("YOUTUBE_API_KEY", self.youtube.api_key.as_ref())
    }

    pub fn require_llm_key(&self) -> Result<&str> {
        require("OPENAI_API_KEY", self.llm.api_key.as_ref())
    }

    pub fn require_neo4j_password(&self) -> Result<&str> {
        require("NEO4J_PASSWORD", self.neo4j.password.as_ref())
    }
}

fn require<'a>(name: &str, value: Option<&'a String>) -> Result<&'a str> {
    match value.map(|v| v.trim()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => anyhow::bail!("{} cannot be empty", name),
    }
}

fn set_string<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, target: &mut String) {
    if let Some(v) = lookup(key) {
        *target = v;
    }
}

fn set_optional<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, target: &mut Option<String>) {
    if let Some(v) = lookup(key) {
        *target = Some(v).filter(|v| !v.trim().is_empty());
    }
}

fn set_parsed<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(v) = lookup(key) {
        *target = v
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {} ({})", key, v, e))?;
    }
    Ok(())
}
