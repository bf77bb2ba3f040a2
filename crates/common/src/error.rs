use std::path::PathBuf;
use thiserror::Error;

/// Failure conditions the pipeline needs to tell apart.
///
/// Operations return `anyhow::Result`; these variants travel inside the
/// `anyhow` chain and can be recovered with `downcast_ref`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid chunking window: overlap of {overlap_ms} ms must be smaller than chunk of {chunk_ms} ms")]
    InvalidWindow { chunk_ms: u64, overlap_ms: u64 },

    #[error("segment file not found: {}", .0.display())]
    MissingSegment(PathBuf),

    #[error("unsupported language detected: '{0}'")]
    UnsupportedLanguage(String),

    #[error("extraction output does not match the schema: {0}")]
    SchemaValidation(String),

    #[error("record for item {item_id} has no '{field}' to process")]
    MissingInput { item_id: String, field: &'static str },

    #[error("graph store unavailable: {0}")]
    GraphConnection(String),
}
