pub mod metrics;
pub mod record;
pub mod resume;
pub mod runner;
pub mod stage;
pub mod stages;

pub use metrics::{Metrics, MetricsSnapshot};
pub use record::PipelineRecord;
pub use runner::{BatchReport, BatchRunner, StageFailure, dedupe_items};
pub use stage::{Stage, StageKind};
pub use stages::{
    ChunkStage, CoreferenceStage, CorrectStage, ExtractStage, LoadStage, TranscribeStage, TranslateStage,
    UnifyStage,
};
