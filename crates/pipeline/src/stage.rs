use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::record::PipelineRecord;

/// The fixed stage order. `Ord` follows execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Chunk,
    Transcribe,
    Unify,
    Correct,
    Coreference,
    Translate,
    Extract,
    Load,
}

impl StageKind {
    pub const ALL: [StageKind; 8] = [
        StageKind::Chunk,
        StageKind::Transcribe,
        StageKind::Unify,
        StageKind::Correct,
        StageKind::Coreference,
        StageKind::Translate,
        StageKind::Extract,
        StageKind::Load,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Chunk => "chunk",
            StageKind::Transcribe => "transcribe",
            StageKind::Unify => "unify",
            StageKind::Correct => "correct",
            StageKind::Coreference => "coreference",
            StageKind::Translate => "translate",
            StageKind::Extract => "extract",
            StageKind::Load => "load",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// The stage whose output this stage consumes.
    pub fn previous(&self) -> Option<StageKind> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|k| k.name()).collect();
                anyhow::anyhow!("Unknown stage '{}', expected one of: {}", s, names.join(", "))
            })
    }
}

/// One step of the per-item pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    /// Consume the predecessor's field and return the record with this
    /// stage's field filled.
    async fn process(&self, record: PipelineRecord) -> Result<PipelineRecord>;

    /// Fill this stage's field from artifacts an earlier run persisted, so a
    /// later stage can start without re-running this one.
    async fn restore(&self, record: PipelineRecord) -> Result<PipelineRecord>;
}
