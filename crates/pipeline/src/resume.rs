use anyhow::{Context, Result};
use tracing::debug;

use crate::record::PipelineRecord;
use crate::stage::{Stage, StageKind};

/// Build the record a run starting at `from` needs: the output of the stage
/// before `from`, read back from persisted artifacts.
pub async fn hydrate(stages: &[Box<dyn Stage>], from: StageKind, item_id: &str) -> Result<PipelineRecord> {
    let record = PipelineRecord::new(item_id);
    let Some(previous) = from.previous() else {
        return Ok(record);
    };

    let stage = stages
        .iter()
        .find(|s| s.kind() == previous)
        .ok_or_else(|| anyhow::anyhow!("No {} stage registered to restore output from", previous))?;

    debug!(item_id, from = %from, restoring = %previous, "Hydrating record from artifacts");
    stage
        .restore(record)
        .await
        .context(format!("Cannot resume item {} at stage {}", item_id, from))
}
