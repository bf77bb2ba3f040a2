use anyhow::Result;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::metrics::{Metrics, TimedOperation};
use crate::record::PipelineRecord;
use crate::resume;
use crate::stage::{Stage, StageKind};

#[derive(Debug, Clone, Serialize)]
pub struct StageFailure {
    pub item_id: String,
    pub stage: StageKind,
    /// Full cause chain, outermost first.
    pub error: String,
}

/// Outcome of a batch: items that made it through every stage, and where
/// the others stopped.
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub completed: Vec<PipelineRecord>,
    pub failures: Vec<StageFailure>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, item_id: String, stage: StageKind, err: anyhow::Error) {
        let chain = format!("{:#}", err);
        error!(item_id = %item_id, stage = %stage, error = %chain, "Item failed, leaving batch");
        self.failures.push(StageFailure {
            item_id,
            stage,
            error: chain,
        });
    }
}

/// Drop repeated ids, keeping the first occurrence.
pub fn dedupe_items(item_ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(item_ids.len());
    for id in item_ids {
        if seen.insert(id.as_str()) {
            unique.push(id.clone());
        } else {
            warn!(item_id = %id, "Duplicate item in batch, dropping");
        }
    }
    unique
}

/// Runs stages in order over a batch. Every item finishes a stage before any
/// item starts the next one; within a stage at most `concurrency` items are
/// in flight.
pub struct BatchRunner {
    stages: Vec<Box<dyn Stage>>,
    concurrency: usize,
    metrics: Arc<Metrics>,
}

impl BatchRunner {
    pub fn new(mut stages: Vec<Box<dyn Stage>>, concurrency: usize) -> Self {
        stages.sort_by_key(|s| s.kind());
        Self {
            stages,
            concurrency: concurrency.max(1),
            metrics: Metrics::new(),
        }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub async fn run(&self, item_ids: &[String], from: StageKind) -> BatchReport {
        let ids = dedupe_items(item_ids);
        self.metrics.record_items(ids.len());
        info!(items = ids.len(), from = %from, concurrency = self.concurrency, "Batch started");

        let mut report = BatchReport::default();

        let hydrated: Vec<(String, Result<PipelineRecord>)> = stream::iter(ids.into_iter().map(|id| async move {
            let record = resume::hydrate(&self.stages, from, &id).await;
            (id, record)
        }))
        .buffered(self.concurrency)
        .collect()
        .await;

        let mut active = Vec::with_capacity(hydrated.len());
        for (item_id, outcome) in hydrated {
            match outcome {
                Ok(record) => active.push(record),
                Err(e) => report.fail(item_id, from, e),
            }
        }

        for stage in self.stages.iter().filter(|s| s.kind() >= from) {
            if active.is_empty() {
                break;
            }
            let kind = stage.kind();
            let timer = TimedOperation::start();
            info!(stage = %kind, items = active.len(), "Stage started");

            let outcomes: Vec<(String, Result<PipelineRecord>)> = stream::iter(
                active.into_iter().map(|record| self.process_one(stage.as_ref(), record)),
            )
            .buffered(self.concurrency)
            .collect()
            .await;

            active = Vec::with_capacity(outcomes.len());
            for (item_id, outcome) in outcomes {
                match outcome {
                    Ok(record) => active.push(record),
                    Err(e) => report.fail(item_id, kind, e),
                }
            }

            info!(
                stage = %kind,
                succeeded = active.len(),
                elapsed_ms = timer.elapsed().as_millis() as u64,
                "Stage completed"
            );
        }

        report.completed = active;
        info!(
            completed = report.completed.len(),
            failed = report.failures.len(),
            "Batch finished"
        );
        report
    }

    async fn process_one(&self, stage: &dyn Stage, record: PipelineRecord) -> (String, Result<PipelineRecord>) {
        let item_id = record.item_id.clone();
        let timer = TimedOperation::start();
        let outcome = stage.process(record).await;
        self.metrics.record_stage(stage.kind(), timer.elapsed(), outcome.is_ok());
        (item_id, outcome)
    }
}
