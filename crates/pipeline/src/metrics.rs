use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::stage::StageKind;

#[derive(Default)]
struct StageCounters {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    // microseconds
    total_time_us: AtomicU64,
}

/// Per-stage counters for one batch run.
pub struct Metrics {
    stages: [StageCounters; StageKind::ALL.len()],
    items_started: AtomicUsize,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            stages: Default::default(),
            items_started: AtomicUsize::new(0),
        })
    }

    pub fn record_items(&self, count: usize) {
        self.items_started.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_stage(&self, stage: StageKind, duration: Duration, success: bool) {
        let counters = &self.stages[stage.index()];
        counters
            .total_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        if success {
            counters.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let stages = StageKind::ALL
            .iter()
            .map(|kind| {
                let counters = &self.stages[kind.index()];
                let succeeded = counters.succeeded.load(Ordering::Relaxed);
                let failed = counters.failed.load(Ordering::Relaxed);
                StageSnapshot {
                    stage: kind.name(),
                    succeeded,
                    failed,
                    avg_time_ms: avg_time_ms(counters.total_time_us.load(Ordering::Relaxed), succeeded + failed),
                }
            })
            .filter(|s| s.succeeded + s.failed > 0)
            .collect();

        MetricsSnapshot {
            items_started: self.items_started.load(Ordering::Relaxed),
            stages,
        }
    }
}

fn avg_time_ms(total_us: u64, count: usize) -> f64 {
    if count > 0 {
        total_us as f64 / count as f64 / 1000.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub items_started: usize,
    pub stages: Vec<StageSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageSnapshot {
    pub stage: &'static str,
    pub succeeded: usize,
    pub failed: usize,
    pub avg_time_ms: f64,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
