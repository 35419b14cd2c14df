//! Batch recompute across symbols on a bounded worker pool.
//!
//! Each (symbol, region) is an independent unit of work; recurrences stay
//! strictly sequential inside a unit. Failures are isolated per task and
//! reported in the summary instead of aborting the batch. The cancel flag
//! is honoured at symbol boundaries only, so a cancelled run leaves every
//! symbol either untouched or fully computed.

use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use tracing::{info, warn};

use crate::domain::error::EngineError;
use crate::domain::recompute::{RecomputeOutcome, RecomputeService};
use crate::domain::region::Region;
use crate::ports::indicator_store_port::IndicatorStorePort;
use crate::ports::price_store_port::PriceStorePort;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecomputeTask {
    pub symbol: String,
    pub region: Region,
}

impl RecomputeTask {
    pub fn new(symbol: impl Into<String>, region: Region) -> Self {
        Self {
            symbol: symbol.into(),
            region,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Succeeded(RecomputeOutcome),
    Skipped { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct TaskReport {
    pub task: RecomputeTask,
    pub outcome: TaskOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub reports: Vec<TaskReport>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, TaskOutcome::Succeeded(_)))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, TaskOutcome::Skipped { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, TaskOutcome::Failed { .. }))
            .count()
    }
}

/// Run every task on a pool of `workers` threads, retrying a task once if
/// a concurrent backfill raced the computation.
pub fn run_batch(
    prices: &(dyn PriceStorePort + Sync),
    indicators: &(dyn IndicatorStorePort + Sync),
    tasks: Vec<RecomputeTask>,
    workers: usize,
    cancel: &AtomicBool,
) -> Result<BatchSummary, EngineError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| EngineError::ConfigInvalid {
            section: "engine".into(),
            key: "workers".into(),
            reason: e.to_string(),
        })?;

    let reports: Vec<TaskReport> = pool.install(|| {
        tasks
            .into_par_iter()
            .map(|task| {
                if cancel.load(Ordering::SeqCst) {
                    return TaskReport {
                        task,
                        outcome: TaskOutcome::Skipped {
                            reason: "cancelled".into(),
                        },
                    };
                }
                let outcome = run_task(prices, indicators, &task);
                TaskReport { task, outcome }
            })
            .collect()
    });

    let summary = BatchSummary { reports };
    info!(
        succeeded = summary.succeeded(),
        skipped = summary.skipped(),
        failed = summary.failed(),
        "batch recompute finished"
    );
    Ok(summary)
}

fn run_task(
    prices: &(dyn PriceStorePort + Sync),
    indicators: &(dyn IndicatorStorePort + Sync),
    task: &RecomputeTask,
) -> TaskOutcome {
    let service = RecomputeService::new(prices, indicators);

    let mut result = service.recompute(&task.symbol, task.region);
    if let Err(EngineError::RecomputeConflict { .. }) = result {
        warn!(symbol = %task.symbol, region = %task.region, "recompute conflict, retrying once");
        result = service.recompute(&task.symbol, task.region);
    }

    match result {
        Ok(outcome) => TaskOutcome::Succeeded(outcome),
        Err(e @ EngineError::MissingData { .. }) => {
            warn!(symbol = %task.symbol, region = %task.region, "skipped: {e}");
            TaskOutcome::Skipped {
                reason: e.to_string(),
            }
        }
        Err(e) => {
            warn!(symbol = %task.symbol, region = %task.region, "failed: {e}");
            TaskOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}
