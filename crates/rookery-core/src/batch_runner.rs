//! Runs many records with bounded concurrency.
//!
//! Each record gets its own workflow run on its own task. A semaphore caps how
//! many runs are in flight. Outcomes are collected by the calling task in input
//! order, so the result never depends on completion order or on the
//! concurrency limit. A run that fails, or whose task panics, is reported as a
//! failed outcome and never affects its siblings.

use crate::config::{ConfigError, RookeryConfig};
use crate::orchestrator::{Orchestrator, Stages, WorkflowSettings};
use crate::workflow_run::{RunId, RunStatus, WorkflowRun};
use rookery_proto::{InputRecord, ReasonCode, RecordSource, Stage, StageError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Which records a batch should process.
#[derive(Debug, Clone)]
pub enum RecordSelection {
    /// Exactly these records, in this order.
    Explicit(Vec<InputRecord>),
    /// Everything the record source currently lists.
    DiscoverAll,
}

/// Final report for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub run_id: RunId,
    pub record: InputRecord,
    pub status: RunStatus,
    pub reason: Option<ReasonCode>,
    pub failed_stage: Option<Stage>,
    pub detail: Option<String>,
    pub output_path: Option<PathBuf>,
    /// Retries spent per gated stage. Stages without retries are omitted.
    #[serde(default)]
    pub retries: BTreeMap<Stage, u32>,
}

impl RecordOutcome {
    pub fn from_run(run: &WorkflowRun) -> Self {
        Self {
            run_id: run.id().clone(),
            record: run.record().clone(),
            status: run.status(),
            reason: run.reason(),
            failed_stage: run.failure().and_then(|f| f.stage),
            detail: run.failure().map(|f| f.detail.clone()),
            output_path: run.output_path().map(PathBuf::from),
            retries: run.retry_counts().clone(),
        }
    }

    /// A record that never produced a run.
    fn failed(run_id: RunId, record: InputRecord, reason: ReasonCode, detail: String) -> Self {
        Self {
            run_id,
            record,
            status: RunStatus::Failed,
            reason: Some(reason),
            failed_stage: None,
            detail: Some(detail),
            output_path: None,
            retries: BTreeMap::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// Aggregate result of a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// One outcome per input record, in input order.
    pub outcomes: Vec<RecordOutcome>,
}

impl BatchResult {
    pub fn from_outcomes(outcomes: Vec<RecordOutcome>) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        Self {
            total: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
            outcomes,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &RecordOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Process exit code: 0 when every record completed, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.is_success())
    }
}

/// Errors that stop a batch before any record runs.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Could not list records: {0}")]
    Discovery(#[source] StageError),
}

enum Slot {
    Running {
        run_id: RunId,
        record: InputRecord,
        handle: JoinHandle<WorkflowRun>,
    },
    Refused(RecordOutcome),
}

/// Runs a batch of records through one shared orchestrator.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    orchestrator: Arc<Orchestrator>,
    concurrency: usize,
}

impl BatchRunner {
    /// Creates a runner allowing `concurrency` runs in flight.
    pub fn new(orchestrator: Orchestrator, concurrency: usize) -> Result<Self, ConfigError> {
        if concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            concurrency,
        })
    }

    /// Validates `config` and builds a runner over `stages`.
    pub fn from_config(config: &RookeryConfig, stages: Stages) -> Result<Self, ConfigError> {
        config.validate()?;
        let orchestrator = Orchestrator::new(WorkflowSettings::from_config(config), stages);
        Self::new(orchestrator, config.batch.concurrency)
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Resolves `selection` against `source` and runs the result.
    pub async fn run_selection(
        &self,
        selection: RecordSelection,
        source: &dyn RecordSource,
    ) -> Result<BatchResult, BatchError> {
        let records = match selection {
            RecordSelection::Explicit(records) => records,
            RecordSelection::DiscoverAll => {
                let records = source.list_records().await.map_err(BatchError::Discovery)?;
                info!(count = records.len(), "Discovered records");
                records
            }
        };
        Ok(self.run(records).await)
    }

    /// Runs every record and returns one outcome per record, in input order.
    ///
    /// A record listed twice is refused with `ValidationError` the second
    /// time, since both runs would publish to the same path.
    pub async fn run(&self, records: Vec<InputRecord>) -> BatchResult {
        info!(
            records = records.len(),
            concurrency = self.concurrency,
            "Starting batch"
        );
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut claimed: HashMap<InputRecord, RunId> = HashMap::new();
        let mut slots = Vec::with_capacity(records.len());

        for (index, record) in records.into_iter().enumerate() {
            let run_id = RunId::for_batch(index, &record);
            if let Some(owner) = claimed.get(&record) {
                warn!(record = %record, owner = %owner, "Refusing duplicate record");
                let detail = format!("record '{record}' already queued as run {owner}");
                slots.push(Slot::Refused(RecordOutcome::failed(
                    run_id,
                    record,
                    ReasonCode::ValidationError,
                    detail,
                )));
                continue;
            }
            claimed.insert(record.clone(), run_id.clone());

            let orchestrator = Arc::clone(&self.orchestrator);
            let semaphore = Arc::clone(&semaphore);
            let task_id = run_id.clone();
            let task_record = record.clone();
            let handle = tokio::spawn(async move {
                // The semaphore is never closed, so acquiring only waits.
                let _permit = semaphore.acquire_owned().await.ok();
                debug!(run_id = %task_id, "Acquired run slot");
                orchestrator.run_with_id(task_id, task_record).await
            });
            slots.push(Slot::Running {
                run_id,
                record,
                handle,
            });
        }

        let mut outcomes = Vec::with_capacity(slots.len());
        for slot in slots {
            let outcome = match slot {
                Slot::Refused(outcome) => outcome,
                Slot::Running {
                    run_id,
                    record,
                    handle,
                } => match handle.await {
                    Ok(run) => RecordOutcome::from_run(&run),
                    Err(join_error) => {
                        warn!(run_id = %run_id, error = %join_error, "Workflow run aborted");
                        RecordOutcome::failed(
                            run_id,
                            record,
                            ReasonCode::Internal,
                            format!("workflow run aborted: {join_error}"),
                        )
                    }
                },
            };
            outcomes.push(outcome);
        }

        let result = BatchResult::from_outcomes(outcomes);
        info!(
            total = result.total,
            succeeded = result.succeeded,
            failed = result.failed,
            "Batch finished"
        );
        result
    }
}
