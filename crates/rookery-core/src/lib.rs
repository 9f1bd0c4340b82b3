//! # rookery-core
//!
//! Core orchestration for the Rookery content pipeline.
//!
//! This crate provides:
//! - Configuration loading and validation
//! - Quality gates that score research and drafts
//! - The per-record workflow state machine and its orchestrator
//! - The batch runner, which fans records out with bounded concurrency
//! - Run history and batch summaries
//! - Scripted collaborators for deterministic tests

mod batch_runner;
mod config;
mod history;
mod orchestrator;
mod quality_gate;
mod summary_writer;
pub mod testing;
mod workflow_run;

pub use batch_runner::{BatchError, BatchResult, BatchRunner, RecordOutcome, RecordSelection};
pub use config::{
    BatchConfig, CommitterConfig, ConfigError, ConfigWarning, GatesConfig, IllustratorConfig,
    PublisherConfig, ResearchConfig, RookeryConfig, WorkflowConfig, WriterConfig,
};
pub use history::{DEFAULT_HISTORY_PATH, HistoryError, HistoryRecord, RunHistory};
pub use orchestrator::{Orchestrator, Stages, WorkflowSettings};
pub use quality_gate::{Assessable, GateCriteria, GateDecision, QualityAssessment, QualityGate};
pub use summary_writer::SummaryWriter;
pub use workflow_run::{
    RunFailure, RunId, RunState, RunStatus, StageOutcome, StagePayload, StageResult, WorkflowRun,
};
