//! Drives a single record through the pipeline.
//!
//! The orchestrator owns no per-record state. Each call to
//! [`Orchestrator::run_record`] creates a fresh [`WorkflowRun`] and steps it
//! until it reaches `Completed` or `Failed`. Collaborator errors never escape:
//! they are recorded on the run.

use crate::config::RookeryConfig;
use crate::quality_gate::{Assessable, GateCriteria, QualityAssessment, QualityGate};
use crate::workflow_run::{RunId, RunState, StagePayload, WorkflowRun};
use rookery_proto::{
    CommitOutcome, Committer, Illustrator, InputRecord, PublishedArtifact, Publisher, ReasonCode,
    Researcher, Stage, StageError, Writer,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{Instrument, debug, info, info_span, warn};

/// The collaborators a run calls, one per stage.
///
/// Illustrator and committer are optional; a missing one is skipped.
#[derive(Clone)]
pub struct Stages {
    researcher: Arc<dyn Researcher>,
    writer: Arc<dyn Writer>,
    illustrator: Option<Arc<dyn Illustrator>>,
    publisher: Arc<dyn Publisher>,
    committer: Option<Arc<dyn Committer>>,
}

impl Stages {
    pub fn new(
        researcher: Arc<dyn Researcher>,
        writer: Arc<dyn Writer>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            researcher,
            writer,
            illustrator: None,
            publisher,
            committer: None,
        }
    }

    #[must_use]
    pub fn with_illustrator(mut self, illustrator: Arc<dyn Illustrator>) -> Self {
        self.illustrator = Some(illustrator);
        self
    }

    #[must_use]
    pub fn with_committer(mut self, committer: Arc<dyn Committer>) -> Self {
        self.committer = Some(committer);
        self
    }

    pub fn has_illustrator(&self) -> bool {
        self.illustrator.is_some()
    }

    pub fn has_committer(&self) -> bool {
        self.committer.is_some()
    }
}

impl std::fmt::Debug for Stages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stages")
            .field("illustrator", &self.has_illustrator())
            .field("committer", &self.has_committer())
            .finish_non_exhaustive()
    }
}

/// Limits and gate criteria a run is executed under.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub max_retries: u32,
    pub stage_timeout: Duration,
    pub required_metadata: Vec<String>,
    pub research_gate: GateCriteria,
    pub content_gate: GateCriteria,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self::from_config(&RookeryConfig::default())
    }
}

impl WorkflowSettings {
    pub fn from_config(config: &RookeryConfig) -> Self {
        Self {
            max_retries: config.workflow.max_retries,
            stage_timeout: config.workflow.stage_timeout(),
            required_metadata: config.workflow.required_metadata.clone(),
            research_gate: config.gates.research.clone(),
            content_gate: config.gates.content.clone(),
        }
    }
}

/// Runs records through research, write, illustrate, publish and commit.
#[derive(Debug)]
pub struct Orchestrator {
    settings: WorkflowSettings,
    stages: Stages,
    research_gate: QualityGate,
    content_gate: QualityGate,
    commit_lock: Arc<Mutex<()>>,
}

impl Orchestrator {
    pub fn new(settings: WorkflowSettings, stages: Stages) -> Self {
        let research_gate = QualityGate::new("research", settings.research_gate.clone());
        let content_gate = QualityGate::new("content", settings.content_gate.clone());
        Self {
            settings,
            stages,
            research_gate,
            content_gate,
            commit_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Shares a commit lock with other orchestrators.
    ///
    /// Commits made under the same lock never overlap.
    #[must_use]
    pub fn with_commit_lock(mut self, lock: Arc<Mutex<()>>) -> Self {
        self.commit_lock = lock;
        self
    }

    pub fn commit_lock(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.commit_lock)
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub fn stages(&self) -> &Stages {
        &self.stages
    }

    /// Runs `record` to a terminal state.
    pub async fn run_record(&self, record: InputRecord) -> WorkflowRun {
        let id = RunId::new(record.slug());
        self.run_with_id(id, record).await
    }

    /// Runs `record` to a terminal state under a caller-chosen id.
    pub async fn run_with_id(&self, id: RunId, record: InputRecord) -> WorkflowRun {
        let span = info_span!("workflow_run", run_id = %id, record = %record);
        let mut run = WorkflowRun::new(id, record);
        async {
            self.drive(&mut run).await;
            match run.failure() {
                None => info!(
                    status = %run.status(),
                    reason = run.reason().map(ReasonCode::as_str),
                    "Workflow run finished"
                ),
                Some(failure) => warn!(
                    reason = %failure.reason,
                    stage = failure.stage.map(Stage::as_str),
                    detail = %failure.detail,
                    "Workflow run failed"
                ),
            }
        }
        .instrument(span)
        .await;
        run
    }

    /// Steps `run` until it is terminal.
    pub async fn drive(&self, run: &mut WorkflowRun) {
        while !run.state().is_terminal() {
            self.step(run).await;
        }
    }

    async fn step(&self, run: &mut WorkflowRun) {
        let max_retries = self.settings.max_retries;
        debug!(state = %run.state(), "Stepping workflow run");

        match run.state() {
            RunState::Created => run.begin(),

            RunState::Researching => {
                let result = self
                    .call(
                        Stage::Research,
                        self.stages.researcher.research(run.record(), run.feedback()),
                    )
                    .await;
                match result {
                    Ok(summary) => run.submit(StagePayload::Research(summary)),
                    Err(err) => self.record_error(run, &err, max_retries),
                }
            }

            RunState::ResearchGate => {
                let assessment = self.assess_pending(run, &self.research_gate);
                run.apply_gate(assessment, max_retries);
            }

            RunState::Writing => {
                let Some(research) = run.research().cloned() else {
                    run.fail(
                        ReasonCode::Internal,
                        Some(Stage::Write),
                        "no accepted research to write from",
                    );
                    return;
                };
                let result = self
                    .call(
                        Stage::Write,
                        self.stages.writer.write(&research, run.feedback()),
                    )
                    .await;
                match result {
                    Ok(draft) => run.submit(StagePayload::Draft(draft)),
                    Err(err) => self.record_error(run, &err, max_retries),
                }
            }

            RunState::ContentGate => {
                let assessment = self.assess_pending(run, &self.content_gate);
                run.apply_gate(assessment, max_retries);
            }

            RunState::Illustrating => {
                let Some(illustrator) = &self.stages.illustrator else {
                    run.skip("no illustrator configured");
                    return;
                };
                let Some(draft) = run.draft() else {
                    run.fail(ReasonCode::Internal, Some(Stage::Illustrate), "no accepted draft");
                    return;
                };
                let result = self
                    .call(Stage::Illustrate, illustrator.illustrate(run.record(), draft))
                    .await;
                match result {
                    Ok(image) => run.accept(StagePayload::Image(image)),
                    Err(err) => self.record_error(run, &err, max_retries),
                }
            }

            RunState::Publishing => {
                let Some(draft) = run.draft() else {
                    run.fail(ReasonCode::Internal, Some(Stage::Publish), "no accepted draft");
                    return;
                };
                let result = self
                    .call(
                        Stage::Publish,
                        self.stages.publisher.publish(run.record(), draft, run.image()),
                    )
                    .await;
                match result {
                    Ok(artifact) => match self.validate_artifact(&artifact) {
                        Ok(()) => run.accept(StagePayload::Published(artifact)),
                        Err(problem) => {
                            run.reject(
                                StagePayload::Published(artifact),
                                ReasonCode::ValidationError,
                                problem,
                            );
                        }
                    },
                    Err(err) => self.record_error(run, &err, max_retries),
                }
            }

            RunState::Committing => {
                let Some(committer) = &self.stages.committer else {
                    run.skip("no committer configured");
                    return;
                };
                let Some(artifact) = run.published().cloned() else {
                    run.fail(ReasonCode::Internal, Some(Stage::Commit), "nothing was published");
                    return;
                };
                let result = {
                    let _guard = self.commit_lock.lock().await;
                    self.call(Stage::Commit, committer.commit(&artifact)).await
                };
                match result {
                    Ok(outcome) => {
                        let no_changes = outcome == CommitOutcome::NoChanges;
                        run.accept(StagePayload::Commit(outcome));
                        if no_changes {
                            run.note_completion(ReasonCode::NoChangesToCommit);
                        }
                    }
                    Err(err) => self.record_error(run, &err, max_retries),
                }
            }

            RunState::Completed | RunState::Failed => {}
        }
    }

    /// Awaits a collaborator call, failing it with `Timeout` past the stage timeout.
    async fn call<T, F>(&self, stage: Stage, fut: F) -> Result<T, StageError>
    where
        F: Future<Output = Result<T, StageError>>,
    {
        let after = self.settings.stage_timeout;
        match tokio::time::timeout(after, fut).await {
            Ok(result) => result,
            Err(_) => Err(StageError::Timeout { stage, after }),
        }
    }

    fn record_error(&self, run: &mut WorkflowRun, err: &StageError, max_retries: u32) {
        let stage = run.state().stage();
        let decision = run.apply_error(err, max_retries);
        debug!(
            stage = stage.map(Stage::as_str),
            error = %err,
            decision = ?decision,
            "Stage call failed"
        );
    }

    fn assess_pending(&self, run: &WorkflowRun, gate: &QualityGate) -> QualityAssessment {
        let assessment = match run.pending() {
            Some(StagePayload::Research(summary)) => gate.assess(summary),
            Some(StagePayload::Draft(draft)) => gate.assess(draft),
            _ => gate.assess(&EmptyOutput),
        };
        debug!(
            gate = gate.name(),
            score = assessment.score,
            threshold = assessment.threshold,
            passed = assessment.passed,
            "Quality gate assessed output"
        );
        assessment
    }

    /// Checks that a published artifact carries its required metadata and a body.
    fn validate_artifact(&self, artifact: &PublishedArtifact) -> Result<(), String> {
        let missing: Vec<&str> = self
            .settings
            .required_metadata
            .iter()
            .map(String::as_str)
            .filter(|key| artifact.field(key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(format!(
                "{} is missing required metadata: {}",
                artifact.path.display(),
                missing.join(", ")
            ));
        }
        if artifact.body.trim().is_empty() {
            return Err(format!("{} has an empty body", artifact.path.display()));
        }
        Ok(())
    }
}

/// Stand-in scored when a gate has nothing to assess.
struct EmptyOutput;

impl Assessable for EmptyOutput {
    fn field(&self, _name: &str) -> Option<String> {
        None
    }

    fn text(&self) -> String {
        String::new()
    }
}
