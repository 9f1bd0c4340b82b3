//! Per-record workflow state.
//!
//! A [`WorkflowRun`] is owned by exactly one orchestrator task while it is in
//! progress. Every state change goes through the methods here, which keep the
//! stage history append-only and the retry counters within bounds.

use crate::quality_gate::{GateDecision, QualityAssessment};
use chrono::{DateTime, Utc};
use rookery_proto::{
    CommitOutcome, DraftContent, ImageReference, InputRecord, PublishedArtifact, ReasonCode,
    ResearchSummary, Stage, StageError,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Identifier of a single workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Builds the id for the record at `index` in a batch.
    pub fn for_batch(index: usize, record: &InputRecord) -> Self {
        Self(format!("{:03}-{}", index + 1, record.slug()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position of a run in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Created,
    Researching,
    ResearchGate,
    Writing,
    ContentGate,
    Illustrating,
    Publishing,
    Committing,
    Completed,
    Failed,
}

impl RunState {
    /// Returns true for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }

    /// Returns the stage this state works on or gates.
    pub fn stage(self) -> Option<Stage> {
        match self {
            RunState::Researching | RunState::ResearchGate => Some(Stage::Research),
            RunState::Writing | RunState::ContentGate => Some(Stage::Write),
            RunState::Illustrating => Some(Stage::Illustrate),
            RunState::Publishing => Some(Stage::Publish),
            RunState::Committing => Some(Stage::Commit),
            RunState::Created | RunState::Completed | RunState::Failed => None,
        }
    }

    /// Returns the state that performs `stage`.
    pub fn working(stage: Stage) -> Self {
        match stage {
            Stage::Research => RunState::Researching,
            Stage::Write => RunState::Writing,
            Stage::Illustrate => RunState::Illustrating,
            Stage::Publish => RunState::Publishing,
            Stage::Commit => RunState::Committing,
        }
    }

    /// Returns the state entered once `stage` has been accepted.
    pub fn after(stage: Stage) -> Self {
        match stage {
            Stage::Research => RunState::Writing,
            Stage::Write => RunState::Illustrating,
            Stage::Illustrate => RunState::Publishing,
            Stage::Publish => RunState::Committing,
            Stage::Commit => RunState::Completed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Created => "created",
            RunState::Researching => "researching",
            RunState::ResearchGate => "research_gate",
            RunState::Writing => "writing",
            RunState::ContentGate => "content_gate",
            RunState::Illustrating => "illustrating",
            RunState::Publishing => "publishing",
            RunState::Committing => "committing",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally reported status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a single stage attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Accepted,
    RetriedWithFeedback,
    Rejected,
}

/// What a stage attempt produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum StagePayload {
    Research(ResearchSummary),
    Draft(DraftContent),
    Image(ImageReference),
    Published(PublishedArtifact),
    Commit(CommitOutcome),
    /// The attempt produced nothing: it errored or the stage was skipped.
    Empty,
}

/// One entry in a run's stage history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: Stage,
    /// 1-based attempt number within the stage.
    pub attempt: u32,
    pub payload: StagePayload,
    /// Present for gated stages that produced output.
    pub assessment: Option<QualityAssessment>,
    pub outcome: StageOutcome,
    /// Error message or skip reason.
    pub note: Option<String>,
}

/// Why a run failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub reason: ReasonCode,
    pub stage: Option<Stage>,
    pub detail: String,
}

/// One record's trip through the pipeline.
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    id: RunId,
    record: InputRecord,
    state: RunState,
    status: RunStatus,
    history: Vec<StageResult>,
    retries: BTreeMap<Stage, u32>,
    pending: Option<StagePayload>,
    feedback: Option<String>,
    failure: Option<RunFailure>,
    completion_note: Option<ReasonCode>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    pub fn new(id: RunId, record: InputRecord) -> Self {
        Self {
            id,
            record,
            state: RunState::Created,
            status: RunStatus::Pending,
            history: Vec::new(),
            retries: BTreeMap::new(),
            pending: None,
            feedback: None,
            failure: None,
            completion_note: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn id(&self) -> &RunId {
        &self.id
    }

    pub fn record(&self) -> &InputRecord {
        &self.record
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Every stage attempt, oldest first.
    pub fn history(&self) -> &[StageResult] {
        &self.history
    }

    /// Returns the retries spent on `stage`.
    pub fn retry_count(&self, stage: Stage) -> u32 {
        self.retries.get(&stage).copied().unwrap_or(0)
    }

    /// Returns all non-zero retry counters.
    pub fn retry_counts(&self) -> &BTreeMap<Stage, u32> {
        &self.retries
    }

    /// Feedback from the last rejected attempt of the current stage.
    pub fn feedback(&self) -> Option<&str> {
        self.feedback.as_deref()
    }

    /// Output of the current stage awaiting its gate.
    pub fn pending(&self) -> Option<&StagePayload> {
        self.pending.as_ref()
    }

    pub fn failure(&self) -> Option<&RunFailure> {
        self.failure.as_ref()
    }

    /// Returns the failure reason, or the completion note for a completed run.
    pub fn reason(&self) -> Option<ReasonCode> {
        self.failure
            .as_ref()
            .map(|f| f.reason)
            .or(self.completion_note)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    fn accepted(&self, stage: Stage) -> Option<&StagePayload> {
        self.history
            .iter()
            .rev()
            .find(|r| r.stage == stage && r.outcome == StageOutcome::Accepted)
            .map(|r| &r.payload)
    }

    /// Accepted research, if the run got that far.
    pub fn research(&self) -> Option<&ResearchSummary> {
        match self.accepted(Stage::Research) {
            Some(StagePayload::Research(summary)) => Some(summary),
            _ => None,
        }
    }

    /// Accepted draft, if the run got that far.
    pub fn draft(&self) -> Option<&DraftContent> {
        match self.accepted(Stage::Write) {
            Some(StagePayload::Draft(draft)) => Some(draft),
            _ => None,
        }
    }

    /// Generated image, if an illustrator produced one.
    pub fn image(&self) -> Option<&ImageReference> {
        match self.accepted(Stage::Illustrate) {
            Some(StagePayload::Image(image)) => Some(image),
            _ => None,
        }
    }

    /// Published artifact, if publishing succeeded.
    pub fn published(&self) -> Option<&PublishedArtifact> {
        match self.accepted(Stage::Publish) {
            Some(StagePayload::Published(artifact)) => Some(artifact),
            _ => None,
        }
    }

    /// Commit outcome, if a committer ran.
    pub fn commit(&self) -> Option<&CommitOutcome> {
        match self.accepted(Stage::Commit) {
            Some(StagePayload::Commit(outcome)) => Some(outcome),
            _ => None,
        }
    }

    /// Output path of the published artifact.
    pub fn output_path(&self) -> Option<&Path> {
        self.published().map(|artifact| artifact.path.as_path())
    }

    fn attempt(&self, stage: Stage) -> u32 {
        if stage.is_gated() {
            self.retry_count(stage) + 1
        } else {
            1
        }
    }

    fn current_stage(&self) -> Stage {
        // Only called from stage states; Research is never reached otherwise.
        self.state.stage().unwrap_or(Stage::Research)
    }

    /// Moves a new run into the research stage.
    pub fn begin(&mut self) {
        if self.state == RunState::Created {
            self.state = RunState::Researching;
            self.status = RunStatus::InProgress;
        }
    }

    /// Hands the output of a gated stage to its gate.
    pub fn submit(&mut self, payload: StagePayload) {
        self.pending = Some(payload);
        self.state = match self.state {
            RunState::Researching => RunState::ResearchGate,
            RunState::Writing => RunState::ContentGate,
            other => other,
        };
    }

    /// Applies a gate assessment to the pending payload.
    pub fn apply_gate(&mut self, assessment: QualityAssessment, max_retries: u32) -> GateDecision {
        let stage = self.current_stage();
        let retries_used = self.retry_count(stage);
        let decision = GateDecision::decide(assessment.passed, retries_used, max_retries);
        let payload = self.pending.take().unwrap_or(StagePayload::Empty);
        let attempt = self.attempt(stage);

        match decision {
            GateDecision::Advance => {
                self.history.push(StageResult {
                    stage,
                    attempt,
                    payload,
                    assessment: Some(assessment),
                    outcome: StageOutcome::Accepted,
                    note: None,
                });
                self.feedback = None;
                self.state = RunState::after(stage);
            }
            GateDecision::Retry => {
                self.feedback = Some(assessment.feedback.clone());
                self.history.push(StageResult {
                    stage,
                    attempt,
                    payload,
                    assessment: Some(assessment),
                    outcome: StageOutcome::RetriedWithFeedback,
                    note: None,
                });
                *self.retries.entry(stage).or_insert(0) += 1;
                self.state = RunState::working(stage);
            }
            GateDecision::Reject => {
                let detail = format!(
                    "{stage} scored {:.2}, below {:.2}: {}",
                    assessment.score, assessment.threshold, assessment.feedback
                );
                self.history.push(StageResult {
                    stage,
                    attempt,
                    payload,
                    assessment: Some(assessment),
                    outcome: StageOutcome::Rejected,
                    note: None,
                });
                self.fail(ReasonCode::QualityBelowThreshold, Some(stage), detail);
            }
        }
        decision
    }

    /// Records a collaborator error for the current stage.
    ///
    /// Retryable errors on a gated stage spend a retry while any remain. Every
    /// other error ends the run with the error's reason code.
    pub fn apply_error(&mut self, error: &StageError, max_retries: u32) -> GateDecision {
        let stage = self.current_stage();
        let retries_used = self.retry_count(stage);
        let decision = if stage.is_gated() && error.is_retryable() {
            GateDecision::decide(false, retries_used, max_retries)
        } else {
            GateDecision::Reject
        };
        let attempt = self.attempt(stage);
        self.pending = None;

        match decision {
            GateDecision::Retry => {
                self.history.push(StageResult {
                    stage,
                    attempt,
                    payload: StagePayload::Empty,
                    assessment: None,
                    outcome: StageOutcome::RetriedWithFeedback,
                    note: Some(error.to_string()),
                });
                *self.retries.entry(stage).or_insert(0) += 1;
                self.state = RunState::working(stage);
            }
            GateDecision::Advance | GateDecision::Reject => {
                self.history.push(StageResult {
                    stage,
                    attempt,
                    payload: StagePayload::Empty,
                    assessment: None,
                    outcome: StageOutcome::Rejected,
                    note: Some(error.to_string()),
                });
                self.fail(error.reason_code(), Some(stage), error.to_string());
            }
        }
        decision
    }

    /// Accepts the output of an ungated stage and moves on.
    pub fn accept(&mut self, payload: StagePayload) {
        let stage = self.current_stage();
        self.history.push(StageResult {
            stage,
            attempt: self.attempt(stage),
            payload,
            assessment: None,
            outcome: StageOutcome::Accepted,
            note: None,
        });
        self.feedback = None;
        self.advance_from(stage);
    }

    /// Skips an optional stage that has no collaborator.
    pub fn skip(&mut self, why: impl Into<String>) {
        let stage = self.current_stage();
        self.history.push(StageResult {
            stage,
            attempt: 1,
            payload: StagePayload::Empty,
            assessment: None,
            outcome: StageOutcome::Accepted,
            note: Some(why.into()),
        });
        self.advance_from(stage);
    }

    /// Rejects a stage output without retry.
    pub fn reject(&mut self, payload: StagePayload, reason: ReasonCode, detail: impl Into<String>) {
        let stage = self.current_stage();
        let detail = detail.into();
        self.history.push(StageResult {
            stage,
            attempt: self.attempt(stage),
            payload,
            assessment: None,
            outcome: StageOutcome::Rejected,
            note: Some(detail.clone()),
        });
        self.fail(reason, Some(stage), detail);
    }

    /// Marks the run completed with an informational note.
    pub fn note_completion(&mut self, note: ReasonCode) {
        self.completion_note = Some(note);
    }

    /// Fails the run outright.
    pub fn fail(&mut self, reason: ReasonCode, stage: Option<Stage>, detail: impl Into<String>) {
        if self.state.is_terminal() {
            return;
        }
        self.failure = Some(RunFailure {
            reason,
            stage,
            detail: detail.into(),
        });
        self.pending = None;
        self.state = RunState::Failed;
        self.status = RunStatus::Failed;
        self.finished_at = Some(Utc::now());
    }

    fn advance_from(&mut self, stage: Stage) {
        self.state = RunState::after(stage);
        if self.state == RunState::Completed {
            self.status = RunStatus::Completed;
            self.finished_at = Some(Utc::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run() -> WorkflowRun {
        let mut run = WorkflowRun::new(RunId::new("001-2026-02-02"), InputRecord::parse("2026-02-02"));
        run.begin();
        run
    }

    fn assessment(passed: bool) -> QualityAssessment {
        QualityAssessment {
            score: if passed { 1.0 } else { 0.0 },
            threshold: 0.5,
            passed,
            feedback: if passed { "fine" } else { "needs headings" }.to_string(),
        }
    }

    #[test]
    fn test_new_run_is_pending() {
        let run = WorkflowRun::new(RunId::new("x"), InputRecord::parse("a.json"));
        assert_eq!(run.state(), RunState::Created);
        assert_eq!(run.status(), RunStatus::Pending);
        assert!(run.history().is_empty());
    }

    #[test]
    fn test_gate_retry_then_accept() {
        let mut run = run();
        run.submit(StagePayload::Research(ResearchSummary::new("short")));
        assert_eq!(run.state(), RunState::ResearchGate);

        assert_eq!(run.apply_gate(assessment(false), 2), GateDecision::Retry);
        assert_eq!(run.state(), RunState::Researching);
        assert_eq!(run.feedback(), Some("needs headings"));
        assert_eq!(run.retry_count(Stage::Research), 1);

        run.submit(StagePayload::Research(ResearchSummary::new("## long")));
        assert_eq!(run.apply_gate(assessment(true), 2), GateDecision::Advance);
        assert_eq!(run.state(), RunState::Writing);
        assert_eq!(run.feedback(), None);
        assert_eq!(run.research().map(|r| r.summary.as_str()), Some("## long"));

        let attempts: Vec<u32> = run.history().iter().map(|r| r.attempt).collect();
        assert_eq!(attempts, vec![1, 2]);
    }

    #[test]
    fn test_gate_rejects_after_retries_exhausted() {
        let mut run = run();
        for _ in 0..2 {
            run.submit(StagePayload::Research(ResearchSummary::default()));
            assert_eq!(run.apply_gate(assessment(false), 2), GateDecision::Retry);
        }
        run.submit(StagePayload::Research(ResearchSummary::default()));
        assert_eq!(run.apply_gate(assessment(false), 2), GateDecision::Reject);

        assert_eq!(run.status(), RunStatus::Failed);
        assert_eq!(run.reason(), Some(ReasonCode::QualityBelowThreshold));
        assert_eq!(run.retry_count(Stage::Research), 2);
        let outcomes: Vec<StageOutcome> = run.history().iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                StageOutcome::RetriedWithFeedback,
                StageOutcome::RetriedWithFeedback,
                StageOutcome::Rejected
            ]
        );
    }

    #[test]
    fn test_transient_error_on_gated_stage_retries() {
        let mut run = run();
        let err = StageError::Transient("503".into());
        assert_eq!(run.apply_error(&err, 1), GateDecision::Retry);
        assert_eq!(run.state(), RunState::Researching);
        assert_eq!(run.apply_error(&err, 1), GateDecision::Reject);
        assert_eq!(run.reason(), Some(ReasonCode::TransientApiError));
        assert_eq!(run.retry_count(Stage::Research), 1);
    }

    #[test]
    fn test_terminal_error_fails_immediately() {
        let mut run = run();
        let err = StageError::data_unavailable("2026-02-02", "no files");
        assert_eq!(run.apply_error(&err, 5), GateDecision::Reject);
        assert_eq!(run.reason(), Some(ReasonCode::DataUnavailable));
        assert_eq!(run.retry_count(Stage::Research), 0);
        assert_eq!(run.failure().and_then(|f| f.stage), Some(Stage::Research));
    }

    #[test]
    fn test_skip_and_accept_reach_completed() {
        let mut run = run();
        run.submit(StagePayload::Research(ResearchSummary::default()));
        run.apply_gate(assessment(true), 0);
        run.submit(StagePayload::Draft(DraftContent::default()));
        run.apply_gate(assessment(true), 0);
        assert_eq!(run.state(), RunState::Illustrating);
        run.skip("no illustrator configured");
        assert_eq!(run.state(), RunState::Publishing);
        run.accept(StagePayload::Published(PublishedArtifact::default()));
        run.accept(StagePayload::Commit(CommitOutcome::NoChanges));
        run.note_completion(ReasonCode::NoChangesToCommit);

        assert_eq!(run.state(), RunState::Completed);
        assert_eq!(run.status(), RunStatus::Completed);
        assert_eq!(run.reason(), Some(ReasonCode::NoChangesToCommit));
        assert!(run.image().is_none());
        assert!(run.finished_at().is_some());
    }

    #[test]
    fn test_fail_is_sticky() {
        let mut run = run();
        run.fail(ReasonCode::Internal, None, "boom");
        run.fail(ReasonCode::ValidationError, None, "later");
        assert_eq!(run.reason(), Some(ReasonCode::Internal));
    }

    #[test]
    fn test_run_id_for_batch() {
        let id = RunId::for_batch(6, &InputRecord::parse("Feeder Cam.csv"));
        assert!(id.as_str().starts_with("007-feeder-cam-csv__"));
    }
}
