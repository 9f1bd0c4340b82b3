//! Single-record workflow tests.
//!
//! Covers:
//! - Happy path with optional stages absent
//! - Gate retries with feedback, and retry exhaustion
//! - Timeouts and terminal collaborator errors
//! - Post-publish validation
//! - Commit outcomes

use rookery_core::testing::{
    RecordingPublisher, Script, ScriptedCommitter, ScriptedIllustrator, ScriptedResearcher,
    ScriptedWriter, sample_draft, sample_research, thin_draft,
};
use rookery_core::{
    GateCriteria, Orchestrator, RunState, RunStatus, StageOutcome, StagePayload, Stages,
    WorkflowSettings,
};
use rookery_proto::{
    CommitOutcome, CommitReference, ImageReference, InputRecord, ReasonCode, ResearchSummary,
    Stage, StageError,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

fn strict_content_gate() -> GateCriteria {
    GateCriteria {
        min_score: 0.8,
        min_length: 200,
        required_fields: vec![
            "headline".to_string(),
            "introduction".to_string(),
            "body".to_string(),
            "conclusion".to_string(),
        ],
        required_markers: vec![],
    }
}

fn settings(max_retries: u32) -> WorkflowSettings {
    WorkflowSettings {
        max_retries,
        stage_timeout: Duration::from_secs(5),
        required_metadata: vec!["title".to_string(), "date".to_string()],
        research_gate: GateCriteria::default(),
        content_gate: strict_content_gate(),
    }
}

fn record() -> InputRecord {
    InputRecord::parse("2026-02-02")
}

fn outcomes_for(run: &rookery_core::WorkflowRun, stage: Stage) -> Vec<StageOutcome> {
    run.history()
        .iter()
        .filter(|r| r.stage == stage)
        .map(|r| r.outcome)
        .collect()
}

#[tokio::test]
async fn test_completes_without_optional_stages() {
    let publisher = Arc::new(RecordingPublisher::default());
    let stages = Stages::new(
        Arc::new(ScriptedResearcher::always(sample_research())),
        Arc::new(ScriptedWriter::always(sample_draft("Finch Frenzy"))),
        publisher.clone(),
    );
    let run = Orchestrator::new(settings(2), stages)
        .run_record(record())
        .await;

    assert_eq!(run.state(), RunState::Completed);
    assert_eq!(run.status(), RunStatus::Completed);
    assert_eq!(run.reason(), None);
    assert_eq!(
        run.output_path(),
        Some(Path::new("content/posts/2026-02-02.md"))
    );
    assert_eq!(publisher.calls(), 1);

    let stages: Vec<Stage> = run.history().iter().map(|r| r.stage).collect();
    assert_eq!(stages, Stage::ALL.to_vec());
    assert!(
        run.history()
            .iter()
            .all(|r| r.outcome == StageOutcome::Accepted)
    );

    let illustrate = &run.history()[2];
    assert_eq!(illustrate.payload, StagePayload::Empty);
    assert_eq!(illustrate.note.as_deref(), Some("no illustrator configured"));
}

#[tokio::test]
async fn test_writer_never_improves_exhausts_retries() {
    let writer = Arc::new(ScriptedWriter::always(thin_draft("Birds")));
    let publisher = Arc::new(RecordingPublisher::default());
    let stages = Stages::new(
        Arc::new(ScriptedResearcher::always(sample_research())),
        writer.clone(),
        publisher.clone(),
    );
    let run = Orchestrator::new(settings(2), stages)
        .run_record(record())
        .await;

    assert_eq!(run.status(), RunStatus::Failed);
    assert_eq!(run.reason(), Some(ReasonCode::QualityBelowThreshold));
    assert_eq!(run.retry_count(Stage::Write), 2);
    assert_eq!(
        outcomes_for(&run, Stage::Write),
        vec![
            StageOutcome::RetriedWithFeedback,
            StageOutcome::RetriedWithFeedback,
            StageOutcome::Rejected
        ]
    );
    assert_eq!(writer.calls(), 3);
    assert_eq!(publisher.calls(), 0);

    let feedback = writer.feedback_seen();
    assert_eq!(feedback[0], None);
    assert!(
        feedback[1]
            .as_deref()
            .is_some_and(|f| f.contains("missing required fields"))
    );
    let failure = run.failure().unwrap();
    assert_eq!(failure.stage, Some(Stage::Write));
    assert!(failure.detail.contains("introduction"));
}

#[tokio::test]
async fn test_research_retry_passes_feedback() {
    let researcher = Arc::new(ScriptedResearcher::new(Script::new(vec![
        Ok(ResearchSummary::new("plain notes")),
        Ok(sample_research()),
    ])));
    let mut settings = settings(2);
    settings.research_gate = GateCriteria {
        min_score: 1.0,
        required_markers: vec!["##".to_string()],
        ..Default::default()
    };
    let stages = Stages::new(
        researcher.clone(),
        Arc::new(ScriptedWriter::always(sample_draft("Finch Frenzy"))),
        Arc::new(RecordingPublisher::default()),
    );
    let run = Orchestrator::new(settings, stages)
        .run_record(record())
        .await;

    assert_eq!(run.status(), RunStatus::Completed);
    assert_eq!(run.retry_count(Stage::Research), 1);
    assert_eq!(
        researcher.feedback_seen(),
        vec![None, Some("missing expected marker '##'".to_string())]
    );
    assert_eq!(
        run.research().and_then(|r| r.fact("total_detections")),
        Some("42")
    );
}

#[tokio::test]
async fn test_zero_retries_rejects_first_failure() {
    let writer = Arc::new(ScriptedWriter::always(thin_draft("Birds")));
    let stages = Stages::new(
        Arc::new(ScriptedResearcher::always(sample_research())),
        writer.clone(),
        Arc::new(RecordingPublisher::default()),
    );
    let run = Orchestrator::new(settings(0), stages)
        .run_record(record())
        .await;

    assert_eq!(run.reason(), Some(ReasonCode::QualityBelowThreshold));
    assert_eq!(writer.calls(), 1);
    assert_eq!(run.retry_count(Stage::Write), 0);
}

#[tokio::test]
async fn test_research_timeout_retries_then_fails_transient() {
    let researcher =
        Arc::new(ScriptedResearcher::always(sample_research()).with_delay(Duration::from_millis(500)));
    let mut settings = settings(1);
    settings.stage_timeout = Duration::from_millis(20);
    let stages = Stages::new(
        researcher.clone(),
        Arc::new(ScriptedWriter::always(sample_draft("Finch Frenzy"))),
        Arc::new(RecordingPublisher::default()),
    );
    let run = Orchestrator::new(settings, stages)
        .run_record(record())
        .await;

    assert_eq!(run.status(), RunStatus::Failed);
    assert_eq!(run.reason(), Some(ReasonCode::TransientApiError));
    assert_eq!(run.retry_count(Stage::Research), 1);
    assert_eq!(researcher.feedback_seen().len(), 2);
    assert!(
        run.failure()
            .is_some_and(|f| f.detail.contains("timed out"))
    );
}

#[tokio::test]
async fn test_commit_timeout_is_terminal() {
    let committer = Arc::new(
        ScriptedCommitter::always(CommitOutcome::NoChanges).with_delay(Duration::from_millis(500)),
    );
    let mut settings = settings(2);
    settings.stage_timeout = Duration::from_millis(20);
    let stages = Stages::new(
        Arc::new(ScriptedResearcher::always(sample_research())),
        Arc::new(ScriptedWriter::always(sample_draft("Finch Frenzy"))),
        Arc::new(RecordingPublisher::default()),
    )
    .with_committer(committer.clone());
    let run = Orchestrator::new(settings, stages)
        .run_record(record())
        .await;

    assert_eq!(run.status(), RunStatus::Failed);
    assert_eq!(run.reason(), Some(ReasonCode::TransientApiError));
    assert_eq!(committer.calls(), 1);
    assert_eq!(run.retry_count(Stage::Commit), 0);
    let failure = run.failure().unwrap();
    assert_eq!(failure.stage, Some(Stage::Commit));
    assert!(failure.detail.contains("timed out"));
}

#[tokio::test]
async fn test_missing_field_fails_gate_at_default_threshold() {
    let mut draft = sample_draft("Finch Frenzy");
    draft.conclusion.clear();
    let writer = Arc::new(ScriptedWriter::always(draft));
    let publisher = Arc::new(RecordingPublisher::default());
    let mut settings = settings(1);
    settings.content_gate = GateCriteria {
        required_fields: vec!["headline".to_string(), "conclusion".to_string()],
        ..Default::default()
    };
    let stages = Stages::new(
        Arc::new(ScriptedResearcher::always(sample_research())),
        writer.clone(),
        publisher.clone(),
    );
    let run = Orchestrator::new(settings, stages)
        .run_record(record())
        .await;

    assert_eq!(run.status(), RunStatus::Failed);
    assert_eq!(run.reason(), Some(ReasonCode::QualityBelowThreshold));
    assert_eq!(
        outcomes_for(&run, Stage::Write),
        vec![StageOutcome::RetriedWithFeedback, StageOutcome::Rejected]
    );
    assert_eq!(writer.calls(), 2);
    assert_eq!(publisher.calls(), 0);
    assert!(
        writer.feedback_seen()[1]
            .as_deref()
            .is_some_and(|f| f.contains("conclusion"))
    );
}

#[tokio::test]
async fn test_transient_writer_error_recovers() {
    let writer = Arc::new(ScriptedWriter::new(Script::new(vec![
        Err(StageError::Transient("503 Service Unavailable".into())),
        Ok(sample_draft("Finch Frenzy")),
    ])));
    let stages = Stages::new(
        Arc::new(ScriptedResearcher::always(sample_research())),
        writer.clone(),
        Arc::new(RecordingPublisher::default()),
    );
    let run = Orchestrator::new(settings(2), stages)
        .run_record(record())
        .await;

    assert_eq!(run.status(), RunStatus::Completed);
    assert_eq!(run.retry_count(Stage::Write), 1);
    assert_eq!(
        outcomes_for(&run, Stage::Write),
        vec![StageOutcome::RetriedWithFeedback, StageOutcome::Accepted]
    );
}

#[tokio::test]
async fn test_content_policy_is_terminal() {
    let writer = Arc::new(ScriptedWriter::new(Script::failing(
        StageError::ContentPolicy("refused".into()),
    )));
    let stages = Stages::new(
        Arc::new(ScriptedResearcher::always(sample_research())),
        writer.clone(),
        Arc::new(RecordingPublisher::default()),
    );
    let run = Orchestrator::new(settings(3), stages)
        .run_record(record())
        .await;

    assert_eq!(run.reason(), Some(ReasonCode::ContentPolicyError));
    assert_eq!(writer.calls(), 1);
    assert_eq!(run.retry_count(Stage::Write), 0);
}

#[tokio::test]
async fn test_data_unavailable_is_terminal() {
    let researcher = Arc::new(
        ScriptedResearcher::always(sample_research())
            .fail_for("2026-02-02", StageError::data_unavailable("2026-02-02", "no files")),
    );
    let stages = Stages::new(
        researcher.clone(),
        Arc::new(ScriptedWriter::always(sample_draft("Finch Frenzy"))),
        Arc::new(RecordingPublisher::default()),
    );
    let run = Orchestrator::new(settings(2), stages)
        .run_record(record())
        .await;

    assert_eq!(run.reason(), Some(ReasonCode::DataUnavailable));
    assert_eq!(researcher.calls(), 1);
}

#[tokio::test]
async fn test_illustrator_error_is_terminal() {
    let illustrator = Arc::new(ScriptedIllustrator::new(Script::failing(
        StageError::Transient("image service down".into()),
    )));
    let stages = Stages::new(
        Arc::new(ScriptedResearcher::always(sample_research())),
        Arc::new(ScriptedWriter::always(sample_draft("Finch Frenzy"))),
        Arc::new(RecordingPublisher::default()),
    )
    .with_illustrator(illustrator.clone());
    let run = Orchestrator::new(settings(2), stages)
        .run_record(record())
        .await;

    assert_eq!(run.status(), RunStatus::Failed);
    assert_eq!(run.reason(), Some(ReasonCode::TransientApiError));
    assert_eq!(illustrator.calls(), 1);
    assert_eq!(run.retry_count(Stage::Illustrate), 0);
}

#[tokio::test]
async fn test_image_reaches_publisher() {
    let illustrator = Arc::new(ScriptedIllustrator::new(Script::always(ImageReference::new(
        "static/images/2026-02-02.png",
    ))));
    let stages = Stages::new(
        Arc::new(ScriptedResearcher::always(sample_research())),
        Arc::new(ScriptedWriter::always(sample_draft("Finch Frenzy"))),
        Arc::new(RecordingPublisher::default()),
    )
    .with_illustrator(illustrator);
    let run = Orchestrator::new(settings(2), stages)
        .run_record(record())
        .await;

    assert_eq!(run.status(), RunStatus::Completed);
    assert_eq!(
        run.published().and_then(|a| a.field("image")),
        Some("static/images/2026-02-02.png")
    );
}

#[tokio::test]
async fn test_validation_failure_never_retries() {
    let publisher = Arc::new(RecordingPublisher::default().blanking("title"));
    let writer = Arc::new(ScriptedWriter::always(sample_draft("Finch Frenzy")));
    let stages = Stages::new(
        Arc::new(ScriptedResearcher::always(sample_research())),
        writer.clone(),
        publisher.clone(),
    );
    let run = Orchestrator::new(settings(2), stages)
        .run_record(record())
        .await;

    assert_eq!(run.status(), RunStatus::Failed);
    assert_eq!(run.reason(), Some(ReasonCode::ValidationError));
    assert_eq!(run.retry_count(Stage::Publish), 0);
    assert_eq!(publisher.calls(), 1);
    assert_eq!(writer.calls(), 1);
    assert_eq!(outcomes_for(&run, Stage::Publish), vec![StageOutcome::Rejected]);
    assert!(run.failure().unwrap().detail.contains("title"));
}

#[tokio::test]
async fn test_publisher_validation_error_is_terminal() {
    let publisher = Arc::new(
        RecordingPublisher::default().failing(StageError::Validation("bad front matter".into())),
    );
    let stages = Stages::new(
        Arc::new(ScriptedResearcher::always(sample_research())),
        Arc::new(ScriptedWriter::always(sample_draft("Finch Frenzy"))),
        publisher,
    );
    let run = Orchestrator::new(settings(2), stages)
        .run_record(record())
        .await;

    assert_eq!(run.reason(), Some(ReasonCode::ValidationError));
    assert_eq!(run.retry_count(Stage::Publish), 0);
}

#[tokio::test]
async fn test_no_changes_to_commit_is_completed() {
    let committer = Arc::new(ScriptedCommitter::always(CommitOutcome::NoChanges));
    let stages = Stages::new(
        Arc::new(ScriptedResearcher::always(sample_research())),
        Arc::new(ScriptedWriter::always(sample_draft("Finch Frenzy"))),
        Arc::new(RecordingPublisher::default()),
    )
    .with_committer(committer.clone());
    let run = Orchestrator::new(settings(2), stages)
        .run_record(record())
        .await;

    assert_eq!(run.status(), RunStatus::Completed);
    assert_eq!(run.reason(), Some(ReasonCode::NoChangesToCommit));
    assert_eq!(run.commit(), Some(&CommitOutcome::NoChanges));
    assert_eq!(committer.calls(), 1);
}

#[tokio::test]
async fn test_committed_reference_is_recorded() {
    let reference = CommitReference {
        sha: Some("abc1234".to_string()),
        branch: "main".to_string(),
        target_path: PathBuf::from("content/posts/2026-02-02.md"),
        pushed: true,
    };
    let stages = Stages::new(
        Arc::new(ScriptedResearcher::always(sample_research())),
        Arc::new(ScriptedWriter::always(sample_draft("Finch Frenzy"))),
        Arc::new(RecordingPublisher::default()),
    )
    .with_committer(Arc::new(ScriptedCommitter::always(CommitOutcome::Committed(
        reference.clone(),
    ))));
    let run = Orchestrator::new(settings(2), stages)
        .run_record(record())
        .await;

    assert_eq!(run.status(), RunStatus::Completed);
    assert_eq!(run.reason(), None);
    assert_eq!(run.commit(), Some(&CommitOutcome::Committed(reference)));
}

#[tokio::test]
async fn test_commit_failures_are_distinguished() {
    for (error, reason) in [
        (
            StageError::Authentication("token expired".into()),
            ReasonCode::AuthenticationError,
        ),
        (
            StageError::RemoteRejected("non-fast-forward".into()),
            ReasonCode::RemoteRejected,
        ),
    ] {
        let committer = Arc::new(ScriptedCommitter::new(Script::failing(error)));
        let stages = Stages::new(
            Arc::new(ScriptedResearcher::always(sample_research())),
            Arc::new(ScriptedWriter::always(sample_draft("Finch Frenzy"))),
            Arc::new(RecordingPublisher::default()),
        )
        .with_committer(committer.clone());
        let run = Orchestrator::new(settings(2), stages)
            .run_record(record())
            .await;

        assert_eq!(run.status(), RunStatus::Failed);
        assert_eq!(run.reason(), Some(reason));
        assert_eq!(committer.calls(), 1);
        assert_eq!(run.failure().and_then(|f| f.stage), Some(Stage::Commit));
    }
}
