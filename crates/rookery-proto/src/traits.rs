//! Capability traits for stage collaborators.
//!
//! The orchestrator depends only on these traits. Implementations are chosen
//! by configuration and may be swapped without touching the orchestrator.
//!
//! Every method is an await point: collaborators are expected to call remote
//! services or spawn processes, and the orchestrator bounds each call with a
//! timeout. Inputs are shared references; collaborators cannot alter a run's
//! history.

use crate::{
    CommitOutcome, DraftContent, ImageReference, InputRecord, PublishedArtifact, ResearchSummary,
    StageError,
};
use async_trait::async_trait;

/// Gathers facts about an input record.
#[async_trait]
pub trait Researcher: Send + Sync {
    /// Researches `record`. `feedback` carries the quality gate's notes on
    /// the previous attempt when the stage is being retried.
    ///
    /// Fails with `DataUnavailable` when the record has no data and
    /// `Transient`/`Timeout` when the data source misbehaves.
    async fn research(
        &self,
        record: &InputRecord,
        feedback: Option<&str>,
    ) -> Result<ResearchSummary, StageError>;
}

/// Turns research into draft content.
#[async_trait]
pub trait Writer: Send + Sync {
    /// Fails with `Transient` or `ContentPolicy`.
    async fn write(
        &self,
        research: &ResearchSummary,
        feedback: Option<&str>,
    ) -> Result<DraftContent, StageError>;
}

/// Produces an image for a draft. Optional in the pipeline.
#[async_trait]
pub trait Illustrator: Send + Sync {
    async fn illustrate(
        &self,
        record: &InputRecord,
        draft: &DraftContent,
    ) -> Result<ImageReference, StageError>;
}

/// Renders a draft into a site artifact.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Writes the artifact and returns it as read back.
    ///
    /// The output path must be derived from `record` so concurrent runs for
    /// different records never touch the same file. Fails with `Validation`
    /// on malformed metadata.
    async fn publish(
        &self,
        record: &InputRecord,
        draft: &DraftContent,
        image: Option<&ImageReference>,
    ) -> Result<PublishedArtifact, StageError>;
}

/// Commits a published artifact to version control. Optional in the pipeline.
#[async_trait]
pub trait Committer: Send + Sync {
    /// Returns [`CommitOutcome::NoChanges`] when the target already holds
    /// identical content. Fails with `Authentication` or `RemoteRejected`.
    async fn commit(&self, artifact: &PublishedArtifact) -> Result<CommitOutcome, StageError>;
}

/// Enumerates the records currently available for processing.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn list_records(&self) -> Result<Vec<InputRecord>, StageError>;
}
