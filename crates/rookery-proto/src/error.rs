//! Stage error taxonomy.
//!
//! Collaborators report failures as [`StageError`]. The orchestrator never
//! lets these escape a workflow run; it classifies them into a
//! [`ReasonCode`] that ends up in the run's terminal status.

use crate::Stage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors a stage collaborator may return.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error("No input data for '{record}': {detail}")]
    DataUnavailable { record: String, detail: String },

    #[error("Transient service error: {0}")]
    Transient(String),

    #[error("{stage} call timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },

    #[error("Content policy refusal: {0}")]
    ContentPolicy(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Remote rejected the change: {0}")]
    RemoteRejected(String),
}

impl StageError {
    /// Creates a `DataUnavailable` error.
    pub fn data_unavailable(record: impl Into<String>, detail: impl Into<String>) -> Self {
        StageError::DataUnavailable {
            record: record.into(),
            detail: detail.into(),
        }
    }

    /// Returns the reason code this error is reported under.
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            StageError::DataUnavailable { .. } => ReasonCode::DataUnavailable,
            StageError::Transient(_) | StageError::Timeout { .. } => ReasonCode::TransientApiError,
            StageError::ContentPolicy(_) => ReasonCode::ContentPolicyError,
            StageError::Validation(_) => ReasonCode::ValidationError,
            StageError::Authentication(_) => ReasonCode::AuthenticationError,
            StageError::RemoteRejected(_) => ReasonCode::RemoteRejected,
        }
    }

    /// Returns true if a gated stage may spend a retry on this error.
    ///
    /// Only timeouts and transient service errors qualify. Non-gated stages
    /// never retry, whatever this returns.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StageError::Transient(_) | StageError::Timeout { .. })
    }
}

/// Classified reason attached to a terminal workflow status.
///
/// Every variant except `NoChangesToCommit` describes a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// Remote collaborator timed out or reported a retriable error.
    TransientApiError,
    /// A quality gate rejected the output after all retries.
    QualityBelowThreshold,
    /// The published artifact failed its structural check.
    ValidationError,
    /// The record had no input data.
    DataUnavailable,
    /// The writer refused on content policy grounds.
    ContentPolicyError,
    /// Version control credentials were refused. Likely affects every record.
    AuthenticationError,
    /// The remote refused this particular change. Likely record-specific.
    RemoteRejected,
    /// The commit target already held identical content. Not a failure.
    NoChangesToCommit,
    /// The run aborted unexpectedly (a collaborator panicked).
    Internal,
}

impl ReasonCode {
    /// Returns the snake_case code used in history files.
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::TransientApiError => "transient_api_error",
            ReasonCode::QualityBelowThreshold => "quality_below_threshold",
            ReasonCode::ValidationError => "validation_error",
            ReasonCode::DataUnavailable => "data_unavailable",
            ReasonCode::ContentPolicyError => "content_policy_error",
            ReasonCode::AuthenticationError => "authentication_error",
            ReasonCode::RemoteRejected => "remote_rejected",
            ReasonCode::NoChangesToCommit => "no_changes_to_commit",
            ReasonCode::Internal => "internal",
        }
    }

    /// Returns true if this reason describes a failed run.
    pub fn is_failure(self) -> bool {
        !matches!(self, ReasonCode::NoChangesToCommit)
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
