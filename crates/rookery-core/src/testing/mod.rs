//! Testing utilities for deterministic workflow tests.
//!
//! Scripted collaborators replay canned responses in order and record how
//! they were called, so tests can drive the orchestrator without touching the
//! filesystem, a model, or git.

pub mod fixtures;
pub mod scripted;

pub use fixtures::{sample_draft, sample_research, thin_draft};
pub use scripted::{
    RecordingPublisher, Script, ScriptedCommitter, ScriptedIllustrator, ScriptedResearcher,
    ScriptedWriter, StaticRecordSource,
};
