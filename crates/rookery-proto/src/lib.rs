//! # rookery-proto
//!
//! Shared types, error definitions, and traits for the Rookery pipeline.
//!
//! This crate provides the foundational abstractions used across all Rookery crates,
//! including:
//! - The fixed pipeline [`Stage`] sequence
//! - [`InputRecord`] identities and the payload each stage produces
//! - The stage error taxonomy ([`StageError`], [`ReasonCode`])
//! - Capability traits implemented by stage collaborators
//!
//! Nothing in here performs I/O. Concrete collaborators live in `rookery-adapters`.

mod error;
mod payload;
mod record;
mod stage;
mod traits;

pub use error::{ReasonCode, StageError};
pub use payload::{
    CommitOutcome, CommitReference, DraftContent, DraftSection, ImageReference,
    PublishedArtifact, ResearchSummary,
};
pub use record::{InputRecord, slugify};
pub use stage::Stage;
pub use traits::{Committer, Illustrator, Publisher, RecordSource, Researcher, Writer};
