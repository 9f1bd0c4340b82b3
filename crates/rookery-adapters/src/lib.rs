//! # rookery-adapters
//!
//! Concrete stage collaborators for the Rookery pipeline.
//!
//! - [`DirectoryResearcher`] reads detection files (JSON or CSV) from a data
//!   directory and doubles as the [`RecordSource`](rookery_proto::RecordSource)
//!   for whole-directory batches.
//! - [`TemplateWriter`] drafts posts without any external service;
//!   [`CommandWriter`] delegates to an external command.
//! - [`CommandIllustrator`] asks an external command for an image.
//! - [`HugoPublisher`] writes markdown with YAML front matter.
//! - [`GitCommitter`] commits published posts to a site repository.
//!
//! [`build_stages`] wires these together from a [`RookeryConfig`](rookery_core::RookeryConfig).

mod command_runner;
mod command_stages;
mod directory_researcher;
mod error;
mod factory;
mod git_committer;
mod hugo_publisher;
mod template_writer;

pub use command_runner::{CommandOutput, CommandRunner};
pub use command_stages::{CommandIllustrator, CommandWriter, POLICY_REFUSAL_MARKER};
pub use directory_researcher::{Detections, DirectoryResearcher};
pub use error::AdapterError;
pub use factory::{build_stages, record_source};
pub use git_committer::{GitCommitter, classify_git_failure};
pub use hugo_publisher::{HugoPublisher, parse_post};
pub use template_writer::TemplateWriter;
