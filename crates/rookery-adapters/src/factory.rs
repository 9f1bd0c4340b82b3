//! Builds the stage collaborators a configuration asks for.

use crate::command_stages::{CommandIllustrator, CommandWriter};
use crate::directory_researcher::DirectoryResearcher;
use crate::error::AdapterError;
use crate::git_committer::GitCommitter;
use crate::hugo_publisher::HugoPublisher;
use crate::template_writer::TemplateWriter;
use rookery_core::{RookeryConfig, Stages};
use rookery_proto::{RecordSource, Writer};
use std::sync::Arc;
use tracing::debug;

/// Assembles the collaborators for every enabled stage.
///
/// External commands and git are bounded by `workflow.stage_timeout_seconds`
/// so a hung child process is terminated rather than abandoned.
pub fn build_stages(config: &RookeryConfig) -> Result<Stages, AdapterError> {
    let timeout = config.workflow.stage_timeout();

    let researcher = Arc::new(DirectoryResearcher::from_config(&config.research));

    let writer: Arc<dyn Writer> = match config.writer.backend.as_str() {
        "template" => Arc::new(TemplateWriter::from_config(&config.writer)),
        "command" => {
            let writer = CommandWriter::from_config(&config.writer)
                .ok_or(AdapterError::MissingCommand { section: "writer" })?;
            Arc::new(writer.with_timeout(timeout))
        }
        other => return Err(AdapterError::UnknownBackend(other.to_string())),
    };

    let publisher = Arc::new(HugoPublisher::from_config(&config.publisher));
    let mut stages = Stages::new(researcher, writer, publisher);

    if config.illustrator.enabled {
        let illustrator = CommandIllustrator::from_config(&config.illustrator).ok_or(
            AdapterError::MissingCommand {
                section: "illustrator",
            },
        )?;
        stages = stages.with_illustrator(Arc::new(illustrator.with_timeout(timeout)));
    }

    if config.committer.enabled {
        let committer =
            GitCommitter::from_config(&config.committer).ok_or(AdapterError::MissingRepoDir)?;
        stages = stages.with_committer(Arc::new(committer.with_timeout(timeout)));
    }

    debug!(?stages, "Built stage collaborators");
    Ok(stages)
}

/// The source `--all` enumerates: every data file in the research directory.
pub fn record_source(config: &RookeryConfig) -> Arc<dyn RecordSource> {
    Arc::new(DirectoryResearcher::from_config(&config.research))
}
