//! Writer and illustrator backed by external commands.
//!
//! The request goes to the command's stdin as one JSON object. The command
//! answers with a JSON object on stdout; surrounding log lines are tolerated.
//! A command that refuses on policy grounds prints [`POLICY_REFUSAL_MARKER`].

use crate::command_runner::{CommandOutput, CommandRunner};
use async_trait::async_trait;
use rookery_core::{IllustratorConfig, WriterConfig};
use rookery_proto::{
    DraftContent, ImageReference, Illustrator, InputRecord, ResearchSummary, Stage, StageError,
    Writer,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Printed by a command that declines to produce content.
pub const POLICY_REFUSAL_MARKER: &str = "CONTENT_POLICY_REFUSAL";

/// Returns the outermost `{...}` span of `text`.
fn json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Maps a failed or timed-out invocation to a stage error.
fn invocation_error(
    stage: Stage,
    runner: &CommandRunner,
    output: &CommandOutput,
    timeout: Option<Duration>,
) -> StageError {
    if output.timed_out {
        return StageError::Timeout {
            stage,
            after: timeout.unwrap_or_default(),
        };
    }
    if output.combined().contains(POLICY_REFUSAL_MARKER) {
        return StageError::ContentPolicy(format!(
            "{} refused: {}",
            runner.command(),
            output.failure_summary()
        ));
    }
    StageError::Transient(format!(
        "{} failed: {}",
        runner.command(),
        output.failure_summary()
    ))
}

fn spawn_error(runner: &CommandRunner, err: &std::io::Error) -> StageError {
    StageError::Transient(format!("could not run {}: {err}", runner.command()))
}

#[derive(Serialize)]
struct WriteRequest<'a> {
    task: &'static str,
    research: &'a ResearchSummary,
    feedback: Option<&'a str>,
    author: &'a str,
    style: &'a str,
}

/// Writer that delegates to an external command.
#[derive(Debug, Clone)]
pub struct CommandWriter {
    runner: CommandRunner,
    author: String,
    style: String,
    timeout: Option<Duration>,
}

impl CommandWriter {
    pub fn new(runner: CommandRunner, author: impl Into<String>, style: impl Into<String>) -> Self {
        Self {
            runner,
            author: author.into(),
            style: style.into(),
            timeout: None,
        }
    }

    /// Builds the writer from configuration. Returns `None` without a command.
    pub fn from_config(config: &WriterConfig) -> Option<Self> {
        let command = config.command.as_ref()?;
        Some(Self::new(
            CommandRunner::new(command, config.args.clone()),
            &config.author,
            &config.style,
        ))
    }

    /// Terminates the command after `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn parse_draft(&self, stdout: &str) -> Result<DraftContent, StageError> {
        let body = json_object(stdout).ok_or_else(|| {
            StageError::Transient(format!("{} printed no JSON draft", self.runner.command()))
        })?;
        let mut draft: DraftContent = serde_json::from_str(body).map_err(|e| {
            StageError::Transient(format!(
                "{} printed an unreadable draft: {e}",
                self.runner.command()
            ))
        })?;
        draft
            .metadata
            .entry("author".to_string())
            .or_insert_with(|| self.author.clone());
        Ok(draft)
    }
}

#[async_trait]
impl Writer for CommandWriter {
    async fn write(
        &self,
        research: &ResearchSummary,
        feedback: Option<&str>,
    ) -> Result<DraftContent, StageError> {
        let request = WriteRequest {
            task: "write",
            research,
            feedback,
            author: &self.author,
            style: &self.style,
        };
        let input = serde_json::to_string(&request)
            .map_err(|e| StageError::Transient(format!("encoding write request: {e}")))?;

        let output = self
            .runner
            .run(Some(&input), self.timeout)
            .await
            .map_err(|e| spawn_error(&self.runner, &e))?;

        if !output.success {
            warn!(command = %self.runner.command(), exit_code = ?output.exit_code, "Writer command failed");
            return Err(invocation_error(Stage::Write, &self.runner, &output, self.timeout));
        }
        if output.stdout.contains(POLICY_REFUSAL_MARKER) {
            return Err(StageError::ContentPolicy(format!(
                "{} declined to write this post",
                self.runner.command()
            )));
        }
        let draft = self.parse_draft(&output.stdout)?;
        debug!(headline = %draft.headline, "Writer command produced draft");
        Ok(draft)
    }
}

#[derive(Serialize)]
struct IllustrateRequest<'a> {
    task: &'static str,
    record: String,
    slug: String,
    headline: &'a str,
    introduction: &'a str,
    image_dir: &'a str,
}

#[derive(Deserialize)]
struct IllustrateResponse {
    path: String,
}

/// Illustrator that delegates to an external command.
///
/// The command answers with `{"path": "..."}` or, failing that, prints the
/// image location as its last line.
#[derive(Debug, Clone)]
pub struct CommandIllustrator {
    runner: CommandRunner,
    image_dir: String,
    timeout: Option<Duration>,
}

impl CommandIllustrator {
    pub fn new(runner: CommandRunner, image_dir: impl Into<String>) -> Self {
        Self {
            runner,
            image_dir: image_dir.into(),
            timeout: None,
        }
    }

    pub fn from_config(config: &IllustratorConfig) -> Option<Self> {
        let command = config.command.as_ref()?;
        Some(Self::new(
            CommandRunner::new(command, config.args.clone()),
            &config.image_dir,
        ))
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn parse_location(stdout: &str) -> Option<String> {
        if let Some(body) = json_object(stdout)
            && let Ok(response) = serde_json::from_str::<IllustrateResponse>(body)
            && !response.path.trim().is_empty()
        {
            return Some(response.path.trim().to_string());
        }
        stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
    }
}

#[async_trait]
impl Illustrator for CommandIllustrator {
    async fn illustrate(
        &self,
        record: &InputRecord,
        draft: &DraftContent,
    ) -> Result<ImageReference, StageError> {
        let request = IllustrateRequest {
            task: "illustrate",
            record: record.id(),
            slug: record.slug(),
            headline: &draft.headline,
            introduction: &draft.introduction,
            image_dir: &self.image_dir,
        };
        let input = serde_json::to_string(&request)
            .map_err(|e| StageError::Transient(format!("encoding illustrate request: {e}")))?;

        let output = self
            .runner
            .run(Some(&input), self.timeout)
            .await
            .map_err(|e| spawn_error(&self.runner, &e))?;

        if !output.success {
            return Err(invocation_error(
                Stage::Illustrate,
                &self.runner,
                &output,
                self.timeout,
            ));
        }
        let location = Self::parse_location(&output.stdout).ok_or_else(|| {
            StageError::Transient(format!("{} printed no image path", self.runner.command()))
        })?;
        debug!(record = %record, location = %location, "Illustrator produced image");
        Ok(ImageReference::new(location))
    }
}
