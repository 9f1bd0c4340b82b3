//! Configuration types for Rookery.
//!
//! A single YAML file configures the workflow limits, batch behaviour, quality
//! gate criteria and every stage collaborator. Every field has a default, so an
//! empty file is a valid configuration that writes posts from local data with
//! the built-in template writer and commits nothing.

use crate::history::DEFAULT_HISTORY_PATH;
use crate::quality_gate::GateCriteria;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Top-level configuration for Rookery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RookeryConfig {
    /// Retry and timeout limits applied to every workflow run.
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Batch runner settings.
    #[serde(default)]
    pub batch: BatchConfig,

    /// Quality gate criteria for the research and write stages.
    #[serde(default)]
    pub gates: GatesConfig,

    /// Where research data is read from.
    #[serde(default)]
    pub research: ResearchConfig,

    /// Writer backend selection.
    #[serde(default)]
    pub writer: WriterConfig,

    /// Optional illustrator.
    #[serde(default)]
    pub illustrator: IllustratorConfig,

    /// Where published artifacts land and what front matter they carry.
    #[serde(default)]
    pub publisher: PublisherConfig,

    /// Optional version control commit.
    #[serde(default)]
    pub committer: CommitterConfig,

    /// Suppress all warnings (for CI environments).
    #[serde(default, rename = "_suppress_warnings")]
    pub suppress_warnings: bool,
}

impl RookeryConfig {
    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        debug!(path = %path_ref.display(), "Loading configuration from file");
        let content = std::fs::read_to_string(path_ref)?;
        let config = Self::parse_yaml(&content)?;
        debug!(
            writer = %config.writer.backend,
            illustrator = config.illustrator.enabled,
            committer = config.committer.enabled,
            concurrency = config.batch.concurrency,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Parses configuration from a YAML string.
    ///
    /// An empty document yields the defaults.
    pub fn parse_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Validates the configuration and returns any warnings.
    ///
    /// Returns an error for settings no run could succeed with. Warnings are
    /// suppressed entirely when `_suppress_warnings` is set.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        if self.batch.concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }

        if self.workflow.stage_timeout_seconds == 0 {
            return Err(ConfigError::InvalidTimeout);
        }

        for (gate, criteria) in [
            ("gates.research", &self.gates.research),
            ("gates.content", &self.gates.content),
        ] {
            if !(0.0..=1.0).contains(&criteria.min_score) {
                return Err(ConfigError::InvalidThreshold {
                    gate: gate.to_string(),
                    value: criteria.min_score,
                });
            }
        }

        match self.writer.backend.as_str() {
            "template" => {}
            "command" => {
                if self.writer.command.is_none() {
                    return Err(ConfigError::MissingCommand {
                        section: "writer".to_string(),
                    });
                }
            }
            other => {
                return Err(ConfigError::UnknownBackend {
                    section: "writer".to_string(),
                    value: other.to_string(),
                });
            }
        }

        if self.illustrator.enabled && self.illustrator.command.is_none() {
            return Err(ConfigError::MissingCommand {
                section: "illustrator".to_string(),
            });
        }

        if self.committer.enabled && self.committer.repo_dir.is_none() {
            return Err(ConfigError::MissingRepoDir);
        }

        let mut warnings = Vec::new();

        if self.suppress_warnings {
            return Ok(warnings);
        }

        if self.workflow.max_retries > 10 {
            warnings.push(ConfigWarning::InvalidValue {
                field: "workflow.max_retries".to_string(),
                message: format!(
                    "{} retries per gated stage is unusually high",
                    self.workflow.max_retries
                ),
            });
        }

        if self.writer.backend == "template" && self.writer.command.is_some() {
            warnings.push(ConfigWarning::DroppedField {
                field: "writer.command".to_string(),
                reason: "Only used by the command backend".to_string(),
            });
        }

        if !self.illustrator.enabled && self.illustrator.command.is_some() {
            warnings.push(ConfigWarning::DroppedField {
                field: "illustrator.command".to_string(),
                reason: "Illustrator is disabled".to_string(),
            });
        }

        if !self.committer.enabled && self.committer.repo_dir.is_some() {
            warnings.push(ConfigWarning::DroppedField {
                field: "committer.repo_dir".to_string(),
                reason: "Committer is disabled".to_string(),
            });
        }

        for (gate, criteria) in [
            ("gates.research", &self.gates.research),
            ("gates.content", &self.gates.content),
        ] {
            if criteria.is_permissive() {
                warnings.push(ConfigWarning::PermissiveGate {
                    gate: gate.to_string(),
                });
            }
        }

        Ok(warnings)
    }
}

/// Configuration warnings that don't prevent operation.
#[derive(Debug, Clone)]
pub enum ConfigWarning {
    /// Field is present but ignored with the current settings.
    DroppedField { field: String, reason: String },
    /// Field has a suspicious value.
    InvalidValue { field: String, message: String },
    /// Gate has no checks and a zero threshold, so it accepts everything.
    PermissiveGate { gate: String },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::DroppedField { field, reason } => {
                write!(f, "Warning [{}]: Field ignored - {}", field, reason)
            }
            ConfigWarning::InvalidValue { field, message } => {
                write!(f, "Warning [{}]: {}", field, message)
            }
            ConfigWarning::PermissiveGate { gate } => {
                write!(f, "Warning [{}]: No checks configured, every output passes", gate)
            }
        }
    }
}

/// Workflow limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Retries a gated stage may spend before it is rejected.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Upper bound on any single collaborator call.
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_seconds: u64,

    /// Metadata fields every published artifact must carry.
    #[serde(default = "default_required_metadata")]
    pub required_metadata: Vec<String>,
}

fn default_max_retries() -> u32 {
    2
}

fn default_stage_timeout() -> u64 {
    300
}

fn default_required_metadata() -> Vec<String> {
    vec!["title".to_string(), "date".to_string()]
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            stage_timeout_seconds: default_stage_timeout(),
            required_metadata: default_required_metadata(),
        }
    }
}

impl WorkflowConfig {
    /// Returns the per-call timeout.
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_seconds)
    }
}

/// Batch runner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum number of workflow runs in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// JSONL file each finished run is appended to.
    #[serde(default = "default_history_file")]
    pub history_file: String,

    /// Markdown summary written after each batch, if set.
    #[serde(default)]
    pub summary_file: Option<String>,
}

fn default_concurrency() -> usize {
    1
}

fn default_history_file() -> String {
    DEFAULT_HISTORY_PATH.to_string()
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            history_file: default_history_file(),
            summary_file: None,
        }
    }
}

/// Criteria for both quality gates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatesConfig {
    #[serde(default)]
    pub research: GateCriteria,

    #[serde(default)]
    pub content: GateCriteria,
}

/// Research data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Directory holding detection files.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// File extensions considered data files.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_extensions() -> Vec<String> {
    vec!["json".to_string(), "csv".to_string()]
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            extensions: default_extensions(),
        }
    }
}

/// Writer backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Backend: "template" or "command".
    #[serde(default = "default_writer_backend")]
    pub backend: String,

    /// Executable for the command backend.
    #[serde(default)]
    pub command: Option<String>,

    /// Extra arguments for the command backend.
    #[serde(default)]
    pub args: Vec<String>,

    /// Byline attached to drafts.
    #[serde(default = "default_author")]
    pub author: String,

    /// Free-form style hint passed to the backend.
    #[serde(default = "default_style")]
    pub style: String,
}

fn default_writer_backend() -> String {
    "template".to_string()
}

fn default_author() -> String {
    "Rookery".to_string()
}

fn default_style() -> String {
    "friendly field notes".to_string()
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            backend: default_writer_backend(),
            command: None,
            args: Vec::new(),
            author: default_author(),
            style: default_style(),
        }
    }
}

/// Illustrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IllustratorConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Executable that prints the generated image location on stdout.
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    /// Directory images are expected to land in.
    #[serde(default = "default_image_dir")]
    pub image_dir: String,
}

fn default_image_dir() -> String {
    "static/images".to_string()
}

impl Default for IllustratorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: None,
            args: Vec::new(),
            image_dir: default_image_dir(),
        }
    }
}

/// Publisher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Directory posts are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Author used when the draft carries none.
    #[serde(default = "default_author")]
    pub default_author: String,

    /// Front-matter description.
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default = "default_tags")]
    pub tags: Vec<String>,

    #[serde(default = "default_categories")]
    pub categories: Vec<String>,

    /// Publish posts as drafts.
    #[serde(default)]
    pub draft: bool,
}

fn default_output_dir() -> String {
    "content/posts".to_string()
}

fn default_tags() -> Vec<String> {
    vec!["birds".to_string(), "daily-update".to_string()]
}

fn default_categories() -> Vec<String> {
    vec!["Bird Sightings".to_string()]
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            default_author: default_author(),
            description: None,
            tags: default_tags(),
            categories: default_categories(),
            draft: false,
        }
    }
}

/// Git committer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitterConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Working tree of the site repository.
    #[serde(default)]
    pub repo_dir: Option<String>,

    /// Directory inside the repository posts are copied to.
    #[serde(default = "default_output_dir")]
    pub content_dir: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default = "default_remote")]
    pub remote: String,

    /// Push after committing.
    #[serde(default = "default_true")]
    pub push: bool,

    #[serde(default)]
    pub author_name: Option<String>,

    #[serde(default)]
    pub author_email: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}

impl Default for CommitterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            repo_dir: None,
            content_dir: default_output_dir(),
            branch: default_branch(),
            remote: default_remote(),
            push: default_true(),
            author_name: None,
            author_email: None,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("batch.concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("workflow.stage_timeout_seconds must be at least 1")]
    InvalidTimeout,

    #[error("{gate}.min_score must be between 0.0 and 1.0, got {value}")]
    InvalidThreshold { gate: String, value: f64 },

    #[error("{section}.command is required")]
    MissingCommand { section: String },

    #[error("Unknown {section} backend '{value}'")]
    UnknownBackend { section: String, value: String },

    #[error("committer.repo_dir is required when the committer is enabled")]
    MissingRepoDir,
}
