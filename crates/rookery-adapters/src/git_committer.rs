//! Commits published posts to a site repository with git.

use crate::command_runner::{CommandOutput, CommandRunner};
use async_trait::async_trait;
use rookery_core::CommitterConfig;
use rookery_proto::{CommitOutcome, CommitReference, Committer, PublishedArtifact, StageError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Classifies failed git output.
///
/// Credential problems become `Authentication`, refused pushes become
/// `RemoteRejected`, and anything else is `Transient`.
pub fn classify_git_failure(action: &str, output: &str) -> StageError {
    let lower = output.to_lowercase();
    let summary = output
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no output");

    const AUTH: [&str; 6] = [
        "authentication failed",
        "permission denied",
        "could not read username",
        "invalid username or password",
        "403",
        "access denied",
    ];
    const REJECTED: [&str; 4] = ["rejected", "non-fast-forward", "fetch first", "protected branch"];

    if AUTH.iter().any(|p| lower.contains(p)) {
        StageError::Authentication(format!("git {action}: {summary}"))
    } else if REJECTED.iter().any(|p| lower.contains(p)) {
        StageError::RemoteRejected(format!("git {action}: {summary}"))
    } else {
        StageError::Transient(format!("git {action}: {summary}"))
    }
}

/// Copies posts into a working tree, commits them, and optionally pushes.
#[derive(Debug, Clone)]
pub struct GitCommitter {
    repo_dir: PathBuf,
    content_dir: PathBuf,
    branch: String,
    remote: String,
    push: bool,
    author: Option<(String, String)>,
    timeout: Option<Duration>,
}

impl GitCommitter {
    pub fn new(repo_dir: impl Into<PathBuf>, content_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            content_dir: content_dir.into(),
            branch: "main".to_string(),
            remote: "origin".to_string(),
            push: false,
            author: None,
            timeout: None,
        }
    }

    /// Builds the committer from configuration. Returns `None` without a repository.
    pub fn from_config(config: &CommitterConfig) -> Option<Self> {
        let repo_dir = config.repo_dir.as_ref()?;
        let mut committer = Self::new(repo_dir, &config.content_dir)
            .on_branch(&config.branch, &config.remote)
            .pushing(config.push);
        if let (Some(name), Some(email)) = (&config.author_name, &config.author_email) {
            committer.author = Some((name.clone(), email.clone()));
        }
        Some(committer)
    }

    #[must_use]
    pub fn on_branch(mut self, branch: impl Into<String>, remote: impl Into<String>) -> Self {
        self.branch = branch.into();
        self.remote = remote.into();
        self
    }

    #[must_use]
    pub fn pushing(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    /// Bounds every git invocation.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn git(&self) -> CommandRunner {
        let mut args = Vec::new();
        if let Some((name, email)) = &self.author {
            args.push("-c".to_string());
            args.push(format!("user.name={name}"));
            args.push("-c".to_string());
            args.push(format!("user.email={email}"));
        }
        CommandRunner::new("git", args).in_dir(&self.repo_dir)
    }

    async fn run_git(&self, action: &str, args: &[&str]) -> Result<CommandOutput, StageError> {
        let output = self
            .git()
            .run_with_args(args, None, self.timeout)
            .await
            .map_err(|e| StageError::Transient(format!("could not run git {action}: {e}")))?;
        debug!(action, success = output.success, "git finished");
        Ok(output)
    }

    async fn ensure(&self, action: &str, args: &[&str]) -> Result<CommandOutput, StageError> {
        let output = self.run_git(action, args).await?;
        if output.success {
            Ok(output)
        } else if output.timed_out {
            Err(StageError::Transient(format!("git {action} timed out")))
        } else {
            Err(classify_git_failure(action, &output.combined()))
        }
    }

    /// Copies the artifact into the working tree.
    ///
    /// Returns `None` when the target already holds identical bytes.
    async fn stage_file(&self, artifact: &PublishedArtifact) -> Result<Option<PathBuf>, StageError> {
        let file_name = artifact.path.file_name().ok_or_else(|| {
            StageError::Validation(format!("{} has no file name", artifact.path.display()))
        })?;
        let relative = self.content_dir.join(file_name);
        let target = self.repo_dir.join(&relative);

        let content = tokio::fs::read(&artifact.path).await.map_err(|e| {
            StageError::Validation(format!("cannot read {}: {e}", artifact.path.display()))
        })?;
        if let Ok(existing) = tokio::fs::read(&target).await
            && existing == content
        {
            return Ok(None);
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StageError::Transient(format!("creating {}: {e}", parent.display()))
            })?;
        }
        tokio::fs::write(&target, &content)
            .await
            .map_err(|e| StageError::Transient(format!("writing {}: {e}", target.display())))?;
        debug!(target = %target.display(), "Copied post into repository");
        Ok(Some(relative))
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }
}

#[async_trait]
impl Committer for GitCommitter {
    async fn commit(&self, artifact: &PublishedArtifact) -> Result<CommitOutcome, StageError> {
        let Some(relative) = self.stage_file(artifact).await? else {
            info!(path = %artifact.path.display(), "Post unchanged, nothing to commit");
            return Ok(CommitOutcome::NoChanges);
        };
        let relative_str = relative.to_string_lossy().to_string();

        self.ensure("add", &["add", "--", &relative_str]).await?;

        let message = format!(
            "Add post: {}",
            artifact.field("title").unwrap_or(&relative_str)
        );
        let commit = self.run_git("commit", &["commit", "-m", &message]).await?;
        if !commit.success {
            if commit.combined().to_lowercase().contains("nothing to commit") {
                info!(path = %relative_str, "git reports nothing to commit");
                return Ok(CommitOutcome::NoChanges);
            }
            return Err(classify_git_failure("commit", &commit.combined()));
        }

        let sha = match self.run_git("rev-parse", &["rev-parse", "HEAD"]).await {
            Ok(out) if out.success => Some(out.stdout.trim().to_string()),
            _ => None,
        };

        if self.push {
            self.ensure("push", &["push", &self.remote, &self.branch])
                .await
                .inspect_err(|e| warn!(error = %e, "Push failed"))?;
        }

        info!(
            sha = sha.as_deref().unwrap_or("unknown"),
            branch = %self.branch,
            pushed = self.push,
            "Committed post"
        );
        Ok(CommitOutcome::Committed(CommitReference {
            sha,
            branch: self.branch.clone(),
            target_path: relative,
            pushed: self.push,
        }))
    }
}
