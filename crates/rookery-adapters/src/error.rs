//! Errors raised while assembling collaborators from configuration.

/// A configuration that names collaborators which cannot be built.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Unknown writer backend '{0}' (expected 'template' or 'command')")]
    UnknownBackend(String),

    #[error("{section} is enabled but {section}.command is not set")]
    MissingCommand { section: &'static str },

    #[error("committer is enabled but committer.repo_dir is not set")]
    MissingRepoDir,
}
