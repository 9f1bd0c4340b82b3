//! The fixed pipeline stage sequence.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of the content pipeline.
///
/// The order of the variants is the order a workflow run visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Gather facts about the input record.
    Research,
    /// Turn research into a draft post.
    Write,
    /// Produce a featured image for the draft. Optional.
    Illustrate,
    /// Render the draft into a site artifact.
    Publish,
    /// Commit the artifact to version control. Optional.
    Commit,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; 5] = [
        Stage::Research,
        Stage::Write,
        Stage::Illustrate,
        Stage::Publish,
        Stage::Commit,
    ];

    /// Returns the stage name used in logs and history files.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Research => "research",
            Stage::Write => "write",
            Stage::Illustrate => "illustrate",
            Stage::Publish => "publish",
            Stage::Commit => "commit",
        }
    }

    /// Returns true if a quality gate follows this stage.
    pub fn is_gated(self) -> bool {
        matches!(self, Stage::Research | Stage::Write)
    }

    /// Returns true if the stage is skipped when no collaborator is configured.
    pub fn is_optional(self) -> bool {
        matches!(self, Stage::Illustrate | Stage::Commit)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_research_and_write_are_gated() {
        let gated: Vec<Stage> = Stage::ALL.into_iter().filter(|s| s.is_gated()).collect();
        assert_eq!(gated, vec![Stage::Research, Stage::Write]);
    }

    #[test]
    fn test_optional_stages() {
        assert!(Stage::Illustrate.is_optional());
        assert!(Stage::Commit.is_optional());
        assert!(!Stage::Publish.is_optional());
    }

    #[test]
    fn test_serializes_as_snake_case() {
        let json = serde_json::to_string(&Stage::Illustrate).unwrap();
        assert_eq!(json, "\"illustrate\"");
    }
}
