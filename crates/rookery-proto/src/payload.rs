//! Payloads produced by each pipeline stage.
//!
//! Every payload is plain data. Stages receive earlier payloads by shared
//! reference and never mutate them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Output of the research stage: structured facts plus a free-text summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchSummary {
    /// Named facts, e.g. `total_detections` or `species_detected`.
    #[serde(default)]
    pub facts: BTreeMap<String, String>,
    /// Markdown summary handed to the writer.
    #[serde(default)]
    pub summary: String,
}

impl ResearchSummary {
    /// Creates a summary with the given text and no facts.
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            facts: BTreeMap::new(),
            summary: summary.into(),
        }
    }

    /// Adds a fact.
    pub fn with_fact(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.facts.insert(key.into(), value.into());
        self
    }

    /// Returns a fact by name.
    pub fn fact(&self, key: &str) -> Option<&str> {
        self.facts.get(key).map(String::as_str)
    }
}

/// A titled section of a draft body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftSection {
    pub heading: String,
    pub body: String,
}

/// Output of the write stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftContent {
    pub headline: String,
    #[serde(default)]
    pub introduction: String,
    #[serde(default)]
    pub sections: Vec<DraftSection>,
    #[serde(default)]
    pub conclusion: String,
    /// Free-form metadata such as author or style.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl DraftContent {
    /// Renders the draft as markdown: introduction, `##` sections, conclusion.
    pub fn full_content(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if !self.introduction.trim().is_empty() {
            parts.push(self.introduction.trim().to_string());
        }
        for section in &self.sections {
            let heading = section.heading.trim();
            let body = section.body.trim();
            if heading.is_empty() {
                parts.push(body.to_string());
            } else {
                parts.push(format!("## {heading}\n\n{body}"));
            }
        }
        if !self.conclusion.trim().is_empty() {
            parts.push(self.conclusion.trim().to_string());
        }
        parts.join("\n\n")
    }

    /// Returns the concatenated body of all sections.
    pub fn body(&self) -> String {
        self.sections
            .iter()
            .map(|s| s.body.trim())
            .filter(|b| !b.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Output of the illustrate stage: where the generated image lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    /// Filesystem path or URI.
    pub location: String,
}

impl ImageReference {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }
}

/// Output of the publish stage: the written artifact as read back from disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishedArtifact {
    /// Where the artifact was written.
    pub path: PathBuf,
    /// Parsed front-matter fields.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Markdown body following the front matter.
    #[serde(default)]
    pub body: String,
}

impl PublishedArtifact {
    /// Returns a metadata field, treating blank values as absent.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// A successful commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReference {
    /// Commit hash, if it could be resolved.
    pub sha: Option<String>,
    pub branch: String,
    /// Path of the artifact inside the repository.
    pub target_path: PathBuf,
    /// Whether the commit was pushed to the remote.
    pub pushed: bool,
}

/// Output of the commit stage.
///
/// `NoChanges` is a success: the target already holds identical content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommitOutcome {
    Committed(CommitReference),
    NoChanges,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> DraftContent {
        DraftContent {
            headline: "Morning at the Feeder".to_string(),
            introduction: "Dawn broke.".to_string(),
            sections: vec![
                DraftSection {
                    heading: "Rush Hour".to_string(),
                    body: "Finches everywhere.".to_string(),
                },
                DraftSection {
                    heading: String::new(),
                    body: "A quiet interlude.".to_string(),
                },
            ],
            conclusion: "See you tomorrow.".to_string(),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_full_content_layout() {
        let content = draft().full_content();
        assert_eq!(
            content,
            "Dawn broke.\n\n## Rush Hour\n\nFinches everywhere.\n\nA quiet interlude.\n\nSee you tomorrow."
        );
    }

    #[test]
    fn test_body_skips_blank_sections() {
        let mut d = draft();
        d.sections.push(DraftSection {
            heading: "Empty".to_string(),
            body: "   ".to_string(),
        });
        assert_eq!(d.body(), "Finches everywhere.\n\nA quiet interlude.");
    }

    #[test]
    fn test_artifact_field_ignores_blank_values() {
        let mut artifact = PublishedArtifact::default();
        artifact.metadata.insert("title".to_string(), "  ".to_string());
        artifact.metadata.insert("date".to_string(), "2026-02-02".to_string());
        assert_eq!(artifact.field("title"), None);
        assert_eq!(artifact.field("date"), Some("2026-02-02"));
    }
}
