//! Deterministic writer that needs no external service.

use async_trait::async_trait;
use rookery_core::WriterConfig;
use rookery_proto::{DraftContent, DraftSection, ResearchSummary, StageError, Writer};
use std::collections::BTreeMap;
use tracing::debug;

/// Builds a post straight from the research summary.
///
/// Every `##` section of the research except the overview becomes a section
/// of the draft. Feedback from a failed gate is acknowledged in a closing
/// revision note.
#[derive(Debug, Clone)]
pub struct TemplateWriter {
    author: String,
    style: String,
}

impl TemplateWriter {
    pub fn new(author: impl Into<String>, style: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            style: style.into(),
        }
    }

    pub fn from_config(config: &WriterConfig) -> Self {
        Self::new(&config.author, &config.style)
    }

    fn headline(research: &ResearchSummary) -> String {
        match (research.fact("top_species"), research.fact("date")) {
            (Some(top), Some(date)) => format!("{top} Takes the Spotlight on {date}"),
            (Some(top), None) => format!("{top} Takes the Spotlight at the Feeder"),
            (None, Some(date)) => format!("Notes from the Feeder: {date}"),
            (None, None) => "Notes from the Feeder".to_string(),
        }
    }

    fn introduction(research: &ResearchSummary) -> String {
        let total = research.fact("total_detections").unwrap_or("several");
        let species = research.fact("species_detected").unwrap_or("a handful of");
        let when = research
            .fact("date")
            .map_or_else(|| "this time".to_string(), |d| format!("on {d}"));
        format!(
            "Our feeder camera logged {total} detections across {species} species {when}. \
             Here is what stood out."
        )
    }
}

/// Splits markdown into `##` sections, dropping the title and overview.
fn research_sections(summary: &str) -> Vec<DraftSection> {
    let mut sections = Vec::new();
    let mut current: Option<DraftSection> = None;
    for line in summary.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            if let Some(section) = current.take() {
                sections.push(section);
            }
            current = Some(DraftSection {
                heading: heading.trim().to_string(),
                body: String::new(),
            });
        } else if let Some(section) = current.as_mut() {
            section.body.push_str(line);
            section.body.push('\n');
        }
    }
    if let Some(section) = current {
        sections.push(section);
    }
    sections
        .into_iter()
        .filter(|s| !s.heading.eq_ignore_ascii_case("overview"))
        .map(|mut s| {
            s.body = s.body.trim().to_string();
            s
        })
        .filter(|s| !s.body.is_empty())
        .collect()
}

#[async_trait]
impl Writer for TemplateWriter {
    async fn write(
        &self,
        research: &ResearchSummary,
        feedback: Option<&str>,
    ) -> Result<DraftContent, StageError> {
        let mut sections = research_sections(&research.summary);
        if sections.is_empty() && !research.summary.trim().is_empty() {
            sections.push(DraftSection {
                heading: "Highlights".to_string(),
                body: research.summary.trim().to_string(),
            });
        }
        if let Some(feedback) = feedback {
            sections.push(DraftSection {
                heading: "Revision Notes".to_string(),
                body: format!("This post was revised after review: {feedback}."),
            });
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("author".to_string(), self.author.clone());
        metadata.insert("style".to_string(), self.style.clone());

        let draft = DraftContent {
            headline: Self::headline(research),
            introduction: Self::introduction(research),
            sections,
            conclusion: "Thanks for reading. Fill the feeders and check back tomorrow \
                         for more sightings."
                .to_string(),
            metadata,
        };
        debug!(
            headline = %draft.headline,
            sections = draft.sections.len(),
            revised = feedback.is_some(),
            "Drafted post from template"
        );
        Ok(draft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn research() -> ResearchSummary {
        ResearchSummary::new(
            "# Research Summary for 2026-02-02\n\n\
             ## Overview\n\n- Total Detections: 3\n\n\
             ## Species Detected\n\n- House Finch: 2 detections\n\n\
             ## Notable Events\n\n- Hawk flyover",
        )
        .with_fact("top_species", "House Finch")
        .with_fact("date", "2026-02-02")
        .with_fact("total_detections", "3")
        .with_fact("species_detected", "2")
    }

    #[tokio::test]
    async fn test_draft_from_research() {
        let writer = TemplateWriter::new("Rookery", "field notes");
        let draft = writer.write(&research(), None).await.unwrap();
        assert_eq!(draft.headline, "House Finch Takes the Spotlight on 2026-02-02");
        assert!(draft.introduction.contains("3 detections across 2 species on 2026-02-02"));
        let headings: Vec<&str> = draft.sections.iter().map(|s| s.heading.as_str()).collect();
        assert_eq!(headings, vec!["Species Detected", "Notable Events"]);
        assert_eq!(draft.metadata.get("author").map(String::as_str), Some("Rookery"));
    }

    #[tokio::test]
    async fn test_feedback_adds_revision_note() {
        let writer = TemplateWriter::new("Rookery", "field notes");
        let draft = writer
            .write(&research(), Some("too short"))
            .await
            .unwrap();
        let last = draft.sections.last().unwrap();
        assert_eq!(last.heading, "Revision Notes");
        assert!(last.body.contains("too short"));
    }

    #[tokio::test]
    async fn test_unstructured_research_becomes_highlights() {
        let writer = TemplateWriter::new("Rookery", "field notes");
        let draft = writer
            .write(&ResearchSummary::new("Lots of finches."), None)
            .await
            .unwrap();
        assert_eq!(draft.headline, "Notes from the Feeder");
        assert_eq!(draft.sections[0].heading, "Highlights");
    }
}
