//! Canned payloads.

use rookery_proto::{DraftContent, DraftSection, ResearchSummary};

/// Research for a busy day at the feeder.
pub fn sample_research() -> ResearchSummary {
    ResearchSummary::new(
        "## Detection Summary\n\n\
         - Total detections: 42\n\
         - Unique species: 5\n\n\
         ## Top Species\n\n\
         - House Finch: 18 detections (42.9%)\n\
         - Black-capped Chickadee: 11 detections (26.2%)",
    )
    .with_fact("total_detections", "42")
    .with_fact("species_detected", "5")
}

/// A complete draft that satisfies a strict content gate.
pub fn sample_draft(headline: &str) -> DraftContent {
    DraftContent {
        headline: headline.to_string(),
        introduction: "The feeder was busy from first light, with forty-two visits \
                       logged before the afternoon lull set in."
            .to_string(),
        sections: vec![
            DraftSection {
                heading: "Morning Regulars".to_string(),
                body: "House finches claimed the perches early and held them for most \
                       of the morning, while chickadees darted in whenever a gap opened."
                    .to_string(),
            },
            DraftSection {
                heading: "Visitors".to_string(),
                body: "A downy woodpecker worked the suet cage twice, and a single \
                       white-breasted nuthatch made a brief appearance near noon."
                    .to_string(),
            },
        ],
        conclusion: "Tomorrow's forecast is clear, so expect another full house.".to_string(),
        metadata: [("author".to_string(), "Rookery".to_string())]
            .into_iter()
            .collect(),
    }
}

/// A draft with a headline and nothing else.
pub fn thin_draft(headline: &str) -> DraftContent {
    DraftContent {
        headline: headline.to_string(),
        ..Default::default()
    }
}
