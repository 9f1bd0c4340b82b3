//! Quality gates for the research and write stages.
//!
//! A gate scores a stage payload against configured [`GateCriteria`]. Scoring
//! is a pure function of the payload and the criteria, so assessing the same
//! output twice always yields the same result.
//!
//! The score is the fraction of soft checks passed (minimum length and each
//! required marker). A gate with no soft checks scores 1.0. Any missing
//! required field forces the score to 0.0.

use rookery_proto::{DraftContent, ResearchSummary};
use serde::{Deserialize, Serialize};

/// What a gate checks and the score it requires.
///
/// The default criteria check nothing and require nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateCriteria {
    /// Minimum score in `[0.0, 1.0]` for the payload to pass.
    #[serde(default)]
    pub min_score: f64,

    /// Minimum length of the payload text, in characters. 0 disables the check.
    #[serde(default)]
    pub min_length: usize,

    /// Fields that must be present and non-blank.
    #[serde(default)]
    pub required_fields: Vec<String>,

    /// Substrings the payload text must contain.
    #[serde(default)]
    pub required_markers: Vec<String>,
}

impl GateCriteria {
    /// Returns true if these criteria accept every payload.
    pub fn is_permissive(&self) -> bool {
        self.min_score <= 0.0
            && self.min_length == 0
            && self.required_fields.is_empty()
            && self.required_markers.is_empty()
    }
}

/// Result of assessing one payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub score: f64,
    pub threshold: f64,
    pub passed: bool,
    /// Human-readable notes, handed back to the stage on retry.
    pub feedback: String,
}

/// A payload a gate can score.
pub trait Assessable {
    /// Returns the named field, or `None` if the payload has no such field.
    fn field(&self, name: &str) -> Option<String>;

    /// Returns the text length and marker checks run against.
    fn text(&self) -> String;
}

impl Assessable for ResearchSummary {
    fn field(&self, name: &str) -> Option<String> {
        if name == "summary" {
            return Some(self.summary.clone());
        }
        self.fact(name).map(str::to_string)
    }

    fn text(&self) -> String {
        self.summary.clone()
    }
}

impl Assessable for DraftContent {
    fn field(&self, name: &str) -> Option<String> {
        match name {
            "headline" | "title" => Some(self.headline.clone()),
            "introduction" => Some(self.introduction.clone()),
            "body" => Some(self.body()),
            "conclusion" => Some(self.conclusion.clone()),
            other => self.metadata.get(other).cloned(),
        }
    }

    fn text(&self) -> String {
        self.full_content()
    }
}

/// Scores payloads against fixed criteria.
#[derive(Debug, Clone)]
pub struct QualityGate {
    name: &'static str,
    criteria: GateCriteria,
}

impl QualityGate {
    pub fn new(name: &'static str, criteria: GateCriteria) -> Self {
        Self { name, criteria }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn criteria(&self) -> &GateCriteria {
        &self.criteria
    }

    /// Assesses `subject` against this gate's criteria.
    pub fn assess<T: Assessable + ?Sized>(&self, subject: &T) -> QualityAssessment {
        let criteria = &self.criteria;
        let mut issues: Vec<String> = Vec::new();

        let missing: Vec<&str> = criteria
            .required_fields
            .iter()
            .filter(|name| {
                subject
                    .field(name)
                    .is_none_or(|value| value.trim().is_empty())
            })
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            issues.push(format!("missing required fields: {}", missing.join(", ")));
        }

        let text = subject.text();
        let mut soft_total = 0usize;
        let mut soft_passed = 0usize;

        if criteria.min_length > 0 {
            soft_total += 1;
            let length = text.trim().chars().count();
            if length >= criteria.min_length {
                soft_passed += 1;
            } else {
                issues.push(format!(
                    "too short: {length} characters, need at least {}",
                    criteria.min_length
                ));
            }
        }

        for marker in &criteria.required_markers {
            soft_total += 1;
            if text.contains(marker.as_str()) {
                soft_passed += 1;
            } else {
                issues.push(format!("missing expected marker '{marker}'"));
            }
        }

        let score = if !missing.is_empty() {
            0.0
        } else if soft_total == 0 {
            1.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let ratio = soft_passed as f64 / soft_total as f64;
            ratio
        };

        let passed = missing.is_empty() && score >= criteria.min_score;
        let feedback = if issues.is_empty() {
            "meets all criteria".to_string()
        } else {
            issues.join("; ")
        };

        QualityAssessment {
            score,
            threshold: criteria.min_score,
            passed,
            feedback,
        }
    }
}

/// What the orchestrator does after a gated stage attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Accept the output and move on.
    Advance,
    /// Re-run the stage with feedback.
    Retry,
    /// Give up on the record.
    Reject,
}

impl GateDecision {
    /// Decides the next step from the assessment and the retries already spent.
    ///
    /// A failing attempt is retried while `retries_used < max_retries`, so a
    /// stage gets at most `max_retries + 1` attempts.
    pub fn decide(passed: bool, retries_used: u32, max_retries: u32) -> Self {
        if passed {
            GateDecision::Advance
        } else if retries_used < max_retries {
            GateDecision::Retry
        } else {
            GateDecision::Reject
        }
    }
}
