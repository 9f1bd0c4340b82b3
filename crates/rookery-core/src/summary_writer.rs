//! Markdown summary of a finished batch.

use crate::batch_runner::BatchResult;
use chrono::Utc;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Writes a per-record summary table after a batch.
#[derive(Debug, Clone)]
pub struct SummaryWriter {
    path: PathBuf,
}

impl Default for SummaryWriter {
    fn default() -> Self {
        Self::new(".rookery/summary.md")
    }
}

impl SummaryWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the summary, replacing any previous one.
    pub fn write(&self, result: &BatchResult) -> io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, Self::render(result))?;
        debug!(path = %self.path.display(), "Wrote batch summary");
        Ok(())
    }

    /// Renders the summary as markdown.
    pub fn render(result: &BatchResult) -> String {
        let mut out = String::new();
        let status = if result.is_success() {
            "Completed"
        } else {
            "Completed with failures"
        };

        // Writing to a String never fails.
        let _ = writeln!(out, "# Batch Summary\n");
        let _ = writeln!(out, "**Status:** {status}");
        let _ = writeln!(out, "**Finished:** {}\n", Utc::now().to_rfc3339());
        let _ = writeln!(
            out,
            "- Records: {}\n- Succeeded: {}\n- Failed: {}\n",
            result.total, result.succeeded, result.failed
        );

        if result.outcomes.is_empty() {
            out.push_str("No records were processed.\n");
            return out;
        }

        out.push_str("| # | Record | Status | Reason | Output |\n");
        out.push_str("|---|--------|--------|--------|--------|\n");
        for (i, outcome) in result.outcomes.iter().enumerate() {
            let reason = outcome.reason.map_or("-", |r| r.as_str());
            let output = outcome
                .output_path
                .as_ref()
                .map_or_else(|| "-".to_string(), |p| p.display().to_string());
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} |",
                i + 1,
                outcome.record,
                outcome.status,
                reason,
                output
            );
        }

        let failures: Vec<_> = result.failures().collect();
        if !failures.is_empty() {
            out.push_str("\n## Failures\n\n");
            for outcome in failures {
                let detail = outcome.detail.as_deref().unwrap_or("no detail");
                let _ = writeln!(out, "- **{}**: {}", outcome.record, detail);
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch_runner::RecordOutcome;
    use crate::workflow_run::{RunId, RunStatus};
    use rookery_proto::{InputRecord, ReasonCode};
    use std::collections::BTreeMap;

    fn outcome(id: &str, failed: bool) -> RecordOutcome {
        let record = InputRecord::parse(id);
        RecordOutcome {
            run_id: RunId::new(id),
            record,
            status: if failed { RunStatus::Failed } else { RunStatus::Completed },
            reason: failed.then_some(ReasonCode::DataUnavailable),
            failed_stage: None,
            detail: failed.then(|| "no detections".to_string()),
            output_path: (!failed).then(|| PathBuf::from(format!("content/posts/{id}.md"))),
            retries: BTreeMap::new(),
        }
    }

    #[test]
    fn test_render_lists_every_record() {
        let result = BatchResult::from_outcomes(vec![
            outcome("2026-02-01", false),
            outcome("2026-02-02", true),
        ]);
        let md = SummaryWriter::render(&result);
        assert!(md.contains("**Status:** Completed with failures"));
        assert!(md.contains("| 1 | 2026-02-01 | completed | - | content/posts/2026-02-01.md |"));
        assert!(md.contains("| 2 | 2026-02-02 | failed | data_unavailable | - |"));
        assert!(md.contains("- **2026-02-02**: no detections"));
    }

    #[test]
    fn test_render_empty_batch() {
        let md = SummaryWriter::render(&BatchResult::default());
        assert!(md.contains("No records were processed."));
        assert!(md.contains("**Status:** Completed\n"));
    }

    #[test]
    fn test_write_creates_parent() {
        let dir = tempfile::TempDir::new().unwrap();
        let writer = SummaryWriter::new(dir.path().join("out/summary.md"));
        writer.write(&BatchResult::default()).unwrap();
        assert!(writer.path().exists());
    }
}
