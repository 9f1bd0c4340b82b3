//! Run history persisted as JSON lines.
//!
//! Every finished workflow run is appended as one line. The file survives
//! across invocations and is what `rookery history` reads back.

use crate::batch_runner::{BatchResult, RecordOutcome};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default location of the history file, relative to the working directory.
pub const DEFAULT_HISTORY_PATH: &str = ".rookery/history.jsonl";

/// One line of the history file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// RFC 3339 time the run was recorded.
    pub ts: String,
    pub run_id: String,
    /// Record identifier as shown to users.
    pub record: String,
    /// `completed` or `failed`.
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub retries: BTreeMap<String, u32>,
}

impl HistoryRecord {
    pub fn from_outcome(outcome: &RecordOutcome) -> Self {
        Self {
            ts: Utc::now().to_rfc3339(),
            run_id: outcome.run_id.to_string(),
            record: outcome.record.id(),
            status: outcome.status.as_str().to_string(),
            reason: outcome.reason.map(|r| r.as_str().to_string()),
            stage: outcome.failed_stage.map(|s| s.as_str().to_string()),
            detail: outcome.detail.clone(),
            output_path: outcome
                .output_path
                .as_ref()
                .map(|p| p.display().to_string()),
            retries: outcome
                .retries
                .iter()
                .map(|(stage, n)| (stage.as_str().to_string(), *n))
                .collect(),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status == "failed"
    }
}

/// Errors reading or writing the history file.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("History file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not encode history record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Append-only JSONL log of finished runs.
#[derive(Debug, Clone)]
pub struct RunHistory {
    path: PathBuf,
}

impl RunHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Appends one record, creating the file and its directory if needed.
    pub fn append(&self, record: &HistoryRecord) -> Result<(), HistoryError> {
        self.append_all(std::slice::from_ref(record))
    }

    /// Appends a record for every outcome in `result`.
    pub fn append_batch(&self, result: &BatchResult) -> Result<(), HistoryError> {
        let records: Vec<HistoryRecord> = result
            .outcomes
            .iter()
            .map(HistoryRecord::from_outcome)
            .collect();
        self.append_all(&records)
    }

    fn append_all(&self, records: &[HistoryRecord]) -> Result<(), HistoryError> {
        if records.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut buf = String::new();
        for record in records {
            buf.push_str(&serde_json::to_string(record)?);
            buf.push('\n');
        }
        file.write_all(buf.as_bytes())?;
        debug!(path = %self.path.display(), count = records.len(), "Appended run history");
        Ok(())
    }

    /// Reads every record, oldest first. Malformed lines are skipped.
    pub fn read_all(&self) -> Result<Vec<HistoryRecord>, HistoryError> {
        if !self.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&self.path)?;
        let mut records = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(line = index + 1, error = %e, "Skipping malformed history line"),
            }
        }
        Ok(records)
    }

    /// Deletes the history file.
    pub fn clear(&self) -> Result<(), HistoryError> {
        if self.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow_run::{RunId, RunStatus};
    use rookery_proto::{InputRecord, ReasonCode, Stage};
    use tempfile::TempDir;

    fn outcome(record: &str, status: RunStatus, reason: Option<ReasonCode>) -> RecordOutcome {
        let record = InputRecord::parse(record);
        RecordOutcome {
            run_id: RunId::for_batch(0, &record),
            record,
            status,
            reason,
            failed_stage: reason.map(|_| Stage::Research),
            detail: reason.map(|r| format!("failed with {r}")),
            output_path: None,
            retries: BTreeMap::from([(Stage::Research, 2)]),
        }
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = TempDir::new().unwrap();
        let history = RunHistory::new(dir.path().join("nested/history.jsonl"));
        assert!(!history.exists());
        assert!(history.read_all().unwrap().is_empty());

        let result = BatchResult::from_outcomes(vec![
            outcome("2026-02-01", RunStatus::Completed, None),
            outcome("2026-02-02", RunStatus::Failed, Some(ReasonCode::DataUnavailable)),
        ]);
        history.append_batch(&result).unwrap();
        history
            .append(&HistoryRecord::from_outcome(&result.outcomes[0]))
            .unwrap();

        let records = history.read_all().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].record, "2026-02-01");
        assert!(!records[0].is_failure());
        assert_eq!(records[1].reason.as_deref(), Some("data_unavailable"));
        assert_eq!(records[1].stage.as_deref(), Some("research"));
        assert_eq!(records[1].retries.get("research"), Some(&2));
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.jsonl");
        let good = HistoryRecord::from_outcome(&outcome("a.json", RunStatus::Completed, None));
        let content = format!("{}\nnot json\n\n", serde_json::to_string(&good).unwrap());
        std::fs::write(&path, content).unwrap();

        let records = RunHistory::new(&path).read_all().unwrap();
        assert_eq!(records, vec![good]);
    }

    #[test]
    fn test_clear() {
        let dir = TempDir::new().unwrap();
        let history = RunHistory::new(dir.path().join("history.jsonl"));
        history
            .append(&HistoryRecord::from_outcome(&outcome(
                "a.json",
                RunStatus::Completed,
                None,
            )))
            .unwrap();
        assert!(history.exists());
        history.clear().unwrap();
        assert!(!history.exists());
        history.clear().unwrap();
    }
}
