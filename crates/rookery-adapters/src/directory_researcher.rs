//! Research from detection files on local disk.
//!
//! Each JSON or CSV file in the data directory is one record. A date record
//! resolves to the first data file whose name contains the date.

use async_trait::async_trait;
use rookery_core::ResearchConfig;
use rookery_proto::{InputRecord, RecordSource, ResearchSummary, Researcher, StageError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Detection data extracted from one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detections {
    pub source_file: String,
    pub date: Option<String>,
    pub total: u64,
    /// Detections per species.
    pub species: BTreeMap<String, u64>,
    pub notable_events: Vec<String>,
    pub environment: BTreeMap<String, String>,
}

impl Detections {
    /// Species ordered by detection count, most frequent first.
    pub fn ranked_species(&self) -> Vec<(&str, u64)> {
        let mut ranked: Vec<(&str, u64)> = self
            .species
            .iter()
            .map(|(name, count)| (name.as_str(), *count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }

    /// Parses a JSON detection file.
    ///
    /// Recognised keys: `detections` (array of objects with `species`),
    /// `species` (string or array), `total_detections`, `date`,
    /// `notable_events` and `environmental_conditions`.
    pub fn from_json(source_file: &str, text: &str) -> Result<Self, String> {
        let root: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
        let Value::Object(map) = root else {
            return Err("expected a JSON object".to_string());
        };

        let mut data = Detections {
            source_file: source_file.to_string(),
            ..Default::default()
        };

        if let Some(Value::Array(detections)) = map.get("detections") {
            data.total = detections.len() as u64;
            for detection in detections {
                if let Some(species) = detection.get("species").and_then(Value::as_str) {
                    *data.species.entry(species.to_string()).or_insert(0) += 1;
                }
            }
        }

        match map.get("species") {
            Some(Value::String(name)) => {
                data.species.entry(name.clone()).or_insert(0);
            }
            Some(Value::Array(names)) => {
                for name in names.iter().filter_map(Value::as_str) {
                    data.species.entry(name.to_string()).or_insert(0);
                }
            }
            _ => {}
        }

        if let Some(total) = map.get("total_detections").and_then(Value::as_u64) {
            data.total = total;
        }

        data.date = map.get("date").and_then(Value::as_str).map(str::to_string);

        if let Some(Value::Array(events)) = map.get("notable_events") {
            data.notable_events = events.iter().map(display_value).collect();
        }

        if let Some(Value::Object(env)) = map.get("environmental_conditions") {
            data.environment = env
                .iter()
                .map(|(k, v)| (k.clone(), display_value(v)))
                .collect();
        }

        Ok(data)
    }

    /// Parses a CSV detection file: a header row, then one detection per row.
    ///
    /// Rows whose field count differs from the header are ignored.
    pub fn from_csv(source_file: &str, text: &str) -> Self {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let mut data = Detections {
            source_file: source_file.to_string(),
            ..Default::default()
        };
        let Some(header) = lines.next() else {
            return data;
        };
        let headers: Vec<String> = header
            .split(',')
            .map(|h| h.trim().to_lowercase())
            .collect();
        let species_col = headers.iter().position(|h| h == "species");
        let date_col = headers.iter().position(|h| h == "date");

        for line in lines {
            let values: Vec<&str> = line.split(',').map(str::trim).collect();
            if values.len() != headers.len() {
                continue;
            }
            data.total += 1;
            if let Some(col) = species_col
                && !values[col].is_empty()
            {
                *data.species.entry(values[col].to_string()).or_insert(0) += 1;
            }
            if data.date.is_none()
                && let Some(col) = date_col
            {
                data.date = Some(values[col].to_string());
            }
        }
        data
    }

    /// Renders the research summary handed to the writer.
    pub fn to_summary(&self, label: &str) -> ResearchSummary {
        let mut text = String::new();
        // Writing to a String never fails.
        let _ = writeln!(text, "# Research Summary for {label}\n");
        let _ = writeln!(text, "## Overview\n");
        let _ = writeln!(text, "- Source File: {}", self.source_file);
        if let Some(date) = &self.date {
            let _ = writeln!(text, "- Date: {date}");
        }
        let _ = writeln!(text, "- Total Detections: {}", self.total);
        let _ = writeln!(text, "- Unique Species: {}\n", self.species.len());

        let _ = writeln!(text, "## Species Detected\n");
        let ranked = self.ranked_species();
        if ranked.is_empty() {
            let _ = writeln!(text, "- No species identified");
        }
        for (name, count) in &ranked {
            if *count > 0 {
                let _ = writeln!(text, "- {name}: {count} detections");
            } else {
                let _ = writeln!(text, "- {name}");
            }
        }

        let _ = writeln!(text, "\n## Notable Events\n");
        if self.notable_events.is_empty() {
            let _ = writeln!(text, "- None recorded");
        }
        for event in &self.notable_events {
            let _ = writeln!(text, "- {event}");
        }

        let _ = writeln!(text, "\n## Environmental Conditions\n");
        if self.environment.is_empty() {
            let _ = writeln!(text, "- Not recorded");
        }
        for (key, value) in &self.environment {
            let _ = writeln!(text, "- {key}: {value}");
        }

        let mut summary = ResearchSummary::new(text.trim_end())
            .with_fact("source_file", &self.source_file)
            .with_fact("total_detections", self.total.to_string())
            .with_fact("species_detected", self.species.len().to_string());
        if let Some((top, _)) = ranked.first() {
            summary = summary.with_fact("top_species", *top);
        }
        if let Some(date) = &self.date {
            summary = summary.with_fact("date", date);
        }
        summary
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Researcher and record source backed by a directory of detection files.
#[derive(Debug, Clone)]
pub struct DirectoryResearcher {
    data_dir: PathBuf,
    extensions: Vec<String>,
}

impl DirectoryResearcher {
    pub fn new(data_dir: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            extensions: extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &ResearchConfig) -> Self {
        Self::new(&config.data_dir, config.extensions.clone())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn is_data_file(&self, name: &str) -> bool {
        Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
    }

    /// Names of every data file in the directory, sorted.
    async fn data_files(&self) -> Result<Vec<String>, StageError> {
        let mut entries = tokio::fs::read_dir(&self.data_dir).await.map_err(|e| {
            StageError::data_unavailable(
                self.data_dir.display().to_string(),
                format!("cannot read data directory: {e}"),
            )
        })?;
        let mut names = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    return Err(StageError::Transient(format!(
                        "listing {}: {e}",
                        self.data_dir.display()
                    )));
                }
            };
            let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
            if let Some(name) = entry.file_name().to_str()
                && is_file
                && self.is_data_file(name)
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Finds the data file for `record`.
    async fn resolve(&self, record: &InputRecord) -> Result<String, StageError> {
        match record {
            InputRecord::File(name) => {
                let path = self.data_dir.join(name);
                if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file()) {
                    Ok(name.clone())
                } else {
                    Err(StageError::data_unavailable(
                        record.id(),
                        format!("{} does not exist", path.display()),
                    ))
                }
            }
            InputRecord::Date(_) => {
                let date = record.id();
                self.data_files()
                    .await?
                    .into_iter()
                    .find(|name| name.contains(&date))
                    .ok_or_else(|| {
                        StageError::data_unavailable(
                            &date,
                            format!("no data file for {date} in {}", self.data_dir.display()),
                        )
                    })
            }
        }
    }

    /// Loads and parses the data file for `record`.
    pub async fn detections(&self, record: &InputRecord) -> Result<Detections, StageError> {
        let name = self.resolve(record).await?;
        let path = self.data_dir.join(&name);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| StageError::Transient(format!("reading {}: {e}", path.display())))?;

        let is_json = Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let mut data = if is_json {
            Detections::from_json(&name, &text).map_err(|e| {
                StageError::data_unavailable(record.id(), format!("{name} is not valid: {e}"))
            })?
        } else {
            Detections::from_csv(&name, &text)
        };
        if data.date.is_none() {
            data.date = record.date().map(|d| d.format("%Y-%m-%d").to_string());
        }
        Ok(data)
    }
}

#[async_trait]
impl Researcher for DirectoryResearcher {
    async fn research(
        &self,
        record: &InputRecord,
        feedback: Option<&str>,
    ) -> Result<ResearchSummary, StageError> {
        if let Some(feedback) = feedback {
            debug!(record = %record, feedback, "Re-reading data after gate feedback");
        }
        let data = self.detections(record).await?;
        if data.total == 0 {
            return Err(StageError::data_unavailable(
                record.id(),
                format!("{} contains no detections", data.source_file),
            ));
        }
        info!(
            record = %record,
            source = %data.source_file,
            detections = data.total,
            species = data.species.len(),
            "Collected detection data"
        );
        Ok(data.to_summary(&record.id()))
    }
}

#[async_trait]
impl RecordSource for DirectoryResearcher {
    async fn list_records(&self) -> Result<Vec<InputRecord>, StageError> {
        let names = self.data_files().await?;
        debug!(dir = %self.data_dir.display(), count = names.len(), "Listed data files");
        Ok(names.into_iter().map(InputRecord::File).collect())
    }
}
