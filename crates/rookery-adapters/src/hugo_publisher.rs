//! Publishes drafts as Hugo markdown posts.

use async_trait::async_trait;
use chrono::Utc;
use rookery_core::PublisherConfig;
use rookery_proto::{
    DraftContent, ImageReference, InputRecord, PublishedArtifact, Publisher, StageError, slugify,
};
use serde::Serialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DELIMITER: &str = "---";

#[derive(Debug, Serialize)]
struct FrontMatter<'a> {
    title: &'a str,
    date: String,
    draft: bool,
    author: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    tags: &'a [String],
    categories: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    featured_image: Option<&'a str>,
}

/// Writes `<output_dir>/<record-slug>-<headline-slug>.md` with YAML front matter.
#[derive(Debug, Clone)]
pub struct HugoPublisher {
    output_dir: PathBuf,
    default_author: String,
    description: Option<String>,
    tags: Vec<String>,
    categories: Vec<String>,
    draft: bool,
}

impl HugoPublisher {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self::from_config(&PublisherConfig {
            output_dir: output_dir.into().display().to_string(),
            ..PublisherConfig::default()
        })
    }

    pub fn from_config(config: &PublisherConfig) -> Self {
        Self {
            output_dir: PathBuf::from(&config.output_dir),
            default_author: config.default_author.clone(),
            description: config.description.clone(),
            tags: config.tags.clone(),
            categories: config.categories.clone(),
            draft: config.draft,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Output path for a record. The record slug keeps paths unique per record.
    pub fn path_for(&self, record: &InputRecord, draft: &DraftContent) -> PathBuf {
        let record_slug = record.slug();
        let headline_slug = slugify(&draft.headline);
        let name = if headline_slug.is_empty() {
            format!("{record_slug}.md")
        } else {
            format!("{record_slug}-{headline_slug}.md")
        };
        self.output_dir.join(name)
    }

    /// Renders front matter plus body.
    pub fn render(
        &self,
        record: &InputRecord,
        draft: &DraftContent,
        image: Option<&ImageReference>,
    ) -> Result<String, StageError> {
        let date = record
            .date()
            .unwrap_or_else(|| Utc::now().date_naive())
            .format("%Y-%m-%d")
            .to_string();
        let author = draft
            .metadata
            .get("author")
            .map_or(self.default_author.as_str(), String::as_str);
        let front = FrontMatter {
            title: draft.headline.trim(),
            date,
            draft: self.draft,
            author,
            description: self.description.as_deref(),
            tags: &self.tags,
            categories: &self.categories,
            featured_image: image.map(|i| i.location.as_str()),
        };
        let yaml = serde_yaml::to_string(&front)
            .map_err(|e| StageError::Validation(format!("cannot encode front matter: {e}")))?;
        let yaml = yaml.strip_prefix("---\n").unwrap_or(&yaml);
        Ok(format!(
            "{DELIMITER}\n{yaml}{DELIMITER}\n\n{}\n",
            draft.full_content().trim()
        ))
    }
}

/// Splits a post into front-matter fields and body.
///
/// Sequence values are joined with `", "`. Fails with `Validation` when the
/// front matter delimiters are missing or the YAML between them is not a map.
pub fn parse_post(content: &str) -> Result<(BTreeMap<String, String>, String), StageError> {
    let rest = content
        .strip_prefix(DELIMITER)
        .and_then(|r| r.strip_prefix('\n').or_else(|| r.strip_prefix("\r\n")))
        .ok_or_else(|| StageError::Validation("missing front matter delimiter".to_string()))?;
    let (yaml, body) = match rest.find("\n---") {
        Some(end) => {
            let after = &rest[end + 4..];
            let body = after.split_once('\n').map_or("", |(_, b)| b);
            (&rest[..end], body)
        }
        None => {
            return Err(StageError::Validation(
                "unterminated front matter".to_string(),
            ));
        }
    };

    let value: Value = serde_yaml::from_str(yaml)
        .map_err(|e| StageError::Validation(format!("front matter is not valid YAML: {e}")))?;
    let Value::Mapping(mapping) = value else {
        return Err(StageError::Validation(
            "front matter is not a mapping".to_string(),
        ));
    };

    let mut fields = BTreeMap::new();
    for (key, value) in mapping {
        if let Some(key) = scalar(&key) {
            let text = match &value {
                Value::Sequence(items) => items
                    .iter()
                    .filter_map(scalar)
                    .collect::<Vec<_>>()
                    .join(", "),
                other => scalar(other).unwrap_or_default(),
            };
            fields.insert(key, text);
        }
    }
    Ok((fields, body.trim().to_string()))
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

#[async_trait]
impl Publisher for HugoPublisher {
    async fn publish(
        &self,
        record: &InputRecord,
        draft: &DraftContent,
        image: Option<&ImageReference>,
    ) -> Result<PublishedArtifact, StageError> {
        let path = self.path_for(record, draft);
        let content = self.render(record, draft, image)?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| {
                StageError::Transient(format!("creating {}: {e}", self.output_dir.display()))
            })?;
        tokio::fs::write(&path, &content)
            .await
            .map_err(|e| StageError::Transient(format!("writing {}: {e}", path.display())))?;
        debug!(path = %path.display(), bytes = content.len(), "Wrote post");

        let written = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| StageError::Transient(format!("reading {}: {e}", path.display())))?;
        let (metadata, body) = parse_post(&written)?;
        info!(record = %record, path = %path.display(), "Published post");

        Ok(PublishedArtifact {
            path,
            metadata,
            body,
        })
    }
}
