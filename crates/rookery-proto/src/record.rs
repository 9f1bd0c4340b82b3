//! Input record identities.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one unit of work: a calendar date or a source data file.
///
/// Records are immutable once read. Publishers derive output paths from
/// [`InputRecord::slug`], which is unique per record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum InputRecord {
    /// All data observed on a given day.
    Date(NaiveDate),
    /// A single data file, by name relative to the data source.
    File(String),
}

impl InputRecord {
    /// Parses a user-supplied record identifier.
    ///
    /// `YYYY-MM-DD` becomes a date record, anything else a file record.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => InputRecord::Date(date),
            Err(_) => InputRecord::File(raw.to_string()),
        }
    }

    /// Returns the record identifier as shown to users.
    pub fn id(&self) -> String {
        match self {
            InputRecord::Date(date) => date.format("%Y-%m-%d").to_string(),
            InputRecord::File(name) => name.clone(),
        }
    }

    /// Returns the date this record describes, if it is a date record.
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            InputRecord::Date(date) => Some(*date),
            InputRecord::File(_) => None,
        }
    }

    /// Returns a filesystem-safe identifier derived from the record.
    ///
    /// Distinct records always get distinct slugs. A file name that is
    /// already lowercase and dash-separated is kept as is, with its extension
    /// joined by `_` (`feeder-cam.csv` becomes `feeder-cam_csv`). Any other
    /// name is slugified and suffixed with `__` and a hash of the full name,
    /// so `2026/Feeder Cam.csv` becomes `2026-feeder-cam-csv__<hash>`.
    pub fn slug(&self) -> String {
        match self {
            InputRecord::Date(_) => self.id(),
            InputRecord::File(name) => {
                let is_canonical = |part: &str| !part.is_empty() && slugify(part) == part;
                match name.rsplit_once('.') {
                    Some((stem, ext)) if is_canonical(stem) && is_canonical(ext) => {
                        format!("{stem}_{ext}")
                    }
                    None if is_canonical(name)
                        && NaiveDate::parse_from_str(name, "%Y-%m-%d").is_err() =>
                    {
                        name.clone()
                    }
                    _ => format!("{}__{:08x}", slugify(name), fnv1a(name.as_bytes())),
                }
            }
        }
    }
}

/// 32-bit FNV-1a; stable across builds, unlike `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0x811c_9dc5, |hash: u32, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(0x0100_0193)
    })
}

impl fmt::Display for InputRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

/// Lowercases `text`, keeps alphanumerics and collapses everything else into single `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}
