use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::warn;

use auh_core::{HistoryRecord, LEDGER_DATE_FORMAT};

const LEDGER_FILE_NAME: &str = "history.uh";
const FIELD_SEPARATOR: char = ',';

/// Durable per-recipe ledger of the last upgrade attempt and its outcome.
///
/// One record per line, comma-separated:
/// `recipe,target_version,maintainer,attempt_date,status_text`. Updates
/// rewrite the whole ledger into a temporary file and rename it over the
/// old one, so a crash leaves either the previous or the new ledger
/// intact, never a truncated mix.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    ledger_path: PathBuf,
}

impl HistoryStore {
    pub fn open(helper_dir: impl Into<PathBuf>) -> Self {
        Self {
            ledger_path: helper_dir.into().join(LEDGER_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.ledger_path
    }

    /// Parses the ledger into a map keyed by recipe name. Malformed lines
    /// are skipped with a warning instead of aborting the load.
    pub fn load(&self) -> Result<BTreeMap<String, HistoryRecord>> {
        let content = match fs::read_to_string(&self.ledger_path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BTreeMap::new());
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed reading history ledger: {}", self.ledger_path.display())
                });
            }
        };

        let mut records = BTreeMap::new();
        for (line_number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match parse_ledger_line(line) {
                Some(record) => {
                    records.insert(record.recipe.clone(), record);
                }
                None => {
                    warn!(
                        line = line_number + 1,
                        path = %self.ledger_path.display(),
                        "skipping malformed history ledger line"
                    );
                }
            }
        }

        Ok(records)
    }

    /// Replaces the record for `record.recipe`, keeping every other line of
    /// the existing ledger byte-for-byte (including lines this version
    /// cannot parse, so foreign records survive a partial rollout).
    pub fn update(&self, record: &HistoryRecord) -> Result<()> {
        if let Some(parent) = self.ledger_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating history ledger directory: {}", parent.display())
            })?;
        }

        let mut replacement = String::new();
        match fs::read_to_string(&self.ledger_path) {
            Ok(existing) => {
                for line in existing.lines() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let owner = line.split(FIELD_SEPARATOR).next().unwrap_or("");
                    if owner != record.recipe {
                        replacement.push_str(line);
                        replacement.push('\n');
                    }
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed reading history ledger: {}", self.ledger_path.display())
                });
            }
        }
        replacement.push_str(&render_ledger_line(record));
        replacement.push('\n');

        let temp_path = self.ledger_path.with_extension("uh.tmp");
        fs::write(&temp_path, &replacement).with_context(|| {
            format!("failed writing history ledger temp file: {}", temp_path.display())
        })?;
        fs::rename(&temp_path, &self.ledger_path).with_context(|| {
            format!(
                "failed replacing history ledger: {}",
                self.ledger_path.display()
            )
        })
    }
}

fn parse_ledger_line(line: &str) -> Option<HistoryRecord> {
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    if fields.len() != 5 {
        return None;
    }
    if fields[0].is_empty() {
        return None;
    }

    let attempt_date = NaiveDate::parse_from_str(fields[3], LEDGER_DATE_FORMAT).ok()?;
    Some(HistoryRecord {
        recipe: fields[0].to_string(),
        target_version: fields[1].to_string(),
        maintainer: fields[2].to_string(),
        attempt_date,
        status_text: fields[4].to_string(),
    })
}

fn render_ledger_line(record: &HistoryRecord) -> String {
    format!(
        "{}{sep}{}{sep}{}{sep}{}{sep}{}",
        sanitize_field(&record.recipe),
        sanitize_field(&record.target_version),
        sanitize_field(&record.maintainer),
        record.attempt_date.format(LEDGER_DATE_FORMAT),
        sanitize_field(&record.status_text),
        sep = FIELD_SEPARATOR,
    )
}

// The line format has no escaping, so the separator and line breaks must
// not reach the ledger inside a field value.
fn sanitize_field(value: &str) -> String {
    value
        .chars()
        .map(|ch| {
            if ch == FIELD_SEPARATOR || ch == '\n' || ch == '\r' {
                ' '
            } else {
                ch
            }
        })
        .collect()
}
