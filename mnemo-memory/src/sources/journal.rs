//! Journal reader
//!
//! A journal partition is one `YYYY-MM-DD.jsonl` file of append-only
//! `{topic, content, timestamp}` records. Each record becomes one item.

use std::path::Path;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Deserialize;

use crate::config::MemoryConfig;
use crate::error::{MemoryError, Result};
use crate::item::{bounded, ItemMetadata, MemoryId, MemoryItem};
use crate::sources::record_lines;
use crate::temporal::parse_timestamp;

#[derive(Debug, Deserialize)]
struct JournalRecord {
    #[serde(default)]
    topic: String,
    content: String,
    #[serde(default)]
    timestamp: Option<String>,
}

/// Date encoded in a partition's file name
pub fn partition_date(path: &Path) -> Option<NaiveDate> {
    let stem = path.file_stem()?.to_str()?;
    NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}

/// Read one journal partition from disk
pub fn read_partition(path: &Path, config: &MemoryConfig) -> Result<Vec<MemoryItem>> {
    let bytes = std::fs::read(path)?;
    let date = partition_date(path)
        .ok_or_else(|| MemoryError::source_parse(path, "journal file name is not a date"))?;
    Ok(parse_partition(&bytes, path, date, config))
}

/// Parse partition contents. Malformed lines are skipped; ids are keyed by
/// line index so appending never renumbers existing entries.
pub fn parse_partition(
    text: impl AsRef<[u8]>,
    path: &Path,
    date: NaiveDate,
    config: &MemoryConfig,
) -> Vec<MemoryItem> {
    let source = path.to_string_lossy().to_string();
    let fallback: Option<DateTime<Utc>> = date
        .and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive));

    let mut items = Vec::new();
    for (line_no, line) in record_lines(text.as_ref()) {
        let Some(line) = line else {
            log::debug!("Skipping non-UTF-8 journal line {} in {}", line_no + 1, source);
            continue;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let record: JournalRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) => {
                log::debug!("Skipping journal line {} in {}: {}", line_no + 1, source, e);
                continue;
            }
        };

        if record.content.trim().is_empty() {
            continue;
        }

        let topic = record.topic.trim().to_string();
        let text = if topic.is_empty() {
            record.content.trim().to_string()
        } else {
            format!("{}: {}", topic, record.content.trim())
        };

        items.push(MemoryItem {
            id: MemoryId::derive(&source, &format!("entry-{}", line_no)),
            content: bounded(&text, config.max_item_chars),
            source: source.clone(),
            timestamp: record
                .timestamp
                .as_deref()
                .and_then(parse_timestamp)
                .or(fallback),
            metadata: ItemMetadata::Journal { topic },
        });
    }
    items
}
