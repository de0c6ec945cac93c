//! Entity document reader
//!
//! One markdown document per named entity, split on second-level headings:
//! the text before the first heading becomes a preamble item, and every
//! `## Heading` becomes an item labelled with that heading.

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::config::MemoryConfig;
use crate::error::Result;
use crate::item::{bounded, ItemMetadata, MemoryId, MemoryItem};

/// A contiguous piece of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// `None` for the preamble
    pub heading: Option<String>,
    /// Position among the document's headings; the preamble has none
    pub index: Option<usize>,
    pub body: String,
}

/// Read an entity document from disk
pub fn read_document(path: &Path, config: &MemoryConfig) -> Result<Vec<MemoryItem>> {
    let text = std::fs::read_to_string(path)?;
    let modified: Option<DateTime<Utc>> = std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .map(DateTime::<Utc>::from);
    Ok(document_items(&text, path, modified, config))
}

/// Turn document text into items, skipping empty sections
pub fn document_items(
    text: &str,
    path: &Path,
    timestamp: Option<DateTime<Utc>>,
    config: &MemoryConfig,
) -> Vec<MemoryItem> {
    let source = path.to_string_lossy().to_string();
    let entity = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    split_sections(text)
        .into_iter()
        .filter(|section| !section.body.is_empty())
        .map(|section| {
            let (locator, content) = match (&section.heading, section.index) {
                (Some(heading), Some(index)) => (
                    format!("section-{}", index),
                    format!("{}\n{}", heading, section.body),
                ),
                _ => ("preamble".to_string(), section.body.clone()),
            };

            MemoryItem {
                id: MemoryId::derive(&source, &locator),
                content: bounded(&content, config.max_item_chars),
                source: source.clone(),
                timestamp,
                metadata: ItemMetadata::EntitySection {
                    entity: entity.clone(),
                    section: section.heading,
                },
            }
        })
        .collect()
}

/// Split markdown on `## ` headings. Headings inside fenced code blocks are
/// body text. Bodies are trimmed; empty ones are kept so that heading
/// indexes stay positional.
pub fn split_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut heading: Option<String> = None;
    let mut index: Option<usize> = None;
    let mut body: Vec<&str> = Vec::new();
    let mut in_fence = false;
    let mut next_index = 0;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        }

        let title = if in_fence { None } else { second_level_heading(line) };
        match title {
            Some(title) => {
                sections.push(Section {
                    heading: heading.take(),
                    index: index.take(),
                    body: body.join("\n").trim().to_string(),
                });
                body.clear();
                heading = Some(title.to_string());
                index = Some(next_index);
                next_index += 1;
            }
            None => body.push(line),
        }
    }

    sections.push(Section {
        heading,
        index,
        body: body.join("\n").trim().to_string(),
    });
    sections
}

fn second_level_heading(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("##")?;
    if rest.starts_with('#') {
        return None;
    }
    if !(rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\t')) {
        return None;
    }
    Some(rest.trim().trim_end_matches('#').trim())
}
