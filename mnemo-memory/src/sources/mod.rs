//! Source discovery and readers
//!
//! Three kinds of raw sources feed the index: journal partitions, entity
//! documents and transcript logs. Each discovered file is one unit of change
//! tracking; readers turn a file into memory items.

pub mod entity;
pub mod journal;
pub mod transcript;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

use crate::config::MemoryConfig;
use crate::error::Result;
use crate::item::MemoryItem;

/// Which reader handles a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Journal,
    Entity,
    Transcript,
}

/// Cheap change detector for a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub size: u64,
    pub modified_ms: i64,
}

impl Fingerprint {
    /// Fingerprint the file at `path`
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let meta = fs::metadata(path)?;
        let modified_ms = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Ok(Self {
            size: meta.len(),
            modified_ms,
        })
    }
}

/// A source file found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredSource {
    pub path: PathBuf,
    pub kind: SourceKind,
}

/// List every indexable source, sorted by path.
///
/// A missing directory is not an error; it simply contributes nothing.
pub fn discover(config: &MemoryConfig) -> Vec<DiscoveredSource> {
    let mut sources = Vec::new();

    for path in list_files(&config.journal_dir, "jsonl", false) {
        if journal::partition_date(&path).is_some() {
            sources.push(DiscoveredSource {
                path,
                kind: SourceKind::Journal,
            });
        } else {
            log::debug!("Ignoring non-date journal file {}", path.display());
        }
    }

    for path in list_files(&config.entities_dir, "md", false) {
        sources.push(DiscoveredSource {
            path,
            kind: SourceKind::Entity,
        });
    }

    for path in list_files(&config.transcripts_dir, "jsonl", true) {
        sources.push(DiscoveredSource {
            path,
            kind: SourceKind::Transcript,
        });
    }

    sources.sort_by(|a, b| a.path.cmp(&b.path));
    sources
}

/// Decide which reader owns `path`, based on which configured root contains it.
pub fn classify(path: &Path, config: &MemoryConfig) -> Option<SourceKind> {
    let ext = path.extension().and_then(|e| e.to_str());

    if path.starts_with(&config.journal_dir) && ext == Some("jsonl") {
        journal::partition_date(path).map(|_| SourceKind::Journal)
    } else if path.starts_with(&config.entities_dir) && ext == Some("md") {
        Some(SourceKind::Entity)
    } else if path.starts_with(&config.transcripts_dir) && ext == Some("jsonl") {
        Some(SourceKind::Transcript)
    } else {
        None
    }
}

/// Parse one source file into memory items.
pub fn read_source(kind: SourceKind, path: &Path, config: &MemoryConfig) -> Result<Vec<MemoryItem>> {
    match kind {
        SourceKind::Journal => journal::read_partition(path, config),
        SourceKind::Entity => entity::read_document(path, config),
        SourceKind::Transcript => transcript::read_log(path, config),
    }
}

/// Split raw file contents into numbered lines.
///
/// A line that is not valid UTF-8 comes back as `None`, so readers skip it
/// like any other malformed record instead of losing the whole file.
/// Numbering matches `str::lines`, so ids keyed on it stay stable.
pub fn record_lines(bytes: &[u8]) -> impl Iterator<Item = (usize, Option<&str>)> {
    bytes.split(|b| *b == b'\n').enumerate().map(|(index, raw)| {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        (index, std::str::from_utf8(raw).ok())
    })
}

/// Absolute, symlink-resolved form of `path`.
///
/// Paths that no longer exist (deleted sources) resolve through their
/// parent directory; if that fails too the path is only made absolute.
pub fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(real) = fs::canonicalize(path) {
        return real;
    }
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => fs::canonicalize(parent)
            .map(|parent| parent.join(name))
            .unwrap_or(absolute),
        _ => absolute,
    }
}

fn list_files(dir: &Path, extension: &str, recursive: bool) -> Vec<PathBuf> {
    let mut files = Vec::new();
    collect_files(dir, extension, recursive, &mut files);
    files
}

fn collect_files(dir: &Path, extension: &str, recursive: bool, out: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Cannot read {}: {}", dir.display(), e);
            }
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();

        // Skip hidden files and directories
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.starts_with('.') {
                continue;
            }
        }

        if path.is_dir() {
            if recursive {
                collect_files(&path, extension, recursive, out);
            }
        } else if path.extension().and_then(|e| e.to_str()) == Some(extension) {
            out.push(path);
        }
    }
}
