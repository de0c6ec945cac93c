//! Incremental index bookkeeping
//!
//! Maps each processed source path to the fingerprint it had when it was
//! indexed and the item ids derived from it. Persisted as JSON next to the
//! vector store and replaced atomically.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::item::MemoryId;
use crate::sources::{Fingerprint, SourceKind};

const STATE_VERSION: u32 = 1;

/// What the index knows about one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceEntry {
    pub kind: SourceKind,
    pub fingerprint: Fingerprint,
    pub item_ids: Vec<MemoryId>,
}

/// Per-source change tracking for the whole index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexState {
    #[serde(default)]
    pub version: u32,
    pub sources: BTreeMap<PathBuf, SourceEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
}

impl IndexState {
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION,
            ..Default::default()
        }
    }

    /// Load persisted state. `Ok(None)` when nothing usable is on disk,
    /// which callers treat as "rebuild everything".
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<IndexState>(&bytes) {
            Ok(state) if state.version == STATE_VERSION => Ok(Some(state)),
            Ok(state) => {
                log::warn!(
                    "Index state version {} is not {}, ignoring it",
                    state.version,
                    STATE_VERSION
                );
                Ok(None)
            }
            Err(e) => {
                log::warn!("Unreadable index state at {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    /// Write state through a temp file and rename, so readers never see a
    /// half-written file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// True if `path` was indexed with exactly this fingerprint
    pub fn is_fresh(&self, path: &Path, fingerprint: &Fingerprint) -> bool {
        self.sources
            .get(path)
            .map(|entry| &entry.fingerprint == fingerprint)
            .unwrap_or(false)
    }

    pub fn record(&mut self, path: PathBuf, entry: SourceEntry) {
        self.sources.insert(path, entry);
    }

    pub fn forget(&mut self, path: &Path) -> Option<SourceEntry> {
        self.sources.remove(path)
    }

    /// Drop every entry whose path is not in `present`; returns the dropped paths
    pub fn retain_present(&mut self, present: &[PathBuf]) -> Vec<PathBuf> {
        let present: HashSet<&Path> = present.iter().map(PathBuf::as_path).collect();
        let gone: Vec<PathBuf> = self
            .sources
            .keys()
            .filter(|path| !present.contains(path.as_path()))
            .cloned()
            .collect();
        for path in &gone {
            self.sources.remove(path);
        }
        gone
    }

    /// Number of items derived from all tracked sources
    pub fn item_count(&self) -> usize {
        self.sources.values().map(|entry| entry.item_ids.len()).sum()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.last_update = Some(at);
    }
}
