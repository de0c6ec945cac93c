//! Memory layer configuration
//!
//! Directory layout and tuning knobs. Defaults are rooted at `$MNEMO_HOME`
//! (falling back to `~/.mnemo`) and can be overridden per directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sources::normalize_path;

/// Smallest oversample factor the ranking engine accepts.
pub const MIN_OVERSAMPLE_FACTOR: usize = 3;

/// Configuration for one local memory store.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Date-partitioned journal files (`YYYY-MM-DD.jsonl`)
    pub journal_dir: PathBuf,
    /// One markdown document per entity
    pub entities_dir: PathBuf,
    /// Per-session transcript logs (searched recursively)
    pub transcripts_dir: PathBuf,
    /// Vector store and index state live here
    pub data_dir: PathBuf,
    /// Upper bound on embedded text per item
    pub max_item_chars: usize,
    /// Upper bound on a stored user prompt
    pub max_prompt_chars: usize,
    /// Upper bound on a stored assistant summary
    pub max_summary_chars: usize,
    /// User turns shorter than this are treated as noise
    pub min_prompt_chars: usize,
    /// Candidates fetched per requested result before reranking
    pub oversample_factor: usize,
    /// Texts per embedding call
    pub embed_batch_size: usize,
    /// Quiet window for file-change coalescing
    pub debounce: Duration,
}

impl MemoryConfig {
    /// Build a configuration with the standard layout under `root`.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            journal_dir: root.join("journal"),
            entities_dir: root.join("entities"),
            transcripts_dir: root.join("transcripts"),
            data_dir: root.join("index"),
            max_item_chars: 2000,
            max_prompt_chars: 1000,
            max_summary_chars: 500,
            min_prompt_chars: 10,
            oversample_factor: MIN_OVERSAMPLE_FACTOR,
            embed_batch_size: 64,
            debounce: Duration::from_secs(1),
        }
    }

    /// Resolve the configuration from the environment.
    ///
    /// `MNEMO_HOME` picks the root, `MNEMO_TRANSCRIPTS` points the transcript
    /// reader at another directory (typically the agent's own session logs).
    pub fn from_env() -> Self {
        let mut config = Self::with_root(default_root());
        if let Ok(dir) = std::env::var("MNEMO_TRANSCRIPTS") {
            config.transcripts_dir = PathBuf::from(dir);
        }
        config
    }

    /// Set the oversample factor, clamped to the supported minimum
    pub fn oversample(mut self, factor: usize) -> Self {
        self.oversample_factor = factor.max(MIN_OVERSAMPLE_FACTOR);
        self
    }

    /// Same configuration with every directory absolute and
    /// symlink-resolved, so paths from discovery, the watcher and the
    /// command line compare equal.
    pub fn normalized(mut self) -> Self {
        for dir in [
            &mut self.journal_dir,
            &mut self.entities_dir,
            &mut self.transcripts_dir,
            &mut self.data_dir,
        ] {
            *dir = normalize_path(dir);
        }
        self
    }

    /// Effective oversample factor
    pub fn effective_oversample(&self) -> usize {
        self.oversample_factor.max(MIN_OVERSAMPLE_FACTOR)
    }

    /// Path of the persisted index state
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("index-state.json")
    }

    /// Path of the on-disk vector store
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }

    /// Directory the embedding model is cached in
    pub fn models_dir(&self) -> PathBuf {
        self.data_dir
            .parent()
            .map(|root| root.join("models"))
            .unwrap_or_else(|| self.data_dir.join("models"))
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// `$MNEMO_HOME`, else `~/.mnemo`, else `./.mnemo`.
pub fn default_root() -> PathBuf {
    if let Ok(home) = std::env::var("MNEMO_HOME") {
        return PathBuf::from(home);
    }
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(|home| PathBuf::from(home).join(".mnemo"))
        .unwrap_or_else(|| PathBuf::from(".mnemo"))
}
